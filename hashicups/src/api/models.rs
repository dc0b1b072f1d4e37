//! Wire models returned by the HashiCups API

use serde::{Deserialize, Deserializer, Serialize};

/// A coffee on the HashiCups menu
///
/// Absent and `null` fields both decode to the zero value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coffee {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub teaser: String,
    #[serde(deserialize_with = "null_as_default")]
    pub collection: String,
    #[serde(deserialize_with = "null_as_default")]
    pub origin: String,
    #[serde(deserialize_with = "null_as_default")]
    pub color: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub image: String,
    #[serde(deserialize_with = "null_as_default")]
    pub ingredients: Vec<Ingredient>,
}

/// Ingredient reference embedded in a coffee
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ingredient {
    #[serde(rename = "ingredient_id", deserialize_with = "null_as_default")]
    pub id: i64,
}

/// Credentials posted to `/signin`
#[derive(Debug, Clone, Serialize)]
pub struct AuthStruct {
    pub username: String,
    pub password: String,
}

/// Response from `/signin`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
