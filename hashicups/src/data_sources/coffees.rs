//! Coffees data source implementation
//!
//! Lists every coffee on the HashiCups menu. The data source takes no
//! arguments; each read replaces the whole `coffees` list with what the API
//! currently returns.

use async_trait::async_trait;
use serde::Serialize;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, NestedType, SchemaBuilder};
use tfplug::types::{Diagnostic, DynamicValue};

use crate::api::{self, Client};

pub const READ_ERROR_SUMMARY: &str = "Unable to Read HashiCups Coffees";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoffeesDataSourceModel {
    pub coffees: Option<Vec<CoffeeModel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoffeeModel {
    pub id: i64,
    pub name: String,
    pub teaser: String,
    pub description: String,
    pub price: f64,
    pub image: String,
    pub ingredients: Option<Vec<IngredientModel>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientModel {
    pub id: i64,
}

// Empty lists are written to state as null
fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl From<api::Coffee> for CoffeeModel {
    fn from(coffee: api::Coffee) -> Self {
        Self {
            id: coffee.id,
            name: coffee.name,
            teaser: coffee.teaser,
            description: coffee.description,
            price: coffee.price,
            image: coffee.image,
            ingredients: non_empty(
                coffee
                    .ingredients
                    .into_iter()
                    .map(|ingredient| IngredientModel { id: ingredient.id })
                    .collect(),
            ),
        }
    }
}

impl From<Vec<api::Coffee>> for CoffeesDataSourceModel {
    fn from(coffees: Vec<api::Coffee>) -> Self {
        Self {
            coffees: non_empty(coffees.into_iter().map(CoffeeModel::from).collect()),
        }
    }
}

#[derive(Default)]
pub struct CoffeesDataSource {
    client: Option<Client>,
}

impl CoffeesDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory registered with the provider
    pub fn create() -> Box<dyn DataSourceWithConfigure> {
        Box::new(Self::new())
    }
}

#[async_trait]
impl DataSource for CoffeesDataSource {
    async fn metadata(
        &self,
        _ctx: Context,
        request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: format!("{}_coffees", request.provider_type_name),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let ingredients = NestedType::list(vec![AttributeBuilder::new("id", AttributeType::Number)
            .description("Numeric identifier of the coffee ingredient.")
            .computed()
            .build()]);

        let coffee = NestedType::list(vec![
            AttributeBuilder::new("id", AttributeType::Number)
                .description("Numeric identifier of the coffee.")
                .computed()
                .build(),
            AttributeBuilder::new("name", AttributeType::String)
                .description("Product name of the coffee.")
                .computed()
                .build(),
            AttributeBuilder::new("teaser", AttributeType::String)
                .description("Fun tagline for the coffee.")
                .computed()
                .build(),
            AttributeBuilder::new("description", AttributeType::String)
                .description("Product description of the coffee.")
                .computed()
                .build(),
            AttributeBuilder::new("price", AttributeType::Number)
                .description("Suggested cost of the coffee.")
                .computed()
                .build(),
            AttributeBuilder::new("image", AttributeType::String)
                .description("URI for an image of the coffee.")
                .computed()
                .build(),
            AttributeBuilder::nested("ingredients", ingredients)
                .description("List of ingredients in the coffee.")
                .computed()
                .build(),
        ]);

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Fetches the list of coffees.")
            .attribute(
                AttributeBuilder::nested("coffees", coffee)
                    .description("List of coffees.")
                    .computed()
                    .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, _request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let client = match &self.client {
            Some(client) => client,
            None => {
                return ReadDataSourceResponse::from_diagnostics(vec![Diagnostic::error(
                    "Unconfigured HashiCups Client",
                    "Expected a configured HashiCups client. The provider may not have been \
                     configured yet. Please report this issue to the provider developers.",
                )])
            }
        };

        tracing::debug!(host = %client.host_url(), "Reading coffees");

        let result = tokio::select! {
            result = client.get_coffees() => result.map_err(|e| e.to_string()),
            _ = ctx.cancelled() => Err("request cancelled before the HashiCups API responded".to_string()),
        };

        let coffees = match result {
            Ok(coffees) => coffees,
            Err(detail) => {
                tracing::error!(error = %detail, "Failed to read coffees");
                return ReadDataSourceResponse::from_diagnostics(vec![Diagnostic::error(
                    READ_ERROR_SUMMARY,
                    detail,
                )]);
            }
        };

        tracing::debug!(count = coffees.len(), "Read coffees");

        match DynamicValue::from_serializable(&CoffeesDataSourceModel::from(coffees)) {
            Ok(state) => ReadDataSourceResponse {
                state: Some(state),
                diagnostics: vec![],
                deferred: None,
            },
            Err(e) => ReadDataSourceResponse::from_diagnostics(vec![Diagnostic::error(
                "Value Conversion Error",
                e.to_string(),
            )]),
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for CoffeesDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];

        // Terraform validates data sources before the provider is configured
        let Some(data) = request.provider_data else {
            return ConfigureDataSourceResponse { diagnostics };
        };

        match data.downcast_ref::<Client>() {
            Some(client) => {
                self.client = Some(client.clone());
            }
            None => {
                let type_id = (*data).type_id();
                tracing::error!(?type_id, "Unexpected provider data type");
                diagnostics.push(Diagnostic::error(
                    "Unexpected Data Source Configure Type",
                    format!(
                        "Expected hashicups::api::Client, got: {:?}. Please report this issue \
                         to the provider developers.",
                        type_id
                    ),
                ));
            }
        }

        ConfigureDataSourceResponse { diagnostics }
    }
}
