use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::error::ApiError;
use super::models::{AuthResponse, AuthStruct, Coffee};

/// Host used when none is configured
pub const DEFAULT_HOST: &str = "http://localhost:19090";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HashiCups API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth: Option<AuthStruct>,
    token: Option<String>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("authenticated", &self.inner.token.is_some())
            .finish()
    }
}

impl Client {
    /// Create a client for `host` (defaults to [`DEFAULT_HOST`]).
    ///
    /// When both username and password are given the client signs in right
    /// away and keeps the returned token; otherwise it stays unauthenticated.
    pub async fn new(
        host: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ApiError> {
        let base_url = parse_host(host.as_deref().unwrap_or(DEFAULT_HOST))?;
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let mut inner = ClientInner {
            http_client,
            base_url,
            auth: None,
            token: None,
        };

        let (username, password) = match (username, password) {
            (Some(username), Some(password)) => (username, password),
            _ => {
                return Ok(Self {
                    inner: Arc::new(inner),
                })
            }
        };

        inner.auth = Some(AuthStruct { username, password });
        let auth = inner.sign_in().await?;
        inner.token = Some(auth.token);

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn host_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.inner.token.as_deref()
    }

    /// Exchange the configured credentials for a fresh token
    pub async fn sign_in(&self) -> Result<AuthResponse, ApiError> {
        self.inner.sign_in().await
    }

    /// List every coffee on the menu, in server order
    pub async fn get_coffees(&self) -> Result<Vec<Coffee>, ApiError> {
        self.inner.get("/coffees").await
    }
}

impl ClientInner {
    async fn sign_in(&self) -> Result<AuthResponse, ApiError> {
        let auth = match &self.auth {
            Some(auth) if !auth.username.is_empty() && !auth.password.is_empty() => auth,
            _ => return Err(ApiError::MissingCredentials),
        };

        let url = format!("{}/signin", self.base_url);
        tracing::debug!(url = %url, username = %auth.username, "POST request");

        let response = self.http_client.post(&url).json(auth).send().await?;
        parse_response(response).await
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "GET request");

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request.send().await?;
        parse_response(response).await
    }
}

async fn parse_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if status != StatusCode::OK {
        tracing::error!(status = status.as_u16(), body = %text, "API error response");
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    serde_json::from_str::<T>(&text).map_err(|e| {
        tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
        ApiError::Parse(e.to_string())
    })
}

fn parse_host(host: &str) -> Result<String, ApiError> {
    let invalid = |reason: String| ApiError::InvalidHost {
        host: host.to_string(),
        reason,
    };

    let url = Url::parse(host).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}
