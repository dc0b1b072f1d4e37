pub mod api;
pub mod data_sources;

use async_trait::async_trait;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceFactory;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, ProviderMetadataRequest,
    ProviderMetadataResponse, ProviderSchemaRequest, ProviderSchemaResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{has_errors, AttributePath, Config, Diagnostic, Dynamic};
use tfplug::{Provider, ProviderData};

pub const HOST_ENV: &str = "HASHICUPS_HOST";
pub const USERNAME_ENV: &str = "HASHICUPS_USERNAME";
pub const PASSWORD_ENV: &str = "HASHICUPS_PASSWORD";

/// Provider configuration attributes: (attribute, label, environment variable)
const SETTINGS: [(&str, &str, &str); 3] = [
    ("host", "Host", HOST_ENV),
    ("username", "Username", USERNAME_ENV),
    ("password", "Password", PASSWORD_ENV),
];

pub struct HashicupsProvider {
    version: String,
    client: Option<api::Client>,
}

impl Default for HashicupsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HashicupsProvider {
    pub fn new() -> Self {
        Self::with_version(env!("CARGO_PKG_VERSION"))
    }

    /// Provider reporting `version`, e.g. "dev" for local builds or "test"
    pub fn with_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            client: None,
        }
    }

    pub fn client(&self) -> Option<&api::Client> {
        self.client.as_ref()
    }
}

/// Config value for `attribute`, falling back to `env` when null or absent
fn resolve_setting(config: &Config, attribute: &str, env: &str) -> Option<String> {
    match config.value_at(&AttributePath::new(attribute)) {
        Some(Dynamic::String(value)) => Some(value.clone()),
        _ => std::env::var(env).ok(),
    }
}

#[async_trait]
impl Provider for HashicupsProvider {
    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "hashicups".to_string(),
            version: self.version.clone(),
        }
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .description("Interact with HashiCups.")
            .attribute(
                AttributeBuilder::new("host", AttributeType::String)
                    .description(
                        "URI for HashiCups API. May also be provided via HASHICUPS_HOST environment variable.",
                    )
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("username", AttributeType::String)
                    .description(
                        "Username for HashiCups API. May also be provided via HASHICUPS_USERNAME environment variable.",
                    )
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("password", AttributeType::String)
                    .description(
                        "Password for HashiCups API. May also be provided via HASHICUPS_PASSWORD environment variable.",
                    )
                    .optional()
                    .sensitive()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        tracing::info!("Configuring HashiCups client");

        let config = &request.config;
        let mut diagnostics = vec![];

        for (attribute, label, env) in SETTINGS {
            let path = AttributePath::new(attribute);
            if config.value_at(&path) == Some(&Dynamic::Unknown) {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Unknown HashiCups API {}", label),
                        format!(
                            "The provider cannot create the HashiCups API client as there is an \
                             unknown configuration value for the HashiCups API {}. Either target \
                             apply the source of the value first, set the value statically in the \
                             configuration, or use the {} environment variable.",
                            attribute, env
                        ),
                    )
                    .with_attribute(path),
                );
            }
        }
        if has_errors(&diagnostics) {
            return ConfigureProviderResponse::from_diagnostics(diagnostics);
        }

        let mut values = Vec::with_capacity(SETTINGS.len());
        for (attribute, label, env) in SETTINGS {
            let value = resolve_setting(config, attribute, env).unwrap_or_default();
            if value.is_empty() {
                diagnostics.push(
                    Diagnostic::error(
                        format!("Missing HashiCups API {}", label),
                        format!(
                            "The provider cannot create the HashiCups API client as there is a \
                             missing or empty value for the HashiCups API {}. Set the {} value in \
                             the configuration or use the {} environment variable. If either is \
                             already set, ensure the value is not empty.",
                            attribute, attribute, env
                        ),
                    )
                    .with_attribute(AttributePath::new(attribute)),
                );
            }
            values.push(value);
        }
        if has_errors(&diagnostics) {
            return ConfigureProviderResponse::from_diagnostics(diagnostics);
        }

        let password = values.pop().unwrap_or_default();
        let username = values.pop().unwrap_or_default();
        let host = values.pop().unwrap_or_default();

        tracing::debug!(
            hashicups_host = %host,
            hashicups_username = %username,
            "Creating HashiCups client"
        );

        let client = match api::Client::new(Some(host), Some(username), Some(password)).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create HashiCups client");
                return ConfigureProviderResponse::from_diagnostics(vec![Diagnostic::error(
                    "Unable to Create HashiCups API Client",
                    format!(
                        "An unexpected error occurred when creating the HashiCups API client. \
                         If the error is not clear, please contact the provider developers.\n\n\
                         HashiCups Client Error: {}",
                        e
                    ),
                )]);
            }
        };

        self.client = Some(client.clone());
        tracing::info!(host = %client.host_url(), "Configured HashiCups client");

        ConfigureProviderResponse {
            diagnostics,
            provider_data: Some(Arc::new(client) as ProviderData),
        }
    }

    fn data_sources(&self) -> Vec<DataSourceFactory> {
        vec![data_sources::CoffeesDataSource::create as DataSourceFactory]
    }
}
