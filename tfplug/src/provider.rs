//! Provider trait and related types

use crate::context::Context;
use crate::data_source::{DataSourceFactory, ProviderData};
use crate::schema::Schema;
use crate::types::{ClientCapabilities, Config, Diagnostic};
use async_trait::async_trait;

/// Root of a Terraform provider.
///
/// The provider declares its own configuration schema, turns that configuration
/// into provider data during `configure`, and lists the data sources it offers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Type name prefix for every data source (e.g. "hashicups") and the provider version
    async fn metadata(
        &self,
        ctx: Context,
        request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse;

    /// Provider-level configuration schema
    async fn schema(&self, ctx: Context, request: ProviderSchemaRequest) -> ProviderSchemaResponse;

    /// Called once Terraform has the provider configuration. Provider data set
    /// on the response is handed to every data source's configure.
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse;

    /// Factories for the data sources implemented by this provider
    fn data_sources(&self) -> Vec<DataSourceFactory>;
}

pub struct ProviderMetadataRequest;

pub struct ProviderMetadataResponse {
    pub type_name: String,
    pub version: String,
}

pub struct ProviderSchemaRequest;

pub struct ProviderSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ConfigureProviderRequest {
    pub terraform_version: String,
    pub config: Config,
    pub client_capabilities: ClientCapabilities,
}

pub struct ConfigureProviderResponse {
    pub diagnostics: Vec<Diagnostic>,
    pub provider_data: Option<ProviderData>,
}

impl ConfigureProviderResponse {
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            provider_data: None,
        }
    }
}
