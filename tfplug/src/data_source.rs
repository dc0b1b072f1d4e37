//! DataSource trait and related types
//!
//! This module defines the traits data sources implement. The server creates
//! a fresh instance per operation through the factories a provider returns,
//! calls `configure` with the provider data, then the requested operation.

use crate::context::Context;
use crate::schema::Schema;
use crate::types::{ClientCapabilities, Deferred, Diagnostic, DynamicValue};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

/// Base trait for data sources - implement read operations
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Called to get the data source type name, usually derived from the
    /// provider type name (e.g. "hashicups" + "_coffees")
    async fn metadata(
        &self,
        ctx: Context,
        request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse;

    /// Called to get data source schema
    async fn schema(
        &self,
        ctx: Context,
        request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse;

    /// Called during plan to validate configuration
    async fn validate(
        &self,
        _ctx: Context,
        _request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        ValidateDataSourceConfigResponse {
            diagnostics: vec![],
        }
    }

    /// Called to read data - this is the only operation for data sources
    /// Any error diagnostic discards the returned state
    async fn read(&self, ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse;
}

// Request/Response Types
pub struct DataSourceMetadataRequest {
    pub provider_type_name: String,
}

pub struct DataSourceMetadataResponse {
    pub type_name: String,
}

pub struct DataSourceSchemaRequest;

pub struct DataSourceSchemaResponse {
    pub schema: Schema,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ValidateDataSourceConfigRequest {
    pub type_name: String,
    pub config: DynamicValue,
}

pub struct ValidateDataSourceConfigResponse {
    pub diagnostics: Vec<Diagnostic>,
}

pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: DynamicValue,
    pub provider_meta: Option<DynamicValue>,
    pub client_capabilities: ClientCapabilities,
}

pub struct ReadDataSourceResponse {
    pub state: Option<DynamicValue>,
    pub diagnostics: Vec<Diagnostic>,
    pub deferred: Option<Deferred>,
}

impl ReadDataSourceResponse {
    /// Response carrying diagnostics only, leaving state unset
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            state: None,
            diagnostics,
            deferred: None,
        }
    }
}

/// All data sources must implement configure to receive provider data
/// This is called immediately after the factory creates the data source
/// Use this to store API clients, credentials, etc. from the provider
#[async_trait]
pub trait DataSourceWithConfigure: DataSource {
    async fn configure(
        &mut self,
        ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse;
}

/// Opaque value a provider hands to its data sources
pub type ProviderData = Arc<dyn Any + Send + Sync>;

pub struct ConfigureDataSourceRequest {
    /// None until the provider has been configured
    pub provider_data: Option<ProviderData>,
}

pub struct ConfigureDataSourceResponse {
    pub diagnostics: Vec<Diagnostic>,
}

/// Constructor registered by a provider for one data source type
pub type DataSourceFactory = fn() -> Box<dyn DataSourceWithConfigure>;
