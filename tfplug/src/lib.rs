//! tfplug - Terraform Plugin Framework for Rust
//!
//! A framework for building read-only Terraform providers in Rust, implementing
//! the data source subset of the Terraform Plugin Protocol v6.

// Core modules
pub mod context;
pub mod error;
pub mod schema;
pub mod types;

// Provider API modules
pub mod data_source;
pub mod provider;

// Framework implementation modules
pub mod grpc;
pub mod proto;
pub mod server;

// Re-exports for convenience
pub use context::Context;
pub use data_source::{DataSource, DataSourceWithConfigure, ProviderData};
pub use error::{Result, TfplugError};
pub use provider::{Provider, ProviderMetadataRequest, ProviderMetadataResponse};
pub use schema::{AttributeBuilder, AttributeType, NestedType, Schema, SchemaBuilder};
pub use server::{serve, LogLevel, ServerConfig};
pub use types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
