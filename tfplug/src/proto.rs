//! Protocol buffer types for Terraform Plugin Protocol v6.9
//!
//! This module includes and re-exports the types generated from
//! `proto/tfplugin6.proto` by tonic-build at build time.
//!
//! Request/Response types are nested in snake_case modules named after the RPC
//! (e.g. `read_data_source::Request`), nested messages live in sub-modules
//! (e.g. `diagnostic::Severity`) and the service trait is re-exported as
//! `ProviderService`.
//!
//! Some protobuf types share names with tfplug framework types
//! (`DynamicValue`, `Diagnostic`, `Schema`); always use the `proto::` prefix.

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

pub use provider_server::{Provider as ProviderService, ProviderServer};
