//! gRPC service implementation for the Terraform Plugin Protocol v6.9
//!
//! `ProviderServer` adapts a [`Provider`] to the generated `tfplugin6.Provider`
//! service. Data sources are created on demand from the provider's factories;
//! the only state held across calls is the provider itself, the provider data
//! produced by its configure, and the schema registry built on first use.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceFactory, DataSourceMetadataRequest,
    DataSourceSchemaRequest, ProviderData, ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::provider::{
    ConfigureProviderRequest, Provider, ProviderMetadataRequest, ProviderSchemaRequest,
};
use crate::proto;
use crate::schema::{Attribute, ObjectNestingMode, Schema, StringKind};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, ClientCapabilities, DeferredReason, Diagnostic,
    DiagnosticSeverity, DynamicValue,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tonic::{Request, Response, Status};

type GrpcResult<T> = std::result::Result<Response<T>, Status>;

pub struct ProviderServer<P: Provider> {
    provider: Arc<RwLock<P>>,
    provider_data: Arc<RwLock<Option<ProviderData>>>,
    registry: Arc<OnceCell<Registry>>,
    stop: Context,
    request_timeout: Option<Duration>,
}

impl<P: Provider> Clone for ProviderServer<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            provider_data: self.provider_data.clone(),
            registry: self.registry.clone(),
            stop: self.stop.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

struct Registry {
    provider_schema: Schema,
    data_sources: HashMap<String, RegisteredDataSource>,
    diagnostics: Vec<Diagnostic>,
}

struct RegisteredDataSource {
    factory: DataSourceFactory,
    schema: Schema,
}

impl<P: Provider + 'static> ProviderServer<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(RwLock::new(provider)),
            provider_data: Arc::new(RwLock::new(None)),
            registry: Arc::new(OnceCell::new()),
            stop: Context::new(),
            request_timeout: None,
        }
    }

    /// Bound every provider and data source call by `timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Context cancelled by StopProvider
    pub fn stop_context(&self) -> Context {
        self.stop.clone()
    }

    fn request_context(&self) -> Context {
        match self.request_timeout {
            Some(timeout) => self.stop.with_timeout(timeout),
            None => self.stop.clone(),
        }
    }

    async fn registry(&self) -> &Registry {
        self.registry.get_or_init(|| self.build_registry()).await
    }

    async fn build_registry(&self) -> Registry {
        let ctx = self.request_context();
        let provider = self.provider.read().await;

        let metadata = provider
            .metadata(ctx.clone(), ProviderMetadataRequest)
            .await;
        let provider_schema = provider.schema(ctx.clone(), ProviderSchemaRequest).await;
        let mut diagnostics = provider_schema.diagnostics;
        let mut data_sources = HashMap::new();

        for factory in provider.data_sources() {
            let data_source = factory();
            let type_name = data_source
                .metadata(
                    ctx.clone(),
                    DataSourceMetadataRequest {
                        provider_type_name: metadata.type_name.clone(),
                    },
                )
                .await
                .type_name;

            if data_sources.contains_key(&type_name) {
                diagnostics.push(Diagnostic::error(
                    "Duplicate Data Source Type Defined",
                    format!(
                        "The {} data source type name was returned for multiple data sources. \
                         Data source type names must be unique. This is always an issue with \
                         the provider and should be reported to the provider developers.",
                        type_name
                    ),
                ));
                continue;
            }

            let schema = data_source
                .schema(ctx.clone(), DataSourceSchemaRequest)
                .await;
            diagnostics.extend(schema.diagnostics);
            data_sources.insert(
                type_name,
                RegisteredDataSource {
                    factory,
                    schema: schema.schema,
                },
            );
        }

        tracing::debug!(
            provider = %metadata.type_name,
            version = %metadata.version,
            data_sources = data_sources.len(),
            "Built provider schema registry"
        );

        Registry {
            provider_schema: provider_schema.schema,
            data_sources,
            diagnostics,
        }
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProviderService for ProviderServer<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> GrpcResult<proto::get_metadata::Response> {
        let registry = self.registry().await;

        let mut names: Vec<&String> = registry.data_sources.keys().collect();
        names.sort();

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: diagnostics_to_proto(&registry.diagnostics),
            data_sources: names
                .into_iter()
                .map(|name| proto::get_metadata::DataSourceMetadata {
                    type_name: name.clone(),
                })
                .collect(),
            resources: vec![],
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> GrpcResult<proto::get_provider_schema::Response> {
        let registry = self.registry().await;

        let data_source_schemas = registry
            .data_sources
            .iter()
            .map(|(name, registered)| (name.clone(), schema_to_proto(&registered.schema)))
            .collect();

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&registry.provider_schema)),
            resource_schemas: HashMap::new(),
            data_source_schemas,
            diagnostics: diagnostics_to_proto(&registry.diagnostics),
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> GrpcResult<proto::validate_provider_config::Response> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config.as_ref())?;
        let registry = self.registry().await;

        let diagnostics = match registry.provider_schema.conform(&config.value) {
            Ok(_) => vec![],
            Err(e) => vec![Diagnostic::error(
                "Invalid Provider Configuration",
                e.to_string(),
            )],
        };

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> GrpcResult<proto::validate_data_resource_config::Response> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config.as_ref())?;
        let registry = self.registry().await;

        let registered = match registry.data_sources.get(&req.type_name) {
            Some(registered) => registered,
            None => {
                return Ok(Response::new(
                    proto::validate_data_resource_config::Response {
                        diagnostics: diagnostics_to_proto(&[data_source_not_found(
                            &req.type_name,
                        )]),
                    },
                ))
            }
        };

        if let Err(e) = registered.schema.conform(&config.value) {
            return Ok(Response::new(
                proto::validate_data_resource_config::Response {
                    diagnostics: diagnostics_to_proto(&[Diagnostic::error(
                        "Invalid Data Source Configuration",
                        e.to_string(),
                    )]),
                },
            ));
        }

        let data_source = (registered.factory)();
        let response = data_source
            .validate(
                self.request_context(),
                ValidateDataSourceConfigRequest {
                    type_name: req.type_name,
                    config,
                },
            )
            .await;

        Ok(Response::new(
            proto::validate_data_resource_config::Response {
                diagnostics: diagnostics_to_proto(&response.diagnostics),
            },
        ))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> GrpcResult<proto::configure_provider::Response> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config.as_ref())?;

        tracing::debug!(
            terraform_version = %req.terraform_version,
            "configure_provider called"
        );

        let response = {
            let mut provider = self.provider.write().await;
            provider
                .configure(
                    self.request_context(),
                    ConfigureProviderRequest {
                        terraform_version: req.terraform_version,
                        config,
                        client_capabilities: client_capabilities_from_proto(
                            req.client_capabilities,
                        ),
                    },
                )
                .await
        };

        // A failed reconfigure must not leave reads on the previous client
        if has_errors(&response.diagnostics) {
            *self.provider_data.write().await = None;
        } else if let Some(data) = response.provider_data {
            *self.provider_data.write().await = Some(data);
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(&response.diagnostics),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> GrpcResult<proto::read_data_source::Response> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config.as_ref())?;
        let provider_meta = match req.provider_meta.as_ref() {
            Some(meta) => Some(decode_dynamic_value(Some(meta))?),
            None => None,
        };
        let registry = self.registry().await;

        tracing::debug!(type_name = %req.type_name, "read_data_source called");

        let registered = match registry.data_sources.get(&req.type_name) {
            Some(registered) => registered,
            None => {
                return Ok(Response::new(read_failure(vec![data_source_not_found(
                    &req.type_name,
                )])))
            }
        };

        let ctx = self.request_context();
        let mut data_source = (registered.factory)();

        let provider_data = self.provider_data.read().await.clone();
        let configured = data_source
            .configure(ctx.clone(), ConfigureDataSourceRequest { provider_data })
            .await;
        let mut diagnostics = configured.diagnostics;
        if has_errors(&diagnostics) {
            return Ok(Response::new(read_failure(diagnostics)));
        }

        let response = data_source
            .read(
                ctx,
                ReadDataSourceRequest {
                    type_name: req.type_name.clone(),
                    config,
                    provider_meta,
                    client_capabilities: client_capabilities_from_proto(req.client_capabilities),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);

        let deferred = response.deferred.map(|deferred| proto::Deferred {
            reason: deferred_reason_to_proto(deferred.reason) as i32,
        });

        let state = match response.state {
            Some(state) if !has_errors(&diagnostics) => state,
            _ => {
                tracing::debug!(type_name = %req.type_name, "read_data_source returned no state");
                let mut failure = read_failure(diagnostics);
                failure.deferred = deferred;
                return Ok(Response::new(failure));
            }
        };

        let state = match registered.schema.conform(&state.value) {
            Ok(value) => DynamicValue::new(value),
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    "Value Conversion Error",
                    format!(
                        "An unexpected error was encountered trying to convert the {} data \
                         source state. This is always an error in the provider. Please report \
                         the following to the provider developer:\n\n{}",
                        req.type_name, e
                    ),
                ));
                return Ok(Response::new(read_failure(diagnostics)));
            }
        };

        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode_dynamic_value(&state)?),
            diagnostics: diagnostics_to_proto(&diagnostics),
            deferred,
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> GrpcResult<proto::stop_provider::Response> {
        tracing::info!("StopProvider received, cancelling in-flight requests");
        self.stop.cancel();

        Ok(Response::new(proto::stop_provider::Response {
            error: String::new(),
        }))
    }
}

// Helper functions

fn server_capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

fn read_failure(diagnostics: Vec<Diagnostic>) -> proto::read_data_source::Response {
    proto::read_data_source::Response {
        state: None,
        diagnostics: diagnostics_to_proto(&diagnostics),
        deferred: None,
    }
}

fn data_source_not_found(type_name: &str) -> Diagnostic {
    Diagnostic::error(
        "Data Source Type Not Found",
        format!(
            "No data source type named {:?} was found in the provider.",
            type_name
        ),
    )
}

#[allow(clippy::result_large_err)]
pub(crate) fn decode_dynamic_value(
    value: Option<&proto::DynamicValue>,
) -> std::result::Result<DynamicValue, Status> {
    let decoded = match value {
        None => return Ok(DynamicValue::null()),
        Some(v) if !v.msgpack.is_empty() => DynamicValue::decode_msgpack(&v.msgpack),
        Some(v) if !v.json.is_empty() => DynamicValue::decode_json(&v.json),
        Some(_) => return Ok(DynamicValue::null()),
    };

    decoded.map_err(|e| Status::invalid_argument(e.to_string()))
}

#[allow(clippy::result_large_err)]
pub(crate) fn encode_dynamic_value(
    value: &DynamicValue,
) -> std::result::Result<proto::DynamicValue, Status> {
    let msgpack = value
        .encode_msgpack()
        .map_err(|e| Status::internal(e.to_string()))?;

    Ok(proto::DynamicValue {
        msgpack,
        json: vec![],
    })
}

fn client_capabilities_from_proto(
    capabilities: Option<proto::ClientCapabilities>,
) -> ClientCapabilities {
    capabilities
        .map(|c| ClientCapabilities {
            deferral_allowed: c.deferral_allowed,
            write_only_attributes_allowed: c.write_only_attributes_allowed,
        })
        .unwrap_or_default()
}

fn deferred_reason_to_proto(reason: DeferredReason) -> proto::deferred::Reason {
    match reason {
        DeferredReason::Unknown => proto::deferred::Reason::Unknown,
        DeferredReason::ResourceConfigUnknown => proto::deferred::Reason::ResourceConfigUnknown,
        DeferredReason::ProviderConfigUnknown => proto::deferred::Reason::ProviderConfigUnknown,
        DeferredReason::AbsentPrereq => proto::deferred::Reason::AbsentPrereq,
    }
}

pub(crate) fn schema_to_proto(schema: &Schema) -> proto::Schema {
    proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: schema.block.version,
            attributes: schema
                .block
                .attributes
                .iter()
                .map(attribute_to_proto)
                .collect(),
            description: schema.block.description.clone(),
            description_kind: string_kind_to_proto(schema.block.description_kind) as i32,
            deprecated: schema.block.deprecated,
        }),
    }
}

fn attribute_to_proto(attr: &Attribute) -> proto::schema::Attribute {
    // Terraform expects either a type or a nested type, never both
    let (r#type, nested_type) = match &attr.nested_type {
        Some(nested) => (
            vec![],
            Some(proto::schema::Object {
                attributes: nested.attributes.iter().map(attribute_to_proto).collect(),
                nesting: nesting_to_proto(nested.nesting) as i32,
            }),
        ),
        None => (attr.r#type.to_json_bytes(), None),
    };

    proto::schema::Attribute {
        name: attr.name.clone(),
        r#type,
        nested_type,
        description: attr.description.clone(),
        required: attr.required,
        optional: attr.optional,
        computed: attr.computed,
        sensitive: attr.sensitive,
        description_kind: proto::StringKind::Plain as i32,
        deprecated: attr.deprecated,
        write_only: false,
    }
}

fn nesting_to_proto(nesting: ObjectNestingMode) -> proto::schema::object::NestingMode {
    match nesting {
        ObjectNestingMode::Invalid => proto::schema::object::NestingMode::Invalid,
        ObjectNestingMode::Single => proto::schema::object::NestingMode::Single,
        ObjectNestingMode::List => proto::schema::object::NestingMode::List,
        ObjectNestingMode::Set => proto::schema::object::NestingMode::Set,
        ObjectNestingMode::Map => proto::schema::object::NestingMode::Map,
    }
}

fn string_kind_to_proto(kind: StringKind) -> proto::StringKind {
    match kind {
        StringKind::Plain => proto::StringKind::Plain,
        StringKind::Markdown => proto::StringKind::Markdown,
    }
}

pub(crate) fn diagnostics_to_proto(diagnostics: &[Diagnostic]) -> Vec<proto::Diagnostic> {
    diagnostics
        .iter()
        .map(|diag| proto::Diagnostic {
            severity: severity_to_proto(diag.severity) as i32,
            summary: diag.summary.clone(),
            detail: diag.detail.clone(),
            attribute: diag.attribute.as_ref().map(attribute_path_to_proto),
        })
        .collect()
}

fn severity_to_proto(severity: DiagnosticSeverity) -> proto::diagnostic::Severity {
    match severity {
        DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
        DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
        DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
    }
}

fn attribute_path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;

    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}
