#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSourceFactory,
    DataSourceMetadataRequest, DataSourceMetadataResponse, DataSourceSchemaRequest,
    DataSourceSchemaResponse, ReadDataSourceRequest, ReadDataSourceResponse,
};
use tfplug::grpc::ProviderServer;
use tfplug::proto::{self, ProviderService};
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, ProviderMetadataRequest,
    ProviderMetadataResponse, ProviderSchemaRequest, ProviderSchemaResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, NestedType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::{DataSource, DataSourceWithConfigure, Provider, ProviderData};
use tonic::Request;

struct TestProvider {
    factories: Vec<DataSourceFactory>,
}

impl TestProvider {
    fn new(factories: Vec<DataSourceFactory>) -> Self {
        Self { factories }
    }
}

#[async_trait]
impl Provider for TestProvider {
    async fn metadata(
        &self,
        _ctx: Context,
        _request: ProviderMetadataRequest,
    ) -> ProviderMetadataResponse {
        ProviderMetadataResponse {
            type_name: "example".to_string(),
            version: "0.1.0".to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        ProviderSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("prefix", AttributeType::String)
                        .optional()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let path = AttributePath::new("prefix");
        match request.config.value_at(&path) {
            Some(Dynamic::Unknown) => {
                return ConfigureProviderResponse::from_diagnostics(vec![Diagnostic::error(
                    "Unknown prefix",
                    "prefix is not known until apply",
                )
                .with_attribute(path)])
            }
            Some(Dynamic::String(prefix)) if prefix.is_empty() => {
                return ConfigureProviderResponse::from_diagnostics(vec![Diagnostic::error(
                    "Empty prefix",
                    "prefix must not be empty",
                )
                .with_attribute(path)])
            }
            _ => {}
        }

        let prefix = request
            .config
            .get_string(&path)
            .unwrap_or_else(|_| "widget".to_string());

        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(Arc::new(prefix) as ProviderData),
        }
    }

    fn data_sources(&self) -> Vec<DataSourceFactory> {
        self.factories.clone()
    }
}

#[derive(Default)]
struct WidgetsDataSource {
    prefix: Option<Arc<String>>,
}

impl WidgetsDataSource {
    fn create() -> Box<dyn DataSourceWithConfigure> {
        Box::new(Self::default())
    }
}

#[async_trait]
impl DataSource for WidgetsDataSource {
    async fn metadata(
        &self,
        _ctx: Context,
        request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: format!("{}_widgets", request.provider_type_name),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::nested(
                        "widgets",
                        NestedType::list(vec![
                            AttributeBuilder::new("id", AttributeType::Number)
                                .computed()
                                .build(),
                            AttributeBuilder::new("name", AttributeType::String)
                                .computed()
                                .build(),
                            AttributeBuilder::new("label", AttributeType::String)
                                .computed()
                                .build(),
                        ]),
                    )
                    .computed()
                    .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, _request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let prefix = match &self.prefix {
            Some(prefix) => prefix.as_str().to_string(),
            None => "unconfigured".to_string(),
        };

        // label is left out and must come back as null
        let widget = Dynamic::Map(HashMap::from([
            ("id".to_string(), Dynamic::Number(1.0)),
            ("name".to_string(), Dynamic::String(format!("{}-1", prefix))),
        ]));
        let state = Dynamic::Map(HashMap::from([(
            "widgets".to_string(),
            Dynamic::List(vec![widget]),
        )]));

        ReadDataSourceResponse {
            state: Some(DynamicValue::new(state)),
            diagnostics: vec![],
            deferred: None,
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for WidgetsDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        if let Some(data) = request.provider_data {
            self.prefix = data.downcast::<String>().ok();
        }
        ConfigureDataSourceResponse {
            diagnostics: vec![],
        }
    }
}

/// Reports an error alongside a state that must be discarded
struct BrokenDataSource;

#[async_trait]
impl DataSource for BrokenDataSource {
    async fn metadata(
        &self,
        _ctx: Context,
        request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: format!("{}_broken", request.provider_type_name),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: SchemaBuilder::new()
                .attribute(
                    AttributeBuilder::new("value", AttributeType::String)
                        .computed()
                        .build(),
                )
                .build(),
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, _request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        ReadDataSourceResponse {
            state: Some(DynamicValue::new(Dynamic::Map(HashMap::from([(
                "value".to_string(),
                Dynamic::String("partial".to_string()),
            )])))),
            diagnostics: vec![Diagnostic::error("Unable to Read", "backend exploded")],
            deferred: None,
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for BrokenDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        ConfigureDataSourceResponse {
            diagnostics: vec![],
        }
    }
}

fn broken_data_source() -> Box<dyn DataSourceWithConfigure> {
    Box::new(BrokenDataSource)
}

/// Blocks until the request context is cancelled
struct SlowDataSource;

#[async_trait]
impl DataSource for SlowDataSource {
    async fn metadata(
        &self,
        _ctx: Context,
        request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: format!("{}_slow", request.provider_type_name),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: SchemaBuilder::new().build(),
            diagnostics: vec![],
        }
    }

    async fn read(&self, ctx: Context, _request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        ctx.cancelled().await;
        ReadDataSourceResponse::from_diagnostics(vec![Diagnostic::error(
            "Read Cancelled",
            "the provider was stopped",
        )])
    }
}

#[async_trait]
impl DataSourceWithConfigure for SlowDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        _request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        ConfigureDataSourceResponse {
            diagnostics: vec![],
        }
    }
}

fn slow_data_source() -> Box<dyn DataSourceWithConfigure> {
    Box::new(SlowDataSource)
}

fn server() -> ProviderServer<TestProvider> {
    ProviderServer::new(TestProvider::new(vec![
        WidgetsDataSource::create as DataSourceFactory,
        broken_data_source,
        slow_data_source,
    ]))
}

fn wire(value: Dynamic) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: DynamicValue::new(value).encode_msgpack().unwrap(),
        json: vec![],
    })
}

fn read_request(type_name: &str) -> Request<proto::read_data_source::Request> {
    Request::new(proto::read_data_source::Request {
        type_name: type_name.to_string(),
        config: wire(Dynamic::Map(HashMap::new())),
        provider_meta: None,
        client_capabilities: None,
    })
}

#[tokio::test]
async fn test_metadata_lists_data_sources() {
    let response = server()
        .get_metadata(Request::new(proto::get_metadata::Request {}))
        .await
        .unwrap()
        .into_inner();

    let names: Vec<&str> = response
        .data_sources
        .iter()
        .map(|ds| ds.type_name.as_str())
        .collect();
    assert_eq!(names, vec!["example_broken", "example_slow", "example_widgets"]);
    assert!(response.resources.is_empty());
    assert!(response.diagnostics.is_empty());
}

#[tokio::test]
async fn test_provider_schema_contains_nested_attributes() {
    let response = server()
        .get_provider_schema(Request::new(proto::get_provider_schema::Request {}))
        .await
        .unwrap()
        .into_inner();

    let provider = response.provider.unwrap().block.unwrap();
    assert_eq!(provider.attributes[0].name, "prefix");
    assert!(provider.attributes[0].optional);

    let widgets = response.data_source_schemas["example_widgets"]
        .block
        .as_ref()
        .unwrap();
    let attr = &widgets.attributes[0];
    assert_eq!(attr.name, "widgets");
    assert!(attr.computed);
    assert!(attr.r#type.is_empty());
    assert_eq!(attr.nested_type.as_ref().unwrap().attributes.len(), 3);
}

#[tokio::test]
async fn test_read_fills_missing_attributes_with_null() {
    let server = server();

    let configured = server
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: wire(Dynamic::Map(HashMap::from([(
                "prefix".to_string(),
                Dynamic::String("gear".to_string()),
            )]))),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(configured.diagnostics.is_empty());

    let response = server
        .read_data_source(read_request("example_widgets"))
        .await
        .unwrap()
        .into_inner();
    assert!(response.diagnostics.is_empty());

    let state = DynamicValue::decode_msgpack(&response.state.unwrap().msgpack).unwrap();
    let first = AttributePath::new("widgets").index(0);
    assert_eq!(
        state.get_string(&first.clone().attribute("name")).unwrap(),
        "gear-1"
    );
    assert_eq!(state.get_number(&first.clone().attribute("id")).unwrap(), 1.0);
    assert_eq!(
        state.value_at(&first.attribute("label")),
        Some(&Dynamic::Null)
    );
}

fn configure_request(prefix: &str) -> Request<proto::configure_provider::Request> {
    Request::new(proto::configure_provider::Request {
        terraform_version: "1.9.0".to_string(),
        config: wire(Dynamic::Map(HashMap::from([(
            "prefix".to_string(),
            Dynamic::String(prefix.to_string()),
        )]))),
        client_capabilities: None,
    })
}

async fn widget_name(server: &ProviderServer<TestProvider>) -> String {
    let response = server
        .read_data_source(read_request("example_widgets"))
        .await
        .unwrap()
        .into_inner();
    let state = DynamicValue::decode_msgpack(&response.state.unwrap().msgpack).unwrap();
    state
        .get_string(&AttributePath::new("widgets").index(0).attribute("name"))
        .unwrap()
}

#[tokio::test]
async fn test_failed_reconfigure_drops_previous_provider_data() {
    let server = server();

    let configured = server
        .configure_provider(configure_request("gear"))
        .await
        .unwrap()
        .into_inner();
    assert!(configured.diagnostics.is_empty());
    assert_eq!(widget_name(&server).await, "gear-1");

    let failed = server
        .configure_provider(configure_request(""))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(failed.diagnostics.len(), 1);
    assert_eq!(failed.diagnostics[0].summary, "Empty prefix");
    assert_eq!(widget_name(&server).await, "unconfigured-1");
}

#[tokio::test]
async fn test_refined_unknown_config_reaches_the_provider() {
    // {"prefix": ext12 {1: false}}, an unknown string known to be not null
    let mut msgpack = vec![0x81, 0xa6];
    msgpack.extend_from_slice(b"prefix");
    msgpack.extend_from_slice(&[0xc7, 0x03, 0x0c, 0x81, 0x01, 0xc2]);

    let response = server()
        .configure_provider(Request::new(proto::configure_provider::Request {
            terraform_version: "1.9.0".to_string(),
            config: Some(proto::DynamicValue {
                msgpack,
                json: vec![],
            }),
            client_capabilities: None,
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].summary, "Unknown prefix");
}

#[tokio::test]
async fn test_read_before_configure_runs_without_provider_data() {
    let response = server()
        .read_data_source(read_request("example_widgets"))
        .await
        .unwrap()
        .into_inner();

    let state = DynamicValue::decode_msgpack(&response.state.unwrap().msgpack).unwrap();
    let name = AttributePath::new("widgets").index(0).attribute("name");
    assert_eq!(state.get_string(&name).unwrap(), "unconfigured-1");
}

#[tokio::test]
async fn test_unknown_data_source_type() {
    let response = server()
        .read_data_source(read_request("example_gadgets"))
        .await
        .unwrap()
        .into_inner();

    assert!(response.state.is_none());
    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].summary, "Data Source Type Not Found");
}

#[tokio::test]
async fn test_error_diagnostic_discards_state() {
    let response = server()
        .read_data_source(read_request("example_broken"))
        .await
        .unwrap()
        .into_inner();

    assert!(response.state.is_none());
    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(response.diagnostics[0].summary, "Unable to Read");
    assert_eq!(response.diagnostics[0].detail, "backend exploded");
    assert_eq!(
        response.diagnostics[0].severity,
        proto::diagnostic::Severity::Error as i32
    );
}

#[tokio::test]
async fn test_validate_rejects_undeclared_attributes() {
    let response = server()
        .validate_data_resource_config(Request::new(
            proto::validate_data_resource_config::Request {
                type_name: "example_broken".to_string(),
                config: wire(Dynamic::Map(HashMap::from([(
                    "colour".to_string(),
                    Dynamic::String("red".to_string()),
                )]))),
            },
        ))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(
        response.diagnostics[0].summary,
        "Invalid Data Source Configuration"
    );
    assert!(response.diagnostics[0].detail.contains("colour"));
}

#[tokio::test]
async fn test_validate_provider_config_checks_types() {
    let server = server();

    let ok = server
        .validate_provider_config(Request::new(proto::validate_provider_config::Request {
            config: wire(Dynamic::Map(HashMap::new())),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(ok.diagnostics.is_empty());

    let bad = server
        .validate_provider_config(Request::new(proto::validate_provider_config::Request {
            config: wire(Dynamic::Map(HashMap::from([(
                "prefix".to_string(),
                Dynamic::Number(3.0),
            )]))),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(bad.diagnostics[0].summary, "Invalid Provider Configuration");
}

#[tokio::test]
async fn test_stop_provider_cancels_in_flight_reads() {
    let server = server();

    let reader = {
        let server = server.clone();
        tokio::spawn(async move { server.read_data_source(read_request("example_slow")).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    server
        .stop_provider(Request::new(proto::stop_provider::Request {}))
        .await
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(1), reader)
        .await
        .expect("read should finish once the provider is stopped")
        .unwrap()
        .unwrap()
        .into_inner();

    assert!(server.stop_context().is_cancelled());
    assert!(response.state.is_none());
    assert_eq!(response.diagnostics[0].summary, "Read Cancelled");
}

#[tokio::test]
async fn test_request_timeout_bounds_reads() {
    let server = server().with_request_timeout(Duration::from_millis(20));

    let response = tokio::time::timeout(
        Duration::from_secs(1),
        server.read_data_source(read_request("example_slow")),
    )
    .await
    .expect("read should be cut off by the request timeout")
    .unwrap()
    .into_inner();

    assert_eq!(response.diagnostics[0].summary, "Read Cancelled");
    assert!(!server.stop_context().is_cancelled());
}

#[tokio::test]
async fn test_duplicate_type_names_are_reported() {
    let server = ProviderServer::new(TestProvider::new(vec![
        WidgetsDataSource::create as DataSourceFactory,
        WidgetsDataSource::create as DataSourceFactory,
    ]));

    let response = server
        .get_metadata(Request::new(proto::get_metadata::Request {}))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.data_sources.len(), 1);
    assert_eq!(response.diagnostics.len(), 1);
    assert_eq!(
        response.diagnostics[0].summary,
        "Duplicate Data Source Type Defined"
    );
}
