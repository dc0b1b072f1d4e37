//! Server module for running Terraform providers
//!
//! This module starts the provider's gRPC server with TLS and performs the
//! go-plugin handshake Terraform expects on stdout.

use crate::error::{Result, TfplugError};
use crate::grpc::ProviderServer;
use crate::proto;
use crate::provider::Provider;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};

/// Environment variable Terraform sets when it launches a plugin
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Plugin protocol version advertised in the handshake
const PROTOCOL_VERSION: u32 = 6;
/// go-plugin core protocol version
const CORE_PROTOCOL_VERSION: u32 = 1;

/// Log level for the server
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a Terraform log level name (TRACE, DEBUG, INFO, WARN, ERROR)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TRACE" | "JSON" => Some(LogLevel::Trace),
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Level requested through `TF_LOG_PROVIDER`, falling back to `TF_LOG`
    pub fn from_env() -> Option<Self> {
        ["TF_LOG_PROVIDER", "TF_LOG"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find_map(|value| Self::parse(&value))
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Server configuration for running a Terraform provider
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to TLS certificate file
    pub cert_path: PathBuf,
    /// Path to TLS key file
    pub key_path: PathBuf,
    /// Maximum message size in bytes
    pub max_message_size: usize,
    pub log_level: LogLevel,
    /// Upper bound for every provider and data source call
    pub request_timeout: Option<Duration>,
    /// Refuse to start unless launched by Terraform
    pub require_magic_cookie: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("./certs/localhost.pem"),
            key_path: PathBuf::from("./certs/localhost-key.pem"),
            max_message_size: 256 << 20, // 256MB
            log_level: LogLevel::Info,
            request_timeout: None,
            require_magic_cookie: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cert_path(mut self, path: PathBuf) -> Self {
        self.cert_path = path;
        self
    }

    pub fn with_key_path(mut self, path: PathBuf) -> Self {
        self.key_path = path;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Allow running outside Terraform, e.g. under a debugger
    pub fn without_magic_cookie_check(mut self) -> Self {
        self.require_magic_cookie = false;
        self
    }
}

/// Verify the process was launched by Terraform
pub fn check_magic_cookie(value: Option<&str>) -> Result<()> {
    match value {
        Some(MAGIC_COOKIE_VALUE) => Ok(()),
        _ => Err(TfplugError::HandshakeError(
            "This binary is a plugin. These are not meant to be executed directly. \
             Please execute the program that consumes these plugins, which will \
             load any plugins automatically"
                .to_string(),
        )),
    }
}

/// Handshake line go-plugin reads from the plugin's stdout
pub fn handshake_line(addr: std::net::SocketAddr) -> String {
    format!(
        "{}|{}|tcp|{}|grpc",
        CORE_PROTOCOL_VERSION, PROTOCOL_VERSION, addr
    )
}

/// Main entry point for running a provider
pub async fn serve<P: Provider + 'static>(provider: P, config: ServerConfig) -> Result<()> {
    if config.require_magic_cookie {
        check_magic_cookie(std::env::var(MAGIC_COOKIE_KEY).ok().as_deref())?;
    }

    // Fails only when a provider is already installed, which is fine
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut grpc_server = ProviderServer::new(provider);
    if let Some(timeout) = config.request_timeout {
        grpc_server = grpc_server.with_request_timeout(timeout);
    }
    let provider_service = proto::ProviderServer::new(grpc_server)
        .max_decoding_message_size(config.max_message_size)
        .max_encoding_message_size(config.max_message_size);

    let cert = tokio::fs::read(&config.cert_path).await.map_err(|e| {
        TfplugError::TlsError(format!(
            "Failed to read certificate {}: {}",
            config.cert_path.display(),
            e
        ))
    })?;
    let key = tokio::fs::read(&config.key_path).await.map_err(|e| {
        TfplugError::TlsError(format!(
            "Failed to read key {}: {}",
            config.key_path.display(),
            e
        ))
    })?;
    let tls_config = ServerTlsConfig::new().identity(Identity::from_pem(cert, key));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let bound_addr = listener.local_addr()?;

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", handshake_line(bound_addr))?;
    stdout.flush()?;

    tracing::info!(address = %bound_addr, "Provider server started");

    Server::builder()
        .tls_config(tls_config)?
        .add_service(provider_service)
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await?;

    Ok(())
}
