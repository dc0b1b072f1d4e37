use hashicups::HashicupsProvider;
use std::env;
use std::path::PathBuf;
use tfplug::{LogLevel, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let log_level = LogLevel::from_env().unwrap_or(LogLevel::Info);

    // stdout carries the plugin handshake, so logs go to stderr
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(log_level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let exe_dir = env::current_exe()?
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let cert_path = env::var_os("HASHICUPS_TLS_CERT")
        .map(PathBuf::from)
        .unwrap_or_else(|| exe_dir.join("../../certs/localhost+2.pem"));
    let key_path = env::var_os("HASHICUPS_TLS_KEY")
        .map(PathBuf::from)
        .unwrap_or_else(|| exe_dir.join("../../certs/localhost+2-key.pem"));

    let config = ServerConfig::new()
        .with_cert_path(cert_path)
        .with_key_path(key_path)
        .with_log_level(log_level);

    tfplug::serve(HashicupsProvider::new(), config).await?;

    Ok(())
}
