use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Any response other than 200 OK
    #[error("status: {status}, body: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid host URL {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("define username and password")]
    MissingCredentials,
}
