use crate::core::types::ApiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SocketError {
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Connection closed before a response to request {0} arrived")]
    RequestAbandoned(u64),

    #[error("Socket task is no longer running")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

/// Outcome of a failed readiness handshake.
///
/// Cloneable because every holder of a [`ReadinessSignal`](crate::socket::ReadinessSignal)
/// observes the same outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("Authorization failed: {0}")]
    Authorization(ApiError),

    #[error("Identity mismatch: expected {expected:?}, server authorized {actual:?}")]
    IdentityMismatch {
        expected: Option<String>,
        actual: Option<String>,
    },

    #[error("Settings request failed: {0}")]
    Settings(ApiError),

    #[error("Connection attempt was abandoned before the session became ready")]
    Abandoned,
}
