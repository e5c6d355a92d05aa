//! Error types for OVBridge

use thiserror::Error;

/// Result type alias using OVBridge's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for OVBridge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration (credentials, routing key, TLS material)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The management API refused the login
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or timeout failure on an outbound call
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected response from the management API
    #[error("Unexpected response from {endpoint}: HTTP {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an unexpected-status error for a management API endpoint
    pub fn unexpected_status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            endpoint: endpoint.into(),
            status,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
