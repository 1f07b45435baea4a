//! Error types for AlertBridge

use thiserror::Error;

use crate::source::FetchError;

/// Result type alias using AlertBridge's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AlertBridge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Metrics source could not be queried this run
    #[error("Metrics fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Metrics source failed too many consecutive times
    #[error("Metrics source unreachable after {attempts} consecutive attempts")]
    SourceUnreachable {
        /// Consecutive failed fetches, including the last one
        attempts: u32,
    },

    /// Alert state could not be persisted
    #[error("State store error: {0}")]
    StateStore(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
