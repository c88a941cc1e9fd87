//! Error types shared across Chronicle crates

use thiserror::Error;

/// Result type alias for Chronicle operations
pub type Result<T> = std::result::Result<T, ChronicleError>;

/// Main error type for Chronicle
#[derive(Error, Debug)]
pub enum ChronicleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ChronicleError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
