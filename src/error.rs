//! Error types for the auth data server.

use thiserror::Error;

/// Result type alias for the server.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the auth data server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (missing or conflicting environment variables,
    /// invalid connection string).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// YAML parse error in the gateway endpoints document.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Gateway endpoints document failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Listener (PostgreSQL NOTIFY) error.
    #[error("Listener error: {0}")]
    Listener(String),

    /// File read error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server bind or serve error.
    #[error("Transport error: {0}")]
    Transport(String),
}
