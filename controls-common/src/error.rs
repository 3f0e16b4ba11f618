//! Common error types for the controls tools

use thiserror::Error;

/// Common result type for controls operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the controls crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialized per-mode record could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (bad mode name, malformed identifier)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
