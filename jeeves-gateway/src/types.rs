//! Common types for the gateway.

use thiserror::Error;

/// Gateway result type
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Gateway error types
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    /// Insert hit a unique index
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
}
