//! Common error types for Curio.

use thiserror::Error;

/// Top-level error type for Curio operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration is missing or invalid (key, database path).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope could not be decrypted (malformed envelope, bad padding).
    #[error("Decrypt error: {0}")]
    Decrypt(String),

    /// Document is structurally invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A maintenance operation is already running against this database.
    #[error("Operation already in progress: {0}")]
    OperationInProgress(String),
}

impl Error {
    /// Build an `Io` error from a plain message, for conditions that are
    /// I/O failures by nature but not produced by std (short file, etc).
    pub fn io_message(msg: impl Into<String>) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            msg.into(),
        ))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
