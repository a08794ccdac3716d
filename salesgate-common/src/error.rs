//! Common error types for SalesGate

use thiserror::Error;

/// Common result type for SalesGate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across SalesGate collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested bucket, object or key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid bucket/object name or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Object store failure
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Message bus failure
    #[error("Message bus error: {0}")]
    Bus(String),

    /// Key-value store failure (including reply type mismatches)
    #[error("Key-value store error: {0}")]
    KeyValue(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error reports a missing bucket, object or key
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
