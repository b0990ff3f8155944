//! Error types for Nexus consistency checking
//!
//! Only collaborator failures and contract violations surface here.
//! Structural findings about the store are never errors: they go through
//! the [`crate::report::Reporter`].

use thiserror::Error;

/// Result type alias using the consistency checker's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures of a check or scan pass
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from configuration or store access
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store-access collaborator failed to produce a record
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record or structure that must exist is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller broke an operation's precondition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or is out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a precondition error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
