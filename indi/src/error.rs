//! INDI error types
//!
//! Provides structured error types for configuration, validation and
//! protocol dispatch failures.

use crate::IndiPropertyType;

/// INDI server errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndiError {
    /// Property configuration could not be parsed or is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),
    /// Entry name not present in the addressed vector
    #[error("Unknown entry '{entry}' in vector '{vector}'")]
    UnknownEntry { vector: String, entry: String },
    /// Value does not parse for the vector's kind
    #[error("Invalid {kind} value '{value}' for {vector}.{entry}")]
    InvalidValue {
        vector: String,
        entry: String,
        kind: IndiPropertyType,
        value: String,
    },
    /// Attempted to write a read-only property
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Malformed or unsupported request
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Socket or file failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl IndiError {
    /// True for entry-level validation failures (unknown entry, bad value)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            IndiError::UnknownEntry { .. } | IndiError::InvalidValue { .. }
        )
    }
}

impl From<std::io::Error> for IndiError {
    fn from(err: std::io::Error) -> Self {
        IndiError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for IndiError {
    fn from(err: serde_json::Error) -> Self {
        IndiError::Config(err.to_string())
    }
}

impl From<IndiError> for String {
    fn from(err: IndiError) -> String {
        err.to_string()
    }
}

/// Result type for INDI operations
pub type IndiResult<T> = Result<T, IndiError>;
