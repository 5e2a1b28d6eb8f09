//! Error types for session memory.

use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by session memory and its persistence layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session id cannot be mapped to a file name.
    #[error("Invalid session id {0:?}: only letters, digits, '.', '_' and '-' are allowed")]
    InvalidId(String),

    /// Variable name rejected by the store.
    #[error("Invalid variable name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Variable value rejected (would make resolution non-terminating).
    #[error("Invalid definition for {name:?}: {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// Reading or writing the backing file failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Session document could not be encoded or decoded.
    #[error("Session JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Create an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-definition error.
    pub fn invalid_definition(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}
