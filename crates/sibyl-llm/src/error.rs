//! Error types for completion backends.

use thiserror::Error;

/// Result type for completion operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Everything that can go wrong between building a request and getting a
/// usable reply, ordered roughly by where in that lifecycle it happens.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The backend is misconfigured (missing key, bad base URL).
    #[error("bad backend configuration: {0}")]
    Config(String),

    /// The provider rejected our credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Connectivity failure, worth retrying.
    #[error("network failure: {0}")]
    Network(String),

    /// The request did not complete within its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The provider asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// The provider reported a server-side failure.
    #[error("provider error: {0}")]
    Backend(String),

    /// The provider replied, but not in the shape we asked for.
    #[error("unusable model reply: {0}")]
    InvalidResponse(String),

    /// Request or response JSON could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl LlmError {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid-response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Network("connection reset".into()).is_retryable());
        assert!(LlmError::RateLimit("429".into()).is_retryable());
        assert!(!LlmError::Auth("bad key".into()).is_retryable());
        assert!(!LlmError::Timeout("deadline".into()).is_retryable());
        assert!(!LlmError::config("no key").is_retryable());
    }

    #[test]
    fn test_display_includes_message() {
        let err = LlmError::backend("model overloaded");
        assert!(err.to_string().contains("model overloaded"));
    }
}
