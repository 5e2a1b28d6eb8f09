//! Error types for agent routing and execution.

use sibyl_session::AgentKind;
use thiserror::Error;

/// Result alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised while routing a query or running an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The completion backend failed or returned an unusable reply.
    #[error("completion error: {0}")]
    Llm(#[from] sibyl_llm::LlmError),

    /// Session state could not be read or written.
    #[error("session error: {0}")]
    Session(#[from] sibyl_session::SessionError),

    /// No agent is registered for the selected kind.
    #[error("no agent registered for kind: {0}")]
    NotRegistered(AgentKind),

    /// The query names nothing that can be extracted.
    #[error("no extraction target found in query")]
    NoTarget,

    /// No registered extractor can handle the target.
    #[error("no extractor supports target: {0}")]
    NoExtractor(String),

    /// Content extraction began but failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The agent ran but could not produce a reply.
    #[error("agent execution failed: {0}")]
    Execution(String),
}

impl AgentError {
    /// Create an extraction error.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Short label for the error category, recorded on failed interactions.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Llm(_) => "llm",
            Self::Session(_) => "session",
            Self::NotRegistered(_) => "not-registered",
            Self::NoTarget => "no-target",
            Self::NoExtractor(_) => "no-extractor",
            Self::Extraction(_) => "extraction",
            Self::Execution(_) => "execution",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::NoTarget;
        assert_eq!(err.to_string(), "no extraction target found in query");

        let err = AgentError::NotRegistered(AgentKind::Extraction);
        assert_eq!(err.to_string(), "no agent registered for kind: extraction");
    }

    #[test]
    fn test_kind_label() {
        assert_eq!(AgentError::NoTarget.kind_label(), "no-target");
        assert_eq!(AgentError::extraction("boom").kind_label(), "extraction");
        assert_eq!(
            AgentError::from(sibyl_llm::LlmError::backend("offline")).kind_label(),
            "llm"
        );
    }

    #[test]
    fn test_llm_error_converts() {
        let llm = sibyl_llm::LlmError::backend("offline");
        let err: AgentError = llm.into();
        assert!(matches!(err, AgentError::Llm(_)));
    }
}
