//! Two-tier query classifier.
//!
//! Tier one is a set of deterministic rules that settle unambiguous queries
//! without a model call. Everything else goes to the completion model with a
//! constrained JSON schema. Classification never fails: if the model tier
//! errors or times out, the result degrades to the default agent at low
//! confidence and the turn carries on.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use sibyl_llm::{CompletionRequest, Message, SharedBackend};
use sibyl_session::{AgentKind, EntityCandidate, EntityKind};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Candidate, Classification, ClassifierOrigin};

/// Confidence when a repository reference settles routing outright.
const REPO_SIGNAL_CONFIDENCE: f32 = 0.95;
/// Confidence when an extraction verb plus a concrete path settle routing.
const PATH_VERB_CONFIDENCE: f32 = 0.85;
/// Confidence when the query carries no extraction signal at all.
const PLAIN_CONVERSATION_CONFIDENCE: f32 = 0.75;

/// Verbs that ask for content to be pulled out of something.
static EXTRACTION_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(extract|extraction|fetch|download|clone|pull (?:the )?(?:files?|contents?)|get (?:the )?(?:files?|contents?))\b",
    )
    .expect("extraction verb pattern")
});

/// Nouns that hint at extraction but are not conclusive on their own.
static WEAK_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(repo|repository|repositories|director(?:y|ies)|folders?|codebase)\b")
        .expect("weak signal pattern")
});

const SYSTEM_PROMPT: &str = "You route developer queries to exactly one agent.\n\
    \n\
    extraction: pulls file contents out of a repository or local directory the query names.\n\
    conversation: answers general questions about code, tools, and workflows.\n\
    \n\
    Reply with a single JSON object: \
    {\"agent\": \"extraction\" or \"conversation\", \"confidence\": number between 0 and 1}.";

/// Tuning for the classifier. Defaults match the shipped configuration.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model used by the fallback tier.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Budget for one model classification, including retries.
    pub timeout: Duration,
    /// Agent used when the model tier is unavailable.
    pub default_agent: AgentKind,
    /// Confidence reported for the degraded default.
    pub degraded_confidence: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 128,
            temperature: 0.0,
            timeout: Duration::from_secs(10),
            default_agent: AgentKind::Conversation,
            degraded_confidence: 0.3,
        }
    }
}

/// Routes queries to an agent kind, never failing outright.
pub struct Classifier {
    backend: SharedBackend,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(backend: SharedBackend, config: ClassifierConfig) -> Self {
        Self { backend, config }
    }

    /// Classify a resolved query. `mentions` are the entity candidates the
    /// tracker found in the same text, which the fast path reuses instead of
    /// re-parsing paths and repository references.
    pub async fn classify(
        &self,
        query: &str,
        mentions: &[EntityCandidate],
    ) -> Classification {
        if let Some(fast) = classify_fast(query, mentions) {
            debug!(
                agent = %fast.top().map(|c| c.kind.as_str()).unwrap_or("none"),
                "Classified on the fast path"
            );
            return fast;
        }

        match tokio::time::timeout(self.config.timeout, self.classify_with_model(query)).await {
            Ok(Ok(classification)) => classification,
            Ok(Err(err)) => {
                warn!(error = %err, "Classifier model unavailable, degrading to default");
                self.degraded()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Classifier model timed out, degrading to default"
                );
                self.degraded()
            }
        }
    }

    fn degraded(&self) -> Classification {
        Classification::degraded(self.config.default_agent, self.config.degraded_confidence)
    }

    async fn classify_with_model(&self, query: &str) -> Result<Classification> {
        let schema = json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string", "enum": ["extraction", "conversation"]},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
            },
            "required": ["agent", "confidence"],
            "additionalProperties": false
        });

        let request = CompletionRequest::new(
            &self.config.model,
            vec![Message::user(query)],
            self.config.max_tokens,
        )
        .with_system(SYSTEM_PROMPT)
        .with_temperature(self.config.temperature)
        .with_response_schema(schema);

        let response = self.backend.complete(request).await?;
        let payload = response.json_payload()?;
        let verdict: ModelVerdict = serde_json::from_value(payload)
            .map_err(|e| sibyl_llm::LlmError::invalid_response(format!("router verdict: {e}")))?;

        let confidence = verdict.confidence.clamp(0.0, 1.0);
        let other = match verdict.agent {
            AgentKind::Extraction => AgentKind::Conversation,
            AgentKind::Conversation => AgentKind::Extraction,
        };
        debug!(agent = %verdict.agent, confidence, "Classified by model");

        Ok(Classification::new(
            vec![
                Candidate::new(verdict.agent, confidence),
                Candidate::new(other, 1.0 - confidence),
            ],
            ClassifierOrigin::Model,
        ))
    }
}

/// What the model is asked to return.
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    agent: AgentKind,
    confidence: f32,
}

/// Deterministic tier. Returns None when the query is ambiguous enough to
/// need the model.
fn classify_fast(query: &str, mentions: &[EntityCandidate]) -> Option<Classification> {
    let has_repo = mentions.iter().any(|m| m.kind == EntityKind::Repository);
    if has_repo {
        return Some(Classification::new(
            vec![
                Candidate::new(AgentKind::Extraction, REPO_SIGNAL_CONFIDENCE),
                Candidate::new(AgentKind::Conversation, 1.0 - REPO_SIGNAL_CONFIDENCE),
            ],
            ClassifierOrigin::FastPath,
        ));
    }

    let has_path = mentions
        .iter()
        .any(|m| matches!(m.kind, EntityKind::FilePath | EntityKind::DirectoryPath));
    let has_verb = EXTRACTION_VERB.is_match(query);

    if has_path && has_verb {
        return Some(Classification::new(
            vec![
                Candidate::new(AgentKind::Extraction, PATH_VERB_CONFIDENCE),
                Candidate::new(AgentKind::Conversation, 1.0 - PATH_VERB_CONFIDENCE),
            ],
            ClassifierOrigin::FastPath,
        ));
    }

    // A lone verb, path, or extraction-flavored noun is not conclusive.
    if has_path || has_verb || WEAK_SIGNAL.is_match(query) {
        return None;
    }

    Some(Classification::new(
        vec![
            Candidate::new(AgentKind::Conversation, PLAIN_CONVERSATION_CONFIDENCE),
            Candidate::new(AgentKind::Extraction, 1.0 - PLAIN_CONVERSATION_CONFIDENCE),
        ],
        ClassifierOrigin::FastPath,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sibyl_llm::MockBackend;
    use sibyl_session::EntityTracker;

    use super::*;

    fn classifier_with(mock: MockBackend) -> (Arc<MockBackend>, Classifier) {
        let backend = Arc::new(mock);
        let shared: SharedBackend = backend.clone();
        (
            backend,
            Classifier::new(shared, ClassifierConfig::default()),
        )
    }

    fn mentions_for(query: &str) -> Vec<EntityCandidate> {
        EntityTracker::new().extract(query)
    }

    #[tokio::test]
    async fn test_repository_mention_settles_fast() {
        let (backend, classifier) = classifier_with(MockBackend::new());
        let query = "summarize github.com/rust-lang/regex for me";

        let result = classifier.classify(query, &mentions_for(query)).await;

        assert_eq!(result.origin, ClassifierOrigin::FastPath);
        assert_eq!(result.top().unwrap().kind, AgentKind::Extraction);
        assert!((result.top().unwrap().confidence - 0.95).abs() < 1e-6);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_verb_plus_path_settles_fast() {
        let (backend, classifier) = classifier_with(MockBackend::new());
        let query = "extract /tmp/project/main.py";

        let result = classifier.classify(query, &mentions_for(query)).await;

        assert_eq!(result.origin, ClassifierOrigin::FastPath);
        assert_eq!(result.top().unwrap().kind, AgentKind::Extraction);
        assert!((result.top().unwrap().confidence - 0.85).abs() < 1e-6);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_plain_question_settles_fast_as_conversation() {
        let (backend, classifier) = classifier_with(MockBackend::new());
        let query = "how do lifetimes work in Rust?";

        let result = classifier.classify(query, &mentions_for(query)).await;

        assert_eq!(result.origin, ClassifierOrigin::FastPath);
        assert_eq!(result.top().unwrap().kind, AgentKind::Conversation);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_weak_signal_goes_to_model() {
        let mock = MockBackend::with_text(r#"{"agent": "conversation", "confidence": 0.9}"#);
        let (backend, classifier) = classifier_with(mock);
        let query = "what makes a repository well organized?";

        let result = classifier.classify(query, &mentions_for(query)).await;

        assert_eq!(backend.request_count(), 1);
        assert_eq!(result.origin, ClassifierOrigin::Model);
        assert_eq!(result.top().unwrap().kind, AgentKind::Conversation);
        assert!((result.top().unwrap().confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_verb_without_path_goes_to_model() {
        let mock = MockBackend::with_text(r#"{"agent": "extraction", "confidence": 0.7}"#);
        let (backend, classifier) = classifier_with(mock);
        let query = "extract the key points from our discussion";

        let result = classifier.classify(query, &mentions_for(query)).await;

        assert_eq!(backend.request_count(), 1);
        assert_eq!(result.top().unwrap().kind, AgentKind::Extraction);
    }

    #[tokio::test]
    async fn test_model_request_carries_schema_and_query() {
        let mock = MockBackend::with_text(r#"{"agent": "conversation", "confidence": 0.8}"#);
        let (backend, classifier) = classifier_with(mock);
        let query = "tell me about the folder layout conventions";

        classifier.classify(query, &mentions_for(query)).await;

        let request = backend.last_request().unwrap();
        assert_eq!(request.messages[0].content, query);
        assert!(request.response_schema.is_some());
        assert!(request.system.as_deref().unwrap().contains("extraction"));
    }

    #[tokio::test]
    async fn test_fenced_model_reply_is_accepted() {
        let mock = MockBackend::with_text(
            "```json\n{\"agent\": \"extraction\", \"confidence\": 0.88}\n```",
        );
        let (_backend, classifier) = classifier_with(mock);

        let result = classifier.classify("fetch the important parts", &[]).await;

        assert_eq!(result.origin, ClassifierOrigin::Model);
        assert_eq!(result.top().unwrap().kind, AgentKind::Extraction);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_default() {
        let mock = MockBackend::new();
        mock.queue_failure("connection refused");
        let (_backend, classifier) = classifier_with(mock);

        let result = classifier.classify("fetch the gist of this", &[]).await;

        assert!(result.is_degraded());
        assert_eq!(result.top().unwrap().kind, AgentKind::Conversation);
        assert!((result.top().unwrap().confidence - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unparseable_model_reply_degrades() {
        let mock = MockBackend::with_text("I think this is a conversation query.");
        let (_backend, classifier) = classifier_with(mock);

        let result = classifier.classify("download everything relevant", &[]).await;

        assert!(result.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_degrades() {
        let mock = MockBackend::new();
        mock.queue_hang();
        let (_backend, classifier) = classifier_with(mock);

        let result = classifier.classify("clone something useful", &[]).await;

        assert!(result.is_degraded());
        assert!((result.top().unwrap().confidence - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_clamped() {
        let mock = MockBackend::with_text(r#"{"agent": "extraction", "confidence": 1.7}"#);
        let (_backend, classifier) = classifier_with(mock);

        let result = classifier.classify("fetch whatever matters", &[]).await;

        assert!((result.top().unwrap().confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pull_request_is_not_an_extraction_verb() {
        assert!(!EXTRACTION_VERB.is_match("review my pull request please"));
        assert!(EXTRACTION_VERB.is_match("pull the files from that folder"));
        assert!(EXTRACTION_VERB.is_match("get the contents of src"));
    }
}
