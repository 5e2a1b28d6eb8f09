//! Turn coordinator.
//!
//! Owns the full life of one query: open the session, resolve variables,
//! resolve entity references, classify, dispatch to an agent, and persist
//! the outcome. The session's lock is held for the whole turn, so turns
//! within one session never interleave.
//!
//! Agent failures are not process failures: the turn is recorded as failed,
//! the session is still saved, and the caller gets a report describing what
//! went wrong. Only session persistence errors surface as `Err`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sibyl_session::{
    AgentKind, EntityTracker, Interaction, InteractionOutcome, Session, SessionStore,
};
use tracing::{debug, info, warn};

use crate::agent::AgentRegistry;
use crate::classifier::Classifier;
use crate::error::{AgentError, Result};
use crate::types::{AgentRequest, Classification, TurnContext, TurnReport};

/// Where user variables live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    /// One store shared by every session.
    #[default]
    Global,
    /// Each session carries its own store.
    Session,
}

/// Routing thresholds and context limits.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Below this top confidence, routing falls back to the default agent.
    pub min_confidence: f32,
    /// Below this top-two gap, routing falls back to the default agent.
    pub confidence_margin: f32,
    pub default_agent: AgentKind,
    /// Prior interactions handed to agents as context.
    pub history_window: usize,
    pub variable_scope: VariableScope,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            confidence_margin: 0.2,
            default_agent: AgentKind::Conversation,
            history_window: 5,
            variable_scope: VariableScope::Global,
        }
    }
}

impl CoordinatorConfig {
    /// Apply the fallback policy to a ranked classification.
    ///
    /// Returns the agent to dispatch to and whether the policy overrode the
    /// ranking.
    fn route(&self, classification: &Classification) -> (AgentKind, bool) {
        let Some(top) = classification.top() else {
            return (self.default_agent, true);
        };
        if top.confidence < self.min_confidence {
            return (self.default_agent, true);
        }
        if let Some(margin) = classification.margin() {
            if margin < self.confidence_margin {
                return (self.default_agent, true);
            }
        }
        (top.kind, false)
    }
}

/// Drives queries through resolution, classification, dispatch, and
/// persistence.
pub struct Coordinator {
    store: Arc<SessionStore>,
    classifier: Classifier,
    registry: AgentRegistry,
    tracker: EntityTracker,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<SessionStore>,
        classifier: Classifier,
        registry: AgentRegistry,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            registry,
            tracker: EntityTracker::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Process one query against a session.
    pub async fn process(&self, session_id: &str, raw_query: &str) -> Result<TurnReport> {
        let started = Instant::now();
        let handle = self.store.open(session_id)?;
        let mut session = handle.lock().await;
        let sequence = session.next_sequence();
        debug!(%session_id, sequence, "Turn received");

        let mut warnings = Vec::new();

        // Variables first, so every later stage sees the substituted text.
        let (resolution, variables) = match self.config.variable_scope {
            VariableScope::Session => (
                session.variables.resolve(raw_query),
                session.variables.list().to_vec(),
            ),
            VariableScope::Global => {
                let globals = self.store.load_globals()?;
                (globals.resolve(raw_query), globals.list().to_vec())
            }
        };
        for name in &resolution.unresolved {
            warnings.push(format!("unresolved variable: {{{name}}}"));
        }
        let mut resolved = resolution.text;
        debug!(
            sequence,
            unresolved = resolution.unresolved.len(),
            "Variables resolved"
        );

        // Back-references next, then fold this query's mentions into the
        // session so future turns can refer to them.
        if let Some((rewritten, entity)) = self.tracker.rewrite_reference(&resolved, &session) {
            debug!(sequence, entity = %entity.value, "Back-reference resolved");
            resolved = rewritten;
        }
        let mentions = self.tracker.extract(&resolved);
        self.tracker.merge(&mut session, &mentions, sequence);
        debug!(sequence, mentions = mentions.len(), "Entities resolved");

        let mut classification = self.classifier.classify(&resolved, &mentions).await;
        if classification.is_degraded() {
            warnings.push("classification degraded to default".to_string());
        }

        let (selected, fell_back) = self.config.route(&classification);
        classification.select(selected);
        if fell_back && !classification.is_degraded() {
            warnings.push(format!(
                "low classification confidence, using {} agent",
                self.config.default_agent
            ));
        }
        let confidence = classification.confidence_for(selected);
        debug!(
            sequence,
            agent = %selected,
            confidence,
            fell_back,
            "Query classified"
        );

        let request = AgentRequest {
            session_id: session_id.to_string(),
            query: resolved.clone(),
        };
        let ctx = TurnContext {
            entities: session.entities.clone(),
            variables,
            history: session
                .recent_interactions(self.config.history_window)
                .to_vec(),
        };
        let dispatched = match self.registry.get(selected) {
            Some(agent) => agent.handle(&request, &ctx).await,
            None => Err(AgentError::NotRegistered(selected)),
        };

        // The interaction is recorded whether the agent succeeded or not.
        // Only a failure to persist escapes as an error.
        match dispatched {
            Ok(reply) => {
                let reply_mentions = self.tracker.extract(&reply.text);
                self.tracker.merge(&mut session, &reply_mentions, sequence);

                self.record(
                    &mut session,
                    Interaction {
                        sequence,
                        query: raw_query.to_string(),
                        resolved_query: resolved,
                        agent: selected,
                        response: reply.text.clone(),
                        timestamp: Utc::now(),
                        confidence,
                        outcome: InteractionOutcome::Completed,
                        warnings: warnings.clone(),
                    },
                )?;
                info!(
                    %session_id,
                    sequence,
                    agent = %selected,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Turn completed"
                );

                Ok(TurnReport {
                    session_id: session_id.to_string(),
                    sequence,
                    agent: selected,
                    confidence,
                    origin: classification.origin,
                    fell_back,
                    response: reply.text,
                    warnings,
                    outcome: InteractionOutcome::Completed,
                })
            }
            Err(err) => {
                warn!(%session_id, sequence, agent = %selected, error = %err, "Agent failed");
                let error_label = format!("{}: {err}", err.kind_label());
                let response =
                    format!("The {selected} agent could not complete this request: {err}");

                self.record(
                    &mut session,
                    Interaction {
                        sequence,
                        query: raw_query.to_string(),
                        resolved_query: resolved,
                        agent: selected,
                        response: response.clone(),
                        timestamp: Utc::now(),
                        confidence,
                        outcome: InteractionOutcome::Failed {
                            error: error_label.clone(),
                        },
                        warnings: warnings.clone(),
                    },
                )?;

                Ok(TurnReport {
                    session_id: session_id.to_string(),
                    sequence,
                    agent: selected,
                    confidence,
                    origin: classification.origin,
                    fell_back,
                    response,
                    warnings,
                    outcome: InteractionOutcome::Failed { error: error_label },
                })
            }
        }
    }

    fn record(&self, session: &mut Session, interaction: Interaction) -> Result<()> {
        self.store.append(session, interaction);
        self.store.save(session)?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sibyl_llm::{MockBackend, SharedBackend};
    use sibyl_session::{Entity, EntityKind, VariableStore};
    use tempfile::TempDir;

    use crate::agents::{ConversationAgent, ConversationConfig, ExtractionAgent};
    use crate::classifier::ClassifierConfig;
    use crate::extract::{
        ContentExtractor, ExtractedFile, Extraction, ExtractionFilters, ExtractionTarget,
    };
    use crate::types::{Candidate, ClassifierOrigin};

    use super::*;

    /// Local-path extractor that echoes the target instead of reading disk.
    struct CannedExtractor;

    #[async_trait]
    impl ContentExtractor for CannedExtractor {
        fn name(&self) -> &str {
            "canned"
        }

        fn supports(&self, target: &ExtractionTarget) -> bool {
            matches!(target, ExtractionTarget::LocalPath { .. })
        }

        async fn extract(
            &self,
            target: &ExtractionTarget,
            _filters: &ExtractionFilters,
        ) -> Result<Extraction> {
            Ok(Extraction {
                label: target.to_string(),
                files: vec![ExtractedFile {
                    path: "file".into(),
                    content: format!("contents of {target}"),
                }],
                skipped: 0,
            })
        }
    }

    fn build(dir: &TempDir, mock: Arc<MockBackend>) -> (Arc<SessionStore>, Coordinator) {
        let store = Arc::new(SessionStore::new(dir.path()));
        let shared: SharedBackend = mock;

        let classifier = Classifier::new(shared.clone(), ClassifierConfig::default());
        let mut registry = AgentRegistry::new();
        registry.register(ConversationAgent::new(
            shared,
            ConversationConfig::default(),
        ));
        registry.register(ExtractionAgent::new(vec![Arc::new(CannedExtractor)]));

        let coordinator = Coordinator::new(
            store.clone(),
            classifier,
            registry,
            CoordinatorConfig::default(),
        );
        (store, coordinator)
    }

    async fn seed_entities(store: &SessionStore, id: &str, entities: Vec<Entity>) {
        let handle = store.open(id).unwrap();
        let mut session = handle.lock().await;
        session.last_sequence = entities.iter().map(|e| e.last_referenced).max().unwrap_or(0);
        session.entities = entities;
    }

    #[tokio::test]
    async fn test_back_reference_resolves_to_most_recent_file() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new());
        let (store, coordinator) = build(&dir, mock.clone());

        seed_entities(
            &store,
            "demo",
            vec![
                Entity::new(EntityKind::DirectoryPath, "/src", 1),
                Entity::new(EntityKind::FilePath, "/tmp/a.py", 2),
            ],
        )
        .await;

        let report = coordinator.process("demo", "extract it").await.unwrap();

        assert_eq!(report.agent, AgentKind::Extraction);
        assert!(report.succeeded());
        assert!(report.response.contains("contents of /tmp/a.py"));
        // Settled on the fast path, so the model never ran.
        assert_eq!(mock.request_count(), 0);

        let handle = store.open("demo").unwrap();
        let session = handle.lock().await;
        let last = session.interactions.last().unwrap();
        assert_eq!(last.query, "extract it");
        assert_eq!(last.resolved_query, "extract /tmp/a.py");
    }

    #[tokio::test]
    async fn test_variables_substituted_before_classification() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new());
        mock.queue_text(r#"{"agent": "conversation", "confidence": 0.9}"#);
        mock.queue_text("an opinion");
        let (store, coordinator) = build(&dir, mock.clone());

        let mut globals = VariableStore::new();
        globals.set("opener", "what do you think").unwrap();
        store.save_globals(&globals).unwrap();

        let report = coordinator
            .process("demo", "{opener} about the repository concept?")
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(report.warnings.is_empty());
        assert_eq!(report.response, "an opinion");

        // The classifier's model request carries the substituted text.
        let classify_request = &mock.requests()[0];
        assert_eq!(
            classify_request.messages[0].content,
            "what do you think about the repository concept?"
        );

        let handle = store.open("demo").unwrap();
        let session = handle.lock().await;
        assert_eq!(
            session.interactions[0].resolved_query,
            "what do you think about the repository concept?"
        );
    }

    #[tokio::test]
    async fn test_unresolved_variable_warns_and_stays_verbatim() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::with_text("sure"));
        let (store, coordinator) = build(&dir, mock);

        let report = coordinator
            .process("demo", "describe {missing_thing} briefly")
            .await
            .unwrap();

        assert!(report.succeeded());
        assert!(
            report
                .warnings
                .contains(&"unresolved variable: {missing_thing}".to_string())
        );

        let handle = store.open("demo").unwrap();
        let session = handle.lock().await;
        let interaction = &session.interactions[0];
        assert_eq!(interaction.resolved_query, "describe {missing_thing} briefly");
        assert_eq!(interaction.warnings, report.warnings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifier_timeout_degrades_and_still_completes() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new());
        mock.queue_hang();
        mock.queue_text("fallback answer");
        let (_store, coordinator) = build(&dir, mock);

        let report = coordinator
            .process("demo", "thoughts on the repository layout?")
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.agent, AgentKind::Conversation);
        assert_eq!(report.origin, ClassifierOrigin::Degraded);
        assert!(report.fell_back);
        assert!((report.confidence - 0.3).abs() < 1e-6);
        assert!(
            report
                .warnings
                .contains(&"classification degraded to default".to_string())
        );
        assert_eq!(report.response, "fallback answer");

        // Persisted to disk: a fresh store sees the interaction.
        let fresh = SessionStore::new(dir.path());
        let handle = fresh.open("demo").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.interactions.len(), 1);
        assert!(!session.interactions[0].outcome.is_failed());
    }

    #[tokio::test]
    async fn test_agent_failure_recorded_and_persisted() {
        let dir = TempDir::new().unwrap();
        // Nothing queued: the conversation agent's completion call fails.
        let mock = Arc::new(MockBackend::new());
        let (_store, coordinator) = build(&dir, mock);

        let report = coordinator
            .process("demo", "hello there friend")
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.agent, AgentKind::Conversation);
        assert!(report.response.contains("could not complete"));
        let InteractionOutcome::Failed { error } = &report.outcome else {
            panic!("expected failed outcome");
        };
        assert!(error.starts_with("llm:"));

        let fresh = SessionStore::new(dir.path());
        let handle = fresh.open("demo").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.interactions.len(), 1);
        assert!(session.interactions[0].outcome.is_failed());
    }

    #[tokio::test]
    async fn test_missing_agent_is_a_recorded_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SessionStore::new(dir.path()));
        let mock = Arc::new(MockBackend::new());
        let shared: SharedBackend = mock;
        let coordinator = Coordinator::new(
            store.clone(),
            Classifier::new(shared, ClassifierConfig::default()),
            AgentRegistry::new(),
            CoordinatorConfig::default(),
        );

        let report = coordinator.process("demo", "hello out there").await.unwrap();

        assert!(!report.succeeded());
        let InteractionOutcome::Failed { error } = &report.outcome else {
            panic!("expected failed outcome");
        };
        assert!(error.starts_with("not-registered:"));

        let handle = store.open("demo").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.interactions.len(), 1);
    }

    #[tokio::test]
    async fn test_response_entities_join_the_session() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::with_text(
            "Check /var/log/app.log for the details.",
        ));
        let (store, coordinator) = build(&dir, mock);

        coordinator
            .process("demo", "where do the logs end up?")
            .await
            .unwrap();

        let handle = store.open("demo").unwrap();
        let session = handle.lock().await;
        assert!(
            session
                .entities
                .iter()
                .any(|e| e.kind == EntityKind::FilePath && e.value == "/var/log/app.log")
        );
    }

    #[tokio::test]
    async fn test_concurrent_turns_serialize_per_session() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new());
        mock.queue_text("one");
        mock.queue_text("two");
        let (store, coordinator) = build(&dir, mock);

        let (first, second) = tokio::join!(
            coordinator.process("demo", "say something nice"),
            coordinator.process("demo", "say something else"),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        let mut sequences = vec![first.sequence, second.sequence];
        sequences.sort_unstable();
        assert_eq!(sequences, vec![1, 2]);

        let handle = store.open("demo").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.interactions.len(), 2);
        assert_eq!(session.last_sequence, 2);
    }

    #[tokio::test]
    async fn test_invalid_session_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockBackend::new());
        let (_store, coordinator) = build(&dir, mock);

        let err = coordinator.process("bad/id", "hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Session(_)));
    }

    #[test]
    fn test_routing_policy_low_confidence_falls_back() {
        let config = CoordinatorConfig::default();
        let ranked = Classification::new(
            vec![
                Candidate::new(AgentKind::Extraction, 0.4),
                Candidate::new(AgentKind::Conversation, 0.05),
            ],
            ClassifierOrigin::Model,
        );

        let (agent, fell_back) = config.route(&ranked);
        assert_eq!(agent, AgentKind::Conversation);
        assert!(fell_back);
    }

    #[test]
    fn test_routing_policy_narrow_margin_falls_back() {
        let config = CoordinatorConfig::default();
        let ranked = Classification::new(
            vec![
                Candidate::new(AgentKind::Extraction, 0.95),
                Candidate::new(AgentKind::Conversation, 0.9),
            ],
            ClassifierOrigin::Model,
        );

        let (agent, fell_back) = config.route(&ranked);
        assert_eq!(agent, AgentKind::Conversation);
        assert!(fell_back);
    }

    #[test]
    fn test_routing_policy_confident_top_wins() {
        let config = CoordinatorConfig::default();
        let ranked = Classification::new(
            vec![
                Candidate::new(AgentKind::Extraction, 0.95),
                Candidate::new(AgentKind::Conversation, 0.1),
            ],
            ClassifierOrigin::FastPath,
        );

        let (agent, fell_back) = config.route(&ranked);
        assert_eq!(agent, AgentKind::Extraction);
        assert!(!fell_back);
    }

    #[test]
    fn test_routing_policy_empty_ranking_uses_default() {
        let config = CoordinatorConfig::default();
        let ranked = Classification::new(Vec::new(), ClassifierOrigin::Model);

        let (agent, fell_back) = config.route(&ranked);
        assert_eq!(agent, AgentKind::Conversation);
        assert!(fell_back);
    }
}
