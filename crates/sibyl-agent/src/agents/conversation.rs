//! General developer Q&A agent.
//!
//! Answers one-shot questions with the completion backend, carrying a small
//! slice of session memory into the prompt: the last few turns and the most
//! recently referenced entities.

use async_trait::async_trait;
use sibyl_llm::{CompletionRequest, Message, SharedBackend};
use sibyl_session::AgentKind;
use tracing::debug;

use crate::agent::Agent;
use crate::error::Result;
use crate::types::{AgentReply, AgentRequest, TurnContext};

const SYSTEM_PROMPT: &str = "You are a concise assistant for software developers. \
    Answer directly, prefer short examples over long prose, and say so when \
    you are unsure.";

/// Tuning for the conversation agent.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Prior turns carried into the prompt.
    pub history_turns: usize,
    /// Tracked entities carried into the prompt.
    pub entity_limit: usize,
    /// Prior responses are clipped to this many characters.
    pub snippet_chars: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            history_turns: 3,
            entity_limit: 5,
            snippet_chars: 150,
        }
    }
}

/// Answers general questions, with session context when available.
pub struct ConversationAgent {
    backend: SharedBackend,
    config: ConversationConfig,
}

impl ConversationAgent {
    pub fn new(backend: SharedBackend, config: ConversationConfig) -> Self {
        Self { backend, config }
    }

    /// Assemble the user prompt: context block first (if any), then the
    /// question itself.
    fn build_prompt(&self, query: &str, ctx: &TurnContext) -> String {
        let history = ctx
            .history
            .iter()
            .rev()
            .take(self.config.history_turns)
            .collect::<Vec<_>>();

        let mut entities = ctx.entities.iter().collect::<Vec<_>>();
        entities.sort_by(|a, b| b.last_referenced.cmp(&a.last_referenced));
        entities.truncate(self.config.entity_limit);

        if history.is_empty() && entities.is_empty() {
            return query.to_string();
        }

        let mut prompt = String::from("Context from this session:\n");
        for turn in history.into_iter().rev() {
            prompt.push_str("Q: ");
            prompt.push_str(&turn.query);
            prompt.push_str("\nA: ");
            prompt.push_str(&clip(&turn.response, self.config.snippet_chars));
            prompt.push('\n');
        }
        if !entities.is_empty() {
            prompt.push_str("Known items: ");
            let listed = entities
                .iter()
                .map(|e| format!("{} ({})", e.value, e.kind))
                .collect::<Vec<_>>()
                .join(", ");
            prompt.push_str(&listed);
            prompt.push('\n');
        }
        prompt.push_str("\nCurrent question: ");
        prompt.push_str(query);
        prompt
    }
}

#[async_trait]
impl Agent for ConversationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Conversation
    }

    async fn handle(&self, request: &AgentRequest, ctx: &TurnContext) -> Result<AgentReply> {
        let prompt = self.build_prompt(&request.query, ctx);
        debug!(
            session_id = %request.session_id,
            history = ctx.history.len(),
            "Conversation agent prompting model"
        );

        let completion_request = CompletionRequest::new(
            &self.config.model,
            vec![Message::user(prompt)],
            self.config.max_tokens,
        )
        .with_system(SYSTEM_PROMPT)
        .with_temperature(self.config.temperature);

        let response = self.backend.complete(completion_request).await?;
        Ok(AgentReply::new(response.text))
    }
}

/// Clip to at most `max` characters, marking the cut.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max).collect();
    clipped.push_str("...");
    clipped
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
