//! The [`Agent`] trait and the registry the coordinator dispatches through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sibyl_session::AgentKind;

use crate::error::Result;
use crate::types::{AgentReply, AgentRequest, TurnContext};

/// A handler for one kind of query.
///
/// Agents receive the fully resolved query plus a read-only snapshot of
/// session state. They never touch persistence; the coordinator owns that.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Which classification this agent serves.
    fn kind(&self) -> AgentKind;

    /// Handle one turn.
    async fn handle(&self, request: &AgentRequest, ctx: &TurnContext) -> Result<AgentReply>;
}

/// Maps agent kinds to their handlers.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own kind, replacing any previous handler.
    pub fn register<A: Agent + 'static>(&mut self, agent: A) {
        self.agents.insert(agent.kind(), Arc::new(agent));
    }

    /// Register an already-shared agent.
    pub fn register_arc(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.kind(), agent);
    }

    /// Look up the handler for a kind.
    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        self.agents.get(&kind).cloned()
    }

    /// Kinds with a registered handler.
    pub fn kinds(&self) -> Vec<AgentKind> {
        self.agents.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
