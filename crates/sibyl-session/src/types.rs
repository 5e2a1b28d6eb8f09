//! Core session data model.
//!
//! A [`Session`] is one JSON document on disk: an append-only interaction
//! log plus the entities and variables accumulated across turns. Interaction
//! sequences are monotonic for the life of the session; pruning old
//! interactions never reuses them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::variables::VariableStore;

// ─────────────────────────────────────────────────────────────────────────────
// Agent Kind
// ─────────────────────────────────────────────────────────────────────────────

/// Which specialized agent handled (or should handle) a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Pulls file content out of repositories and local directories.
    Extraction,
    /// General developer Q&A.
    Conversation,
}

impl AgentKind {
    /// Stable lowercase name used on the wire and in prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Extraction => "extraction",
            AgentKind::Conversation => "conversation",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "extraction" => Ok(AgentKind::Extraction),
            "conversation" => Ok(AgentKind::Conversation),
            other => Err(format!("unknown agent kind: {other:?}")),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// What kind of thing a tracked entity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    FilePath,
    DirectoryPath,
    Repository,
    Identifier,
}

impl EntityKind {
    /// Stable kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::FilePath => "file-path",
            EntityKind::DirectoryPath => "directory-path",
            EntityKind::Repository => "repository",
            EntityKind::Identifier => "identifier",
        }
    }

    /// True for kinds an extraction-style verb can act on.
    pub fn is_extractable(&self) -> bool {
        !matches!(self, EntityKind::Identifier)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete thing mentioned in the session: a path, a repository, or a
/// quoted identifier. Uniqueness key is `(kind, value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    /// Canonical form (trimmed, scheme/`.git` stripped for repositories).
    pub value: String,
    /// Interaction sequence that introduced the entity.
    pub first_seen: u64,
    /// Interaction sequence that last mentioned or resolved to it.
    pub last_referenced: u64,
}

impl Entity {
    /// Create an entity first seen at the given sequence.
    pub fn new(kind: EntityKind, value: impl Into<String>, sequence: u64) -> Self {
        Self {
            kind,
            value: value.into(),
            first_seen: sequence,
            last_referenced: sequence,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Interactions
// ─────────────────────────────────────────────────────────────────────────────

/// How an interaction ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InteractionOutcome {
    #[default]
    Completed,
    Failed {
        error: String,
    },
}

impl InteractionOutcome {
    /// True when the agent did not produce a usable response.
    pub fn is_failed(&self) -> bool {
        matches!(self, InteractionOutcome::Failed { .. })
    }
}

/// One completed turn: what was asked, how it was routed, what came back.
/// Appended once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Monotonic position within the session (1-based).
    pub sequence: u64,

    /// Query exactly as the user typed it.
    pub query: String,

    /// Query after variable substitution and reference rewriting.
    pub resolved_query: String,

    /// Agent that handled the turn.
    pub agent: AgentKind,

    /// Agent response (or the error annotation for failed turns).
    pub response: String,

    pub timestamp: DateTime<Utc>,

    /// Classifier confidence for the selected agent.
    pub confidence: f32,

    #[serde(default)]
    pub outcome: InteractionOutcome,

    /// Non-fatal annotations (unresolved variables, degraded routing).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// One conversation session: interaction log, entities, and variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    pub created_at: DateTime<Utc>,

    pub last_active: DateTime<Utc>,

    /// Highest sequence ever issued; survives pruning so sequences are
    /// never reused within a session.
    #[serde(default)]
    pub last_sequence: u64,

    #[serde(default)]
    pub interactions: Vec<Interaction>,

    #[serde(default)]
    pub variables: VariableStore,

    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Session {
    /// Create an empty session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_active: now,
            last_sequence: 0,
            interactions: Vec::new(),
            variables: VariableStore::new(),
            entities: Vec::new(),
        }
    }

    /// Sequence the next interaction will carry.
    pub fn next_sequence(&self) -> u64 {
        self.last_sequence + 1
    }

    /// The trailing `n` interactions, oldest first.
    pub fn recent_interactions(&self, n: usize) -> &[Interaction] {
        let start = self.interactions.len().saturating_sub(n);
        &self.interactions[start..]
    }

    /// Bump the last-active timestamp.
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

/// Listing row for `sessions`-style commands.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub interactions: usize,
}
