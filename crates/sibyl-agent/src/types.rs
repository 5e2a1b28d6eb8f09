//! Shared types for classification, dispatch, and turn reporting.

use serde::{Deserialize, Serialize};
use sibyl_session::{AgentKind, Entity, Interaction, InteractionOutcome, Variable};

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Which tier produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierOrigin {
    /// Deterministic rules decided without a model call.
    FastPath,
    /// The completion model decided.
    Model,
    /// The model tier failed or timed out; this is the built-in default.
    Degraded,
}

/// One agent with the confidence the classifier assigned to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: AgentKind,
    pub confidence: f32,
}

impl Candidate {
    pub fn new(kind: AgentKind, confidence: f32) -> Self {
        Self { kind, confidence }
    }
}

/// Ranked classification outcome, highest confidence first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Candidates sorted by descending confidence.
    pub candidates: Vec<Candidate>,
    /// Which tier produced this ranking.
    pub origin: ClassifierOrigin,
    /// Agent chosen after the routing policy ran. None until selection.
    pub selected: Option<AgentKind>,
}

impl Classification {
    /// Build a classification, sorting candidates by descending confidence.
    pub fn new(mut candidates: Vec<Candidate>, origin: ClassifierOrigin) -> Self {
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self {
            candidates,
            origin,
            selected: None,
        }
    }

    /// Classification produced when the model tier is unavailable.
    pub fn degraded(kind: AgentKind, confidence: f32) -> Self {
        Self::new(
            vec![Candidate::new(kind, confidence)],
            ClassifierOrigin::Degraded,
        )
    }

    /// Highest-ranked candidate, if any.
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Gap between the top two candidates. None when fewer than two exist.
    pub fn margin(&self) -> Option<f32> {
        match self.candidates.as_slice() {
            [first, second, ..] => Some(first.confidence - second.confidence),
            _ => None,
        }
    }

    /// Confidence assigned to `kind`, or 0.0 if it was never ranked.
    pub fn confidence_for(&self, kind: AgentKind) -> f32 {
        self.candidates
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.confidence)
            .unwrap_or(0.0)
    }

    /// Record the agent the routing policy settled on.
    pub fn select(&mut self, kind: AgentKind) {
        self.selected = Some(kind);
    }

    pub fn is_degraded(&self) -> bool {
        self.origin == ClassifierOrigin::Degraded
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// The query handed to an agent, after variable and reference resolution.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub session_id: String,
    /// Fully resolved query text.
    pub query: String,
}

/// Read-only session state snapshot an agent may draw on.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    /// Tracked entities, oldest first.
    pub entities: Vec<Entity>,
    /// Variables visible to this turn.
    pub variables: Vec<Variable>,
    /// Trailing window of prior interactions, oldest first.
    pub history: Vec<Interaction>,
}

/// What an agent produced for one turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
}

impl AgentReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn report
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the caller needs to know about one processed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub session_id: String,
    pub sequence: u64,
    /// Agent that handled the turn.
    pub agent: AgentKind,
    /// Confidence the classifier assigned to that agent.
    pub confidence: f32,
    pub origin: ClassifierOrigin,
    /// True when the routing policy overrode the ranking with the default.
    pub fell_back: bool,
    pub response: String,
    pub warnings: Vec<String>,
    pub outcome: InteractionOutcome,
}

impl TurnReport {
    pub fn succeeded(&self) -> bool {
        !self.outcome.is_failed()
    }

    /// Response text with warning annotations appended, one per line.
    pub fn render(&self) -> String {
        let mut out = self.response.clone();
        for warning in &self.warnings {
            out.push_str("\n[warning] ");
            out.push_str(warning);
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
