//! Query routing for Sibyl.
//!
//! This crate turns a raw developer query into a completed, persisted turn:
//! the coordinator resolves variables and entity references, classifies the
//! query, dispatches it to an agent, and records the outcome.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Coordinator                                                │
//! │  - resolves {variables} and back-references                 │
//! │  - classifies (fast rules, then model)                      │
//! │  - dispatches to an agent, persists the turn                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌────────────┐  ┌────────────┐  ┌────────────┐
//!       │ Classifier │  │ AgentReg   │  │SessionStore│
//!       │ (sibyl-llm)│  │            │  │(sibyl-     │
//!       └────────────┘  └────────────┘  │ session)   │
//!                                       └────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`Coordinator`]: drives one query through the whole turn
//! - [`Classifier`]: two-tier routing, deterministic rules before the model
//! - [`Agent`] / [`AgentRegistry`]: the dispatch seam
//! - [`ContentExtractor`]: file-content gathering behind the extraction agent

pub mod agent;
pub mod agents;
pub mod classifier;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod types;

// Re-export core types
pub use error::{AgentError, Result};
pub use types::{
    AgentReply, AgentRequest, Candidate, Classification, ClassifierOrigin, TurnContext, TurnReport,
};

// Re-export the dispatch seam
pub use agent::{Agent, AgentRegistry};

// Re-export routing
pub use classifier::{Classifier, ClassifierConfig};
pub use coordinator::{Coordinator, CoordinatorConfig, VariableScope};

// Re-export extraction
pub use extract::{
    ContentExtractor, ExtractedFile, Extraction, ExtractionFilters, ExtractionTarget,
    GithubExtractor, LocalDirExtractor,
};

// Re-export the built-in agents
pub use agents::{ConversationAgent, ConversationConfig, ExtractionAgent};
