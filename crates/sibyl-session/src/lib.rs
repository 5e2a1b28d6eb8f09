//! Session memory for Sibyl.
//!
//! Everything a routing turn reads or writes lives here: the session
//! document (interaction log, tracked entities, user variables), the
//! pattern rules that recognize entities in text, placeholder resolution,
//! and the JSON persistence layer with its per-session locks.
//!
//! The [`SessionStore`] is the sole writer to disk. Components above it
//! (the coordinator, the CLI) mutate an in-memory [`Session`] under its
//! lock and then ask the store to save.

pub mod entities;
pub mod error;
pub mod store;
pub mod types;
pub mod variables;

pub use entities::{EntityCandidate, EntityTracker};
pub use error::{Result, SessionError};
pub use store::SessionStore;
pub use types::{
    AgentKind, Entity, EntityKind, Interaction, InteractionOutcome, Session, SessionSummary,
};
pub use variables::{Resolution, Variable, VariableStore};
