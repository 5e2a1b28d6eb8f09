//! The built-in agents.

mod conversation;
mod extraction;

pub use conversation::{ConversationAgent, ConversationConfig};
pub use extraction::ExtractionAgent;
