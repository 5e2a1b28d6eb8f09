//! Completion backend abstraction for Sibyl.
//!
//! The core seam is the [`CompletionBackend`] trait: one non-streaming
//! `complete()` call, optionally constrained by a JSON output schema. The
//! router and agents depend only on the trait, so providers are
//! interchangeable and tests run against [`MockBackend`].
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  CompletionBackend trait             │
//! │  - complete(request) -> Response     │
//! │  - health_check()                    │
//! └──────────────────────────────────────┘
//!           │                 │
//!           ▼                 ▼
//!     ┌──────────┐      ┌──────────┐
//!     │  OpenAI  │      │   Mock   │
//!     │ (compat) │      │ (tests)  │
//!     └──────────┘      └──────────┘
//! ```

pub mod backend;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{CompletionBackend, MockBackend, MockReply, SharedBackend, with_retry};
pub use error::{LlmError, Result};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, Usage};
