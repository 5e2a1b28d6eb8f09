//! Completion backend trait, retry helper, and test doubles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse};

// ─────────────────────────────────────────────────────────────────────────────
// Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A provider that can answer completion requests.
///
/// Implementations must be safe to share across tasks; callers hold them as
/// [`SharedBackend`] and issue concurrent requests.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Execute a single completion request.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Human-readable backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Verify the backend is reachable and credentials work.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle to a completion backend.
pub type SharedBackend = Arc<dyn CompletionBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Retry Helper
// ─────────────────────────────────────────────────────────────────────────────

/// Run an async operation with exponential backoff on retryable errors.
///
/// Non-retryable errors (auth, config, malformed replies) fail immediately.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                warn!(
                    backend = %backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted behavior for one [`MockBackend`] call.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with a network error carrying this message.
    Fail(String),
    /// Never return; pairs with `tokio::time::timeout` in tests.
    Hang,
}

/// In-memory backend for tests: replies are consumed from a queue and every
/// request is recorded for later inspection.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create an empty mock. Calls fail until replies are queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock preloaded with a single text reply.
    pub fn with_text(text: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.queue_text(text);
        mock
    }

    /// Queue a text reply.
    pub fn queue_text(&self, text: impl Into<String>) {
        self.replies.lock().push_back(MockReply::Text(text.into()));
    }

    /// Queue a transport failure.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .push_back(MockReply::Fail(message.into()));
    }

    /// Queue a call that never completes.
    pub fn queue_hang(&self) {
        self.replies.lock().push_back(MockReply::Hang);
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!(model = %request.model, "Mock completion request");
        self.requests.lock().push(request.clone());

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(CompletionResponse::text(text, request.model)),
            Some(MockReply::Fail(message)) => Err(LlmError::Network(message)),
            Some(MockReply::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
            None => Err(LlmError::backend("mock backend has no queued reply")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
