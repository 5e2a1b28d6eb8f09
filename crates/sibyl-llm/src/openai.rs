//! OpenAI-compatible chat completions backend.
//!
//! Works against api.openai.com and any server speaking the same protocol
//! (Ollama, vLLM, llama.cpp server). Structured output is requested through
//! `response_format` when the caller attaches a JSON schema.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::backend::{CompletionBackend, with_retry};
use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, CompletionResponse, Usage};

const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_BASE: &str = "http://localhost:11434/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Bearer token; `None` for servers that don't authenticate.
    pub api_key: Option<String>,

    /// API base URL, without the trailing endpoint path.
    pub base_url: String,

    /// Model override; when set, requests always use this model.
    pub model: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retry attempts for transient failures.
    pub max_retries: u32,

    /// Initial backoff between retries (doubles per attempt).
    pub retry_backoff: Duration,

    /// Backend name used in logs.
    pub name: String,
}

impl OpenAiConfig {
    fn base(name: &str, base_url: &str) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            name: name.to_string(),
        }
    }

    /// Configuration for api.openai.com.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::base("openai", DEFAULT_OPENAI_BASE)
        }
    }

    /// Configuration for api.openai.com with the key from `OPENAI_API_KEY`.
    pub fn openai_from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LlmError::config("OPENAI_API_KEY is not set; export it or configure [llm] api_key_env")
        })?;
        Ok(Self::openai(api_key))
    }

    /// Configuration for a local Ollama server.
    pub fn ollama() -> Self {
        Self::base("ollama", DEFAULT_OLLAMA_BASE)
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Pin every request to one model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the log name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// Backend speaking the OpenAI chat completions protocol.
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a backend from configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Backend for api.openai.com with the key from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAiConfig::openai_from_env()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Map our request onto the wire format.
    fn to_wire(&self, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }

        for message in &request.messages {
            messages.push(ChatMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }

        let response_format = request.response_schema.as_ref().map(|schema| ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchemaSpec {
                name: "reply".to_string(),
                schema: schema.clone(),
                strict: true,
            },
        });

        let stop = (!request.stop_sequences.is_empty()).then(|| request.stop_sequences.clone());

        // Config model pin wins over the per-request model.
        let model = self
            .config
            .model
            .as_deref()
            .unwrap_or(&request.model)
            .to_string();

        ChatRequest {
            model,
            messages,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            response_format,
            stop,
        }
    }

    /// One POST to the completions endpoint, decoded into our response type.
    async fn send_chat(&self, wire: &ChatRequest) -> Result<CompletionResponse> {
        let response = self
            .authorize(self.client.post(self.endpoint("chat/completions")))
            .json(wire)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Self::error_from_wire(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Serialization(format!("malformed completion reply: {e}")))?;
        parsed.try_into()
    }

    /// Classify a non-success status, pulling the provider's message out of
    /// the body when it has one.
    fn error_from_wire(status: StatusCode, body: &str) -> LlmError {
        let detail = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {status}: {body}"));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(detail),
            429 => LlmError::RateLimit(detail),
            500..=599 => LlmError::Backend(format!("server error: {detail}")),
            _ => LlmError::Backend(detail),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let wire = self.to_wire(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %wire.model,
            messages = wire.messages.len(),
            constrained = wire.response_format.is_some(),
            "Sending completion request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || self.send_chat(&wire),
        )
        .await
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .authorize(self.client.get(self.endpoint("models")))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::error_from_wire(status, &body))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaSpec,
}

#[derive(Debug, Serialize)]
struct JsonSchemaSpec {
    name: String,
    schema: serde_json::Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl TryFrom<ChatResponse> for CompletionResponse {
    type Error = LlmError;

    fn try_from(response: ChatResponse) -> Result<CompletionResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::invalid_response("reply contained no choices"))?;

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
            model: response.model,
            usage: response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}
