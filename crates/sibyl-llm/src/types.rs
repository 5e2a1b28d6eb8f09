//! Request and response types shared by all completion backends.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Request
// ─────────────────────────────────────────────────────────────────────────────

/// A request for a single (non-streaming) completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g. "gpt-4o-mini").
    pub model: String,

    /// Conversation messages in order.
    pub messages: Vec<Message>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Optional system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature (0.0 = deterministic).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// JSON schema the reply must conform to, for providers that support
    /// constrained output. Backends without schema support ignore it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,

    /// Sequences that stop generation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl CompletionRequest {
    /// Create a new request with required fields.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            system: None,
            temperature: None,
            response_schema: None,
            stop_sequences: Vec::new(),
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Constrain the reply to a JSON schema.
    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Set stop sequences.
    pub fn with_stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.stop_sequences = stop;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Completion Response
// ─────────────────────────────────────────────────────────────────────────────

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    /// Total tokens consumed by the request.
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// The provider's reply to a [`CompletionRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text.
    pub text: String,

    /// Model that produced the reply.
    pub model: String,

    /// Token accounting, when the provider reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Create a response with just text (used by tests and mocks).
    pub fn text(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            usage: None,
        }
    }

    /// Parse the reply as a JSON document.
    ///
    /// Models frequently wrap JSON in markdown fences or surround it with
    /// prose even when asked not to. This strips fences first, then falls
    /// back to extracting the outermost `{...}` object before giving up.
    pub fn json_payload(&self) -> crate::error::Result<serde_json::Value> {
        let cleaned = strip_code_fences(&self.text);

        if let Ok(value) = serde_json::from_str(cleaned) {
            return Ok(value);
        }

        if let Some(object) = extract_json_object(cleaned) {
            if let Ok(value) = serde_json::from_str(object) {
                return Ok(value);
            }
        }

        Err(crate::error::LlmError::invalid_response(format!(
            "reply is not JSON: {:.120}",
            self.text
        )))
    }
}

/// Strip a markdown code fence (``` or ```json) wrapping the payload.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };

    body.strip_suffix("```").map_or(body, str::trim).trim()
}

/// Find the outermost balanced `{...}` object in free-form text.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = CompletionRequest::new("gpt-4o-mini", vec![Message::user("hi")], 256)
            .with_system("be brief")
            .with_temperature(0.0);

        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.temperature, Some(0.0));
        assert!(request.response_schema.is_none());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("x")).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage {
            input_tokens: 12,
            output_tokens: 30,
        };
        assert_eq!(usage.total(), 42);
    }

    #[test]
    fn test_json_payload_plain() {
        let response = CompletionResponse::text(r#"{"agent": "extraction"}"#, "m");
        let value = response.json_payload().unwrap();
        assert_eq!(value["agent"], "extraction");
    }

    #[test]
    fn test_json_payload_fenced() {
        let response =
            CompletionResponse::text("```json\n{\"agent\": \"conversation\"}\n```", "m");
        let value = response.json_payload().unwrap();
        assert_eq!(value["agent"], "conversation");
    }

    #[test]
    fn test_json_payload_embedded_in_prose() {
        let response = CompletionResponse::text(
            "Sure! Here is the answer: {\"confidence\": 0.9} hope it helps",
            "m",
        );
        let value = response.json_payload().unwrap();
        assert_eq!(value["confidence"], 0.9);
    }

    #[test]
    fn test_json_payload_handles_braces_in_strings() {
        let response = CompletionResponse::text(r#"{"text": "weird } brace"}"#, "m");
        let value = response.json_payload().unwrap();
        assert_eq!(value["text"], "weird } brace");
    }

    #[test]
    fn test_json_payload_rejects_prose() {
        let response = CompletionResponse::text("I could not decide.", "m");
        assert!(response.json_payload().is_err());
    }
}
