//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [llm]        # completion provider
//! [routing]    # classifier thresholds
//! [memory]     # session persistence
//! [variables]  # variable scope
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Maps to the full TOML config file. All sections are optional so that
/// partial configs (project-local overrides) can be loaded and merged; use
/// the accessor methods to get a section with defaults filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SibylConfig {
    /// Completion provider settings (the `[llm]` section).
    pub llm: Option<LlmSection>,

    /// Classifier and fallback thresholds (the `[routing]` section).
    pub routing: Option<RoutingSection>,

    /// Session persistence settings (the `[memory]` section).
    pub memory: Option<MemorySection>,

    /// Variable store settings (the `[variables]` section).
    pub variables: Option<VariablesSection>,
}

impl SibylConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one. Sections present in `other`
    /// replace the same section here wholesale.
    pub fn merge(&mut self, other: SibylConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.routing.is_some() {
            self.routing = other.routing;
        }
        if other.memory.is_some() {
            self.memory = other.memory;
        }
        if other.variables.is_some() {
            self.variables = other.variables;
        }
    }

    /// The `[llm]` section, or its defaults.
    pub fn llm(&self) -> LlmSection {
        self.llm.clone().unwrap_or_default()
    }

    /// The `[routing]` section, or its defaults.
    pub fn routing(&self) -> RoutingSection {
        self.routing.clone().unwrap_or_default()
    }

    /// The `[memory]` section, or its defaults.
    pub fn memory(&self) -> MemorySection {
        self.memory.clone().unwrap_or_default()
    }

    /// The `[variables]` section, or its defaults.
    pub fn variables(&self) -> VariablesSection {
        self.variables.clone().unwrap_or_default()
    }

    /// Reject settings that cannot work at runtime.
    pub fn validate(&self) -> crate::Result<()> {
        let routing = self.routing();
        if !(0.0..=1.0).contains(&routing.min_confidence) {
            return Err(crate::ConfigError::invalid_value(
                "routing.min_confidence",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&routing.confidence_margin) {
            return Err(crate::ConfigError::invalid_value(
                "routing.confidence_margin",
                "must be between 0.0 and 1.0",
            ));
        }
        let memory = self.memory();
        if memory.max_interactions == 0 {
            return Err(crate::ConfigError::invalid_value(
                "memory.max_interactions",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Section
// ─────────────────────────────────────────────────────────────────────────────

/// Supported completion providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Openai,
    Ollama,
}

impl Provider {
    /// Environment variable holding this provider's API key.
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Provider::Openai => "OPENAI_API_KEY",
            Provider::Ollama => "OLLAMA_API_KEY",
        }
    }
}

/// Completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: Provider,
    pub model: String,
    /// Custom API base URL (proxies, self-hosted endpoints).
    pub base_url: Option<String>,
    /// Environment variable the API key is read from.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_retries: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: Provider::Openai,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: None,
            timeout_secs: 30,
            temperature: 0.0,
            max_retries: 2,
        }
    }
}

impl LlmSection {
    /// Environment variable to read the API key from: the configured
    /// override, or the provider's conventional one.
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing Section
// ─────────────────────────────────────────────────────────────────────────────

/// Classifier thresholds and context limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Below this top confidence, fall back to the conversation agent.
    pub min_confidence: f32,
    /// Below this top-two gap, fall back to the conversation agent.
    pub confidence_margin: f32,
    /// Prior interactions handed to agents as context.
    pub history_window: usize,
    /// Budget for one model classification.
    pub classify_timeout_secs: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            confidence_margin: 0.2,
            history_window: 5,
            classify_timeout_secs: 10,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Section
// ─────────────────────────────────────────────────────────────────────────────

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// Interactions kept per session before the oldest are pruned.
    pub max_interactions: usize,
    /// Where session files live. Defaults to the platform data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_interactions: 50,
            data_dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Variables Section
// ─────────────────────────────────────────────────────────────────────────────

/// Where user variables live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One store shared by every session.
    #[default]
    Global,
    /// Each session carries its own store.
    Session,
}

/// Variable store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariablesSection {
    pub scope: Scope,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SibylConfig::from_toml("").unwrap();
        assert_eq!(config.llm().model, "gpt-4o-mini");
        assert_eq!(config.llm().api_key_env(), "OPENAI_API_KEY");
        assert!((config.routing().min_confidence - 0.6).abs() < 1e-6);
        assert_eq!(config.memory().max_interactions, 50);
        assert_eq!(config.variables().scope, Scope::Global);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let config = SibylConfig::from_toml(
            r#"
[llm]
model = "gpt-4o"

[routing]
min_confidence = 0.8
"#,
        )
        .unwrap();

        let llm = config.llm();
        assert_eq!(llm.model, "gpt-4o");
        assert_eq!(llm.timeout_secs, 30);

        let routing = config.routing();
        assert!((routing.min_confidence - 0.8).abs() < 1e-6);
        assert!((routing.confidence_margin - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_provider_parsing() {
        let config = SibylConfig::from_toml(
            r#"
[llm]
provider = "ollama"
model = "llama3.2"
"#,
        )
        .unwrap();
        assert_eq!(config.llm().provider, Provider::Ollama);
        assert_eq!(config.llm().api_key_env(), "OLLAMA_API_KEY");
    }

    #[test]
    fn test_api_key_env_override() {
        let config = SibylConfig::from_toml(
            r#"
[llm]
api_key_env = "MY_PROXY_KEY"
"#,
        )
        .unwrap();
        assert_eq!(config.llm().api_key_env(), "MY_PROXY_KEY");
    }

    #[test]
    fn test_merge_replaces_whole_sections() {
        let mut base = SibylConfig::from_toml(
            r#"
[llm]
model = "base-model"
timeout_secs = 60

[memory]
max_interactions = 10
"#,
        )
        .unwrap();
        let overlay = SibylConfig::from_toml(
            r#"
[llm]
model = "project-model"
"#,
        )
        .unwrap();

        base.merge(overlay);

        let llm = base.llm();
        assert_eq!(llm.model, "project-model");
        // Section replacement: overlay's implicit default wins.
        assert_eq!(llm.timeout_secs, 30);
        // Untouched sections survive.
        assert_eq!(base.memory().max_interactions, 10);
    }

    #[test]
    fn test_variable_scope_parsing() {
        let config = SibylConfig::from_toml(
            r#"
[variables]
scope = "session"
"#,
        )
        .unwrap();
        assert_eq!(config.variables().scope, Scope::Session);
    }

    #[test]
    fn test_round_trip() {
        let config = SibylConfig::from_toml(
            r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"

[routing]
min_confidence = 0.7
"#,
        )
        .unwrap();

        let rendered = config.to_toml().unwrap();
        let reparsed = SibylConfig::from_toml(&rendered).unwrap();
        assert_eq!(reparsed.llm().model, "gpt-4o-mini");
        assert!((reparsed.routing().min_confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = SibylConfig::from_toml(
            r#"
[routing]
min_confidence = 1.5
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = SibylConfig::from_toml(
            r#"
[memory]
max_interactions = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        assert!(SibylConfig::new().validate().is_ok());
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let err = SibylConfig::from_toml("not toml {{{{").unwrap_err();
        assert!(matches!(err, crate::ConfigError::Parse(_)));
    }
}
