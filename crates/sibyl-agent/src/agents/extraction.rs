//! Content extraction agent.
//!
//! Parses an extraction target out of the resolved query, picks the first
//! registered extractor that supports it, and formats the gathered files
//! into the reply.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sibyl_session::{AgentKind, EntityKind, EntityTracker};
use tracing::debug;

use crate::agent::Agent;
use crate::error::{AgentError, Result};
use crate::extract::{ContentExtractor, Extraction, ExtractionFilters, ExtractionTarget};
use crate::types::{AgentReply, AgentRequest, TurnContext};

/// Extension filters spelled like ".py files" or ".rs, .toml files".
static EXT_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.([a-z0-9]{1,8})(,| and | or |\s+files?\b)").expect("extension pattern")
});

/// Extension filters spelled by language name, like "python files".
static LANG_MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(python|javascript|typescript|rust|golang|go|markdown)\s+files?\b")
        .expect("language pattern")
});

const LANGUAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("python", "py"),
    ("javascript", "js"),
    ("typescript", "ts"),
    ("rust", "rs"),
    ("golang", "go"),
    ("go", "go"),
    ("markdown", "md"),
];

/// Pulls file contents out of whatever the query names.
pub struct ExtractionAgent {
    extractors: Vec<Arc<dyn ContentExtractor>>,
    defaults: ExtractionFilters,
}

impl ExtractionAgent {
    pub fn new(extractors: Vec<Arc<dyn ContentExtractor>>) -> Self {
        Self {
            extractors,
            defaults: ExtractionFilters::default(),
        }
    }

    /// Override the baseline filters applied when the query names none.
    pub fn with_default_filters(mut self, defaults: ExtractionFilters) -> Self {
        self.defaults = defaults;
        self
    }

    /// Find the extraction target in a resolved query.
    ///
    /// Repository references win over local paths, mirroring how entity
    /// mentions are ranked.
    fn parse_target(&self, query: &str) -> Result<ExtractionTarget> {
        let mentions = EntityTracker::new().extract(query);

        if let Some(repo) = mentions
            .iter()
            .find(|m| m.kind == EntityKind::Repository)
        {
            return ExtractionTarget::from_repo_reference(&repo.value)
                .map_err(|_| AgentError::NoExtractor(repo.value.clone()));
        }

        mentions
            .iter()
            .find(|m| matches!(m.kind, EntityKind::FilePath | EntityKind::DirectoryPath))
            .map(|m| ExtractionTarget::local(expand_home(&m.value)))
            .ok_or(AgentError::NoTarget)
    }

    /// Build filters for this query: default limits, plus any extensions the
    /// query spells out.
    fn parse_filters(&self, query: &str) -> ExtractionFilters {
        let mut extensions: Vec<String> = Vec::new();

        for capture in EXT_MENTION.captures_iter(query) {
            let ext = capture[1].to_lowercase();
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        for capture in LANG_MENTION.captures_iter(query) {
            let lang = capture[1].to_lowercase();
            if let Some((_, ext)) = LANGUAGE_EXTENSIONS.iter().find(|(name, _)| *name == lang) {
                if !extensions.contains(&(*ext).to_string()) {
                    extensions.push((*ext).to_string());
                }
            }
        }

        let mut filters = self.defaults.clone();
        if !extensions.is_empty() {
            filters.extensions = extensions;
        }
        filters
    }
}

#[async_trait]
impl Agent for ExtractionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Extraction
    }

    async fn handle(&self, request: &AgentRequest, _ctx: &TurnContext) -> Result<AgentReply> {
        let target = self.parse_target(&request.query)?;
        let filters = self.parse_filters(&request.query);
        debug!(
            session_id = %request.session_id,
            target = %target,
            extensions = ?filters.extensions,
            "Extraction agent resolved target"
        );

        let extractor = self
            .extractors
            .iter()
            .find(|e| e.supports(&target))
            .ok_or_else(|| AgentError::NoExtractor(target.to_string()))?;

        let extraction = extractor.extract(&target, &filters).await?;
        Ok(AgentReply::new(format_extraction(&extraction)))
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn format_extraction(extraction: &Extraction) -> String {
    if extraction.files.is_empty() {
        let mut out = format!("No files matched in {}", extraction.label);
        if extraction.skipped > 0 {
            out.push_str(&format!(
                " ({} skipped by size or content limits)",
                extraction.skipped
            ));
        }
        return out;
    }

    let mut out = format!(
        "Extracted {} file{} from {}",
        extraction.files.len(),
        if extraction.files.len() == 1 { "" } else { "s" },
        extraction.label,
    );
    if extraction.skipped > 0 {
        out.push_str(&format!(" ({} skipped)", extraction.skipped));
    }
    for file in &extraction.files {
        out.push_str("\n\n--- ");
        out.push_str(&file.path);
        out.push_str(" ---\n");
        out.push_str(&file.content);
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
