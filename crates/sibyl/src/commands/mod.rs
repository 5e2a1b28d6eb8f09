//! CLI command handlers.

pub mod ai;
pub mod clear_session;
pub mod get;
pub mod sessions;
pub mod set;
pub mod vars;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};

use sibyl_agent::{
    AgentRegistry, Classifier, ClassifierConfig, ConversationAgent, ConversationConfig,
    Coordinator, CoordinatorConfig, ExtractionAgent, GithubExtractor, LocalDirExtractor,
    VariableScope,
};
use sibyl_config::{LlmSection, Provider, Scope, SibylConfig};
use sibyl_llm::{OpenAiBackend, OpenAiConfig, SharedBackend};
use sibyl_session::{SessionStore, VariableStore};

/// Pointer file under the data dir naming the session `ai` continues.
const CURRENT_SESSION_FILE: &str = "current_session";

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: SibylConfig,
    /// Where sessions, variables, and logs live.
    pub data_dir: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Open the session store this invocation works against.
    pub fn open_store(&self) -> Arc<SessionStore> {
        Arc::new(
            SessionStore::new(&self.data_dir)
                .with_max_interactions(self.config.memory().max_interactions),
        )
    }

    /// Configured variable scope, mapped onto the coordinator's enum.
    pub fn variable_scope(&self) -> VariableScope {
        match self.config.variables().scope {
            Scope::Global => VariableScope::Global,
            Scope::Session => VariableScope::Session,
        }
    }
}

/// Build the completion backend described by the `[llm]` section.
pub fn build_backend(llm: &LlmSection) -> Result<SharedBackend> {
    let mut config = match llm.provider {
        Provider::Openai => {
            let env = llm.api_key_env();
            let key = std::env::var(env).with_context(|| {
                format!("{env} is not set; export it or adjust [llm] api_key_env")
            })?;
            OpenAiConfig::openai(key)
        }
        Provider::Ollama => {
            // Local servers usually run unauthenticated; honor a key if set.
            let mut config = OpenAiConfig::ollama();
            if let Ok(key) = std::env::var(llm.api_key_env())
                && !key.is_empty()
            {
                config.api_key = Some(key);
            }
            config
        }
    };

    config = config
        .with_model(&llm.model)
        .with_timeout(Duration::from_secs(llm.timeout_secs))
        .with_max_retries(llm.max_retries);
    if let Some(ref base_url) = llm.base_url {
        config = config.with_base_url(base_url);
    }

    Ok(Arc::new(OpenAiBackend::new(config)?))
}

/// Assemble the full routing pipeline from config: backend, classifier,
/// built-in agents, and the coordinator on top of the session store.
pub fn build_coordinator(ctx: &Context) -> Result<Coordinator> {
    let llm = ctx.config.llm();
    let routing = ctx.config.routing();
    let backend = build_backend(&llm)?;

    let classifier = Classifier::new(
        backend.clone(),
        ClassifierConfig {
            model: llm.model.clone(),
            temperature: llm.temperature,
            timeout: Duration::from_secs(routing.classify_timeout_secs),
            ..Default::default()
        },
    );

    let mut registry = AgentRegistry::new();
    registry.register(ConversationAgent::new(
        backend,
        ConversationConfig {
            model: llm.model.clone(),
            temperature: llm.temperature,
            history_turns: routing.history_window,
            ..Default::default()
        },
    ));
    let github = GithubExtractor::new(std::env::var("GITHUB_TOKEN").ok())?;
    registry.register(ExtractionAgent::new(vec![
        Arc::new(LocalDirExtractor::new()),
        Arc::new(github),
    ]));

    Ok(Coordinator::new(
        ctx.open_store(),
        classifier,
        registry,
        CoordinatorConfig {
            min_confidence: routing.min_confidence,
            confidence_margin: routing.confidence_margin,
            history_window: routing.history_window,
            variable_scope: ctx.variable_scope(),
            ..Default::default()
        },
    ))
}

/// Read the current session id from the pointer file.
pub fn current_session(data_dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(data_dir.join(CURRENT_SESSION_FILE)).ok()?;
    let id = raw.trim().to_string();
    if id.is_empty() { None } else { Some(id) }
}

/// Point the pointer file at `id`.
pub fn set_current_session(data_dir: &Path, id: &str) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create {}", data_dir.display()))?;
    std::fs::write(data_dir.join(CURRENT_SESSION_FILE), id)
        .with_context(|| format!("write current-session pointer in {}", data_dir.display()))?;
    Ok(())
}

/// Drop the pointer file if it names `id`.
pub fn clear_current_session(data_dir: &Path, id: &str) {
    if current_session(data_dir).as_deref() == Some(id) {
        let _ = std::fs::remove_file(data_dir.join(CURRENT_SESSION_FILE));
    }
}

/// Snapshot of the variables visible under the configured scope.
pub async fn scoped_variables(ctx: &Context) -> Result<VariableStore> {
    let store = ctx.open_store();
    match ctx.variable_scope() {
        VariableScope::Global => Ok(store.load_globals()?),
        VariableScope::Session => match current_session(&ctx.data_dir) {
            Some(id) => {
                let session = store.open(&id)?;
                let session = session.lock().await;
                Ok(session.variables.clone())
            }
            None => Ok(VariableStore::new()),
        },
    }
}
