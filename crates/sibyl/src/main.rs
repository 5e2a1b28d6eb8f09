//! Sibyl - Natural-language query routing for developer workflows
//!
//! Main entry point for the sibyl CLI.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ai, clear_session, get, sessions, set, vars};

// ─────────────────────────────────────────────────────────────────────────────
// Command Line
// ─────────────────────────────────────────────────────────────────────────────

/// Sibyl - route natural-language developer queries to the right agent
#[derive(Parser)]
#[command(name = "sibyl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose diagnostic output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config directory override
    #[arg(long, global = true, env = "SIBYL_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a query to an agent and print its response
    Ai(ai::AiArgs),

    /// List stored sessions
    Sessions(sessions::SessionsArgs),

    /// Delete a stored session
    ClearSession(clear_session::ClearSessionArgs),

    /// Set a variable (name=value)
    Set(set::SetArgs),

    /// Print a variable's value
    Get(get::GetArgs),

    /// List variables
    Vars(vars::VarsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = sibyl_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    let config = loaded.config;
    config.validate()?;

    let data_dir = sibyl_config::resolve_data_dir(&config.memory())
        .ok_or_else(|| anyhow::anyhow!("could not determine a data directory"))?;

    let _guard = init_tracing(cli.verbose, &data_dir);

    for warning in &loaded.warnings {
        tracing::warn!("{warning}");
    }

    let ctx = commands::Context {
        config,
        data_dir,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Ai(args) => ai::run(args, &ctx).await,
        Commands::Sessions(args) => sessions::run(args, &ctx).await,
        Commands::ClearSession(args) => clear_session::run(args, &ctx).await,
        Commands::Set(args) => set::run(args, &ctx).await,
        Commands::Get(args) => get::run(args, &ctx).await,
        Commands::Vars(args) => vars::run(args, &ctx).await,
    }
}

/// Console logging on stderr plus a rotating JSON file under the data dir.
///
/// The returned guard flushes the file writer; it must stay alive for the
/// whole process.
fn init_tracing(verbose: bool, data_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{EnvFilter, prelude::*};

    let console_filter = if verbose {
        "sibyl=debug,sibyl_agent=debug,sibyl_llm=debug,sibyl_session=debug,sibyl_config=debug,info"
    } else {
        "sibyl=info,sibyl_agent=warn,sibyl_llm=warn,sibyl_session=warn,warn"
    };
    let file_filter = "sibyl=debug,sibyl_agent=debug,sibyl_llm=debug,sibyl_session=debug,info";

    let appender = tracing_appender::rolling::daily(data_dir.join("logs"), "sibyl.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(console_filter));
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(EnvFilter::new(file_filter));

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    guard
}
