//! Ai command - route one query through the coordinator.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use super::Context;

/// Arguments for the ai command.
#[derive(Args, Debug)]
pub struct AiArgs {
    /// The query to route (words are joined with spaces)
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Continue a specific session
    #[arg(short, long)]
    pub session: Option<String>,

    /// Start a fresh session and make it current
    #[arg(long, conflicts_with = "session")]
    pub new_session: bool,
}

/// Run the ai command.
pub async fn run(args: AiArgs, ctx: &Context) -> Result<()> {
    let query = args.query.join(" ");
    let session_id = resolve_session_id(&args, ctx)?;
    let coordinator = super::build_coordinator(ctx)?;

    let dim = Style::new().dim();
    if ctx.verbose && !ctx.json_output {
        println!("{}", dim.apply_to(format!("Session: {session_id}")));
    }

    let spinner = if ctx.json_output {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .expect("spinner template"),
        );
        pb.set_message("Thinking...");
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    let result = coordinator.process(&session_id, &query).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let report = result?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if ctx.verbose {
            let route = if report.fell_back { "fallback" } else { "ranked" };
            println!(
                "{}",
                dim.apply_to(format!(
                    "[{} | confidence {:.2} | {}]",
                    report.agent, report.confidence, route
                ))
            );
        }
        println!("{}", report.render());
    }

    if !report.succeeded() {
        anyhow::bail!("turn {} failed; see the response above", report.sequence);
    }
    Ok(())
}

/// Which session this turn belongs to.
///
/// `--session` wins; `--new-session` mints a fresh id; otherwise the pointer
/// file is reused, minting an id the first time. Whatever ran becomes the
/// current session.
fn resolve_session_id(args: &AiArgs, ctx: &Context) -> Result<String> {
    let id = if let Some(ref id) = args.session {
        id.clone()
    } else if args.new_session {
        uuid::Uuid::new_v4().to_string()
    } else {
        super::current_session(&ctx.data_dir).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    };
    super::set_current_session(&ctx.data_dir, &id)?;
    Ok(id)
}
