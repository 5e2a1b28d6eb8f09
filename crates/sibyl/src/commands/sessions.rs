//! Sessions command - list stored sessions.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;

/// Arguments for the sessions command.
#[derive(Args, Debug)]
pub struct SessionsArgs {}

/// Run the sessions command.
pub async fn run(_args: SessionsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store();
    let summaries = store.list()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if summaries.is_empty() {
        println!("{}", dim.apply_to("No stored sessions"));
        return Ok(());
    }

    let current = super::current_session(&ctx.data_dir);

    println!("{}", style("Sessions").bold());
    println!("{}", dim.apply_to("─".repeat(72)));
    for summary in &summaries {
        let marker = if current.as_deref() == Some(summary.id.as_str()) {
            "*"
        } else {
            " "
        };
        let turns = if summary.interactions == 1 {
            "turn "
        } else {
            "turns"
        };
        println!(
            "{} {:<38} {:>4} {}  {}",
            marker,
            style(&summary.id).cyan(),
            summary.interactions,
            turns,
            dim.apply_to(summary.last_active.format("%Y-%m-%d %H:%M").to_string()),
        );
    }
    Ok(())
}
