//! Vars command - list visible variables.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::Context;

/// Arguments for the vars command.
#[derive(Args, Debug)]
pub struct VarsArgs {}

/// Run the vars command.
pub async fn run(_args: VarsArgs, ctx: &Context) -> Result<()> {
    let vars = super::scoped_variables(ctx).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(vars.list())?);
        return Ok(());
    }

    let dim = Style::new().dim();
    if vars.is_empty() {
        println!("{}", dim.apply_to("No variables set"));
        return Ok(());
    }

    println!("{}", style("Variables").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    for var in vars.list() {
        println!("  {} = {}", style(&var.name).cyan(), var.value);
    }
    Ok(())
}
