//! Get command - print one variable's value.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the get command.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Variable name
    pub name: String,
}

/// Run the get command.
pub async fn run(args: GetArgs, ctx: &Context) -> Result<()> {
    let vars = super::scoped_variables(ctx).await?;
    match vars.get(&args.name) {
        Some(value) => {
            println!("{value}");
            Ok(())
        }
        None => anyhow::bail!("variable {:?} is not set", args.name),
    }
}
