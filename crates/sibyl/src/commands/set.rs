//! Set command - define a variable.

use anyhow::Result;
use clap::Args;
use sibyl_agent::VariableScope;

use super::Context;

/// Arguments for the set command.
#[derive(Args, Debug)]
pub struct SetArgs {
    /// Assignment in name=value form; the value may itself contain '='
    pub assignment: String,
}

/// Run the set command.
pub async fn run(args: SetArgs, ctx: &Context) -> Result<()> {
    let Some((name, value)) = args.assignment.split_once('=') else {
        anyhow::bail!("expected name=value, got {:?}", args.assignment);
    };

    let store = ctx.open_store();
    match ctx.variable_scope() {
        VariableScope::Global => {
            let mut vars = store.load_globals()?;
            vars.set(name, value)?;
            store.save_globals(&vars)?;
        }
        VariableScope::Session => {
            let Some(id) = super::current_session(&ctx.data_dir) else {
                anyhow::bail!(
                    "no current session; run `sibyl ai` first or set [variables] scope = \"global\""
                );
            };
            let session = store.open(&id)?;
            let mut session = session.lock().await;
            session.variables.set(name, value)?;
            store.save(&session)?;
        }
    }

    println!("{} = {}", name.trim(), value);
    Ok(())
}
