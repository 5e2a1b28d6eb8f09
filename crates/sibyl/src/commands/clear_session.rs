//! Clear-session command - delete stored sessions.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;

/// Arguments for the clear-session command.
#[derive(Args, Debug)]
pub struct ClearSessionArgs {
    /// Session to clear (defaults to the current session)
    pub id: Option<String>,

    /// Instead of one session, clear every session idle at least this many days
    #[arg(long, value_name = "DAYS", conflicts_with = "id")]
    pub older_than: Option<u64>,
}

/// Run the clear-session command.
pub async fn run(args: ClearSessionArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store();
    let dim = Style::new().dim();

    if let Some(days) = args.older_than {
        let removed = store.clear_older_than(days)?;
        let plural = if removed == 1 { "" } else { "s" };
        println!("Cleared {removed} session{plural}");
        return Ok(());
    }

    let Some(id) = args.id.or_else(|| super::current_session(&ctx.data_dir)) else {
        println!("{}", dim.apply_to("No current session to clear"));
        return Ok(());
    };

    if store.clear(&id)? {
        println!("Cleared session {id}");
    } else {
        println!("{}", dim.apply_to(format!("No such session: {id}")));
    }
    super::clear_current_session(&ctx.data_dir, &id);
    Ok(())
}
