use super::Context;
use crate::output::{or_dash, print_json, print_table, when};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum AuditSubcommand {
    /// List audit entries, oldest first
    List {
        /// Show only the most recent N entries
        #[arg(long)]
        tail: Option<usize>,
    },
}

pub fn run(ctx: &Context, subcmd: AuditSubcommand) -> anyhow::Result<()> {
    match subcmd {
        AuditSubcommand::List { tail } => list(ctx, tail),
    }
}

fn list(ctx: &Context, tail: Option<usize>) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let mut entries = ws.store.list_audit(&ws.org)?;
    if let Some(n) = tail {
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
    }
    if ctx.json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                when(&e.at),
                e.actor.clone(),
                e.action.as_str().to_string(),
                e.rule_id.to_string(),
                or_dash(e.execution_id.map(|id| id.to_string())),
            ]
        })
        .collect();
    print_table(&["AT", "ACTOR", "ACTION", "RULE", "EXECUTION"], rows);
    Ok(())
}
