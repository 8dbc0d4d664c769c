use super::Context;
use crate::output::{or_dash, print_json, print_table, when};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum NotificationSubcommand {
    /// List queued notifications, oldest first
    List,
}

pub fn run(ctx: &Context, subcmd: NotificationSubcommand) -> anyhow::Result<()> {
    match subcmd {
        NotificationSubcommand::List => list(ctx),
    }
}

fn list(ctx: &Context) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let queued = ws.store.list_notifications(&ws.org)?;
    if ctx.json {
        return print_json(&queued);
    }
    if queued.is_empty() {
        println!("No notifications.");
        return Ok(());
    }
    let rows = queued
        .iter()
        .map(|n| {
            vec![
                when(&n.queued_at),
                n.severity.as_str().to_string(),
                n.target.clone(),
                or_dash(n.title.clone().or_else(|| n.message.clone())),
            ]
        })
        .collect();
    print_table(&["QUEUED", "SEVERITY", "TARGET", "TITLE"], rows);
    Ok(())
}
