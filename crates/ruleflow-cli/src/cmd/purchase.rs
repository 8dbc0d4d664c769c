use super::Context;
use crate::output::{print_json, print_table, when};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum PurchaseSubcommand {
    /// List draft purchases, oldest first
    List,
}

pub fn run(ctx: &Context, subcmd: PurchaseSubcommand) -> anyhow::Result<()> {
    match subcmd {
        PurchaseSubcommand::List => list(ctx),
    }
}

fn list(ctx: &Context) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let drafts = ws.store.list_purchases(&ws.org)?;
    if ctx.json {
        return print_json(&drafts);
    }
    if drafts.is_empty() {
        println!("No purchase drafts.");
        return Ok(());
    }
    let rows = drafts
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.item_id.clone(),
                p.quantity.to_string(),
                format!("{:.2}", p.total),
                p.supplier_id.clone(),
                p.location_id.clone(),
                when(&p.created_at),
            ]
        })
        .collect();
    print_table(
        &["ID", "ITEM", "QTY", "TOTAL", "SUPPLIER", "LOCATION", "CREATED"],
        rows,
    );
    Ok(())
}
