use super::Context;
use crate::output::{or_dash, print_json, print_table};
use clap::Subcommand;
use ruleflow_core::entity::CatalogItem;

#[derive(Subcommand)]
pub enum ItemSubcommand {
    /// Create or overwrite a catalog item
    Set {
        id: String,
        #[arg(long)]
        unit_cost: f64,
        #[arg(long, default_value = "0")]
        on_hand: i64,
        #[arg(long)]
        name: Option<String>,
    },

    /// List catalog items
    List,
}

pub fn run(ctx: &Context, subcmd: ItemSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ItemSubcommand::Set {
            id,
            unit_cost,
            on_hand,
            name,
        } => set(
            ctx,
            CatalogItem {
                id,
                name,
                unit_cost,
                on_hand,
            },
        ),
        ItemSubcommand::List => list(ctx),
    }
}

fn set(ctx: &Context, item: CatalogItem) -> anyhow::Result<()> {
    if !item.unit_cost.is_finite() || item.unit_cost < 0.0 {
        anyhow::bail!("unit cost must be a non-negative number");
    }
    if item.on_hand < 0 {
        anyhow::bail!("on-hand quantity must not be negative");
    }
    let ws = ctx.open()?;
    ws.store.put_item(&ws.org, &item)?;
    if ctx.json {
        print_json(&item)?;
    } else {
        println!("Set item {} (unit cost {:.2}, on hand {})", item.id, item.unit_cost, item.on_hand);
    }
    Ok(())
}

fn list(ctx: &Context) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let items = ws.store.list_items(&ws.org)?;
    if ctx.json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    let rows = items
        .iter()
        .map(|i| {
            vec![
                i.id.clone(),
                or_dash(i.name.clone()),
                format!("{:.2}", i.unit_cost),
                i.on_hand.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "UNIT COST", "ON HAND"], rows);
    Ok(())
}
