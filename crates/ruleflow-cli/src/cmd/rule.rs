use super::{parse_id, Context};
use crate::output::{or_dash, print_json, print_table, when};
use anyhow::Context as _;
use clap::Subcommand;
use ruleflow_core::rule::{Rule, RuleDraft};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum RuleSubcommand {
    /// Create a rule from a YAML or JSON definition
    Create {
        #[arg(long)]
        file: PathBuf,
    },

    /// Replace a rule's whole definition, action list included
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },

    /// Delete a rule (and, per config, its execution history)
    Delete { id: String },

    /// Show one rule
    Get { id: String },

    /// List rules in the organization
    List,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: RuleSubcommand) -> anyhow::Result<()> {
    match subcmd {
        RuleSubcommand::Create { file } => create(ctx, &file),
        RuleSubcommand::Update { id, file } => update(ctx, &id, &file),
        RuleSubcommand::Delete { id } => delete(ctx, &id),
        RuleSubcommand::Get { id } => get(ctx, &id),
        RuleSubcommand::List => list(ctx),
    }
}

/// YAML is a superset of JSON, so one parser reads both.
fn load_draft(path: &Path) -> anyhow::Result<RuleDraft> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn create(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let draft = load_draft(file)?;
    let ws = ctx.open()?;
    let rule = ws.engine.create_rule(&ctx.actor, &ws.org, &draft)?;
    if ctx.json {
        print_json(&rule)?;
    } else {
        println!("Created rule {} ({})", rule.id, rule.name);
    }
    Ok(())
}

fn update(ctx: &Context, id: &str, file: &Path) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let draft = load_draft(file)?;
    let ws = ctx.open()?;
    let rule = ws.engine.update_rule(&ctx.actor, &ws.org, id, &draft)?;
    if ctx.json {
        print_json(&rule)?;
    } else {
        println!("Updated rule {} ({})", rule.id, rule.name);
    }
    Ok(())
}

fn delete(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let ws = ctx.open()?;
    let removed = ws.engine.delete_rule(&ctx.actor, &ws.org, id)?;
    if ctx.json {
        print_json(&serde_json::json!({ "deleted": id, "executions_removed": removed }))?;
    } else {
        println!("Deleted rule {id} ({removed} executions removed)");
    }
    Ok(())
}

fn get(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let ws = ctx.open()?;
    let rule = ws.engine.get_rule(&ctx.actor, &ws.org, id)?;
    if ctx.json {
        return print_json(&rule);
    }

    println!("{} ({})", rule.name, rule.id);
    if let Some(desc) = &rule.description {
        println!("  {desc}");
    }
    println!("  trigger:   {}", serde_json::to_string(&rule.trigger)?);
    println!(
        "  flags:     active={} approval={} dry_run={} priority={}",
        rule.is_active, rule.approval_required, rule.dry_run_mode, rule.priority
    );
    println!("  last run:  {}", or_dash(rule.last_run_at.as_ref().map(when)));
    if !rule.conditions.is_empty() {
        println!("  conditions:");
        for c in &rule.conditions {
            println!("    {} {} {}", c.field, c.operator, c.value);
        }
    }
    if !rule.actions.is_empty() {
        println!("  actions:");
        for a in &rule.actions {
            println!("    [{}] {} {}", a.order, a.action_type, a.action_data);
        }
    }
    Ok(())
}

fn list(ctx: &Context) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let rules = ws.engine.list_rules(&ctx.actor, &ws.org)?;
    if ctx.json {
        return print_json(&rules);
    }
    if rules.is_empty() {
        println!("No rules.");
        return Ok(());
    }
    let rows = rules.iter().map(row).collect();
    print_table(
        &["ID", "NAME", "TRIGGER", "PRIORITY", "ACTIVE", "ACTIONS", "LAST RUN"],
        rows,
    );
    Ok(())
}

fn row(rule: &Rule) -> Vec<String> {
    vec![
        rule.id.to_string(),
        rule.name.clone(),
        rule.trigger_type().to_string(),
        rule.priority.to_string(),
        if rule.is_active { "yes" } else { "no" }.to_string(),
        rule.actions.len().to_string(),
        or_dash(rule.last_run_at.as_ref().map(when)),
    ]
}
