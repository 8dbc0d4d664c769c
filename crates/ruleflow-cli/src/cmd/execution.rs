use super::{parse_id, Context};
use crate::output::{or_dash, print_json, print_table, when};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use ruleflow_core::execution::{Approval, Execution, ExecutionFilter};
use ruleflow_core::types::ExecutionStatus;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ExecutionSubcommand {
    /// Show one execution with its per-action results
    Get { id: String },

    /// List executions, newest first
    List {
        /// Only executions of this rule
        #[arg(long)]
        rule: Option<String>,
        /// running, success or failed
        #[arg(long)]
        status: Option<ExecutionStatus>,
        /// Started at or after (RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Started before (RFC 3339)
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Page size (default: engine.page_size)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List running executions that look interrupted
    Stale {
        /// Age threshold in seconds (default: engine.stale_running_after_secs)
        #[arg(long)]
        older_than: Option<u64>,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: ExecutionSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ExecutionSubcommand::Get { id } => get(ctx, &id),
        ExecutionSubcommand::List {
            rule,
            status,
            since,
            until,
            offset,
            limit,
        } => {
            let filter = ExecutionFilter {
                rule_id: rule.as_deref().map(parse_id).transpose()?,
                status,
                since: since.as_deref().map(parse_time).transpose()?,
                until: until.as_deref().map(parse_time).transpose()?,
                offset,
                limit,
            };
            list(ctx, &filter)
        }
        ExecutionSubcommand::Stale { older_than } => stale(ctx, older_than.map(Duration::from_secs)),
    }
}

pub fn parse_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let at = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))?;
    Ok(at.with_timezone(&Utc))
}

fn get(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let ws = ctx.open()?;
    let exec = ws.engine.get_execution(&ctx.actor, &ws.org, id)?;
    show(&exec, ctx.json)
}

fn list(ctx: &Context, filter: &ExecutionFilter) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let page = ws.engine.list_executions(&ctx.actor, &ws.org, filter)?;
    if ctx.json {
        return print_json(&page);
    }
    if page.items.is_empty() {
        println!("No executions.");
        return Ok(());
    }
    print_table(
        &["ID", "RULE", "STATUS", "TRIGGER", "STARTED", "ACTIONS"],
        page.items.iter().map(row).collect(),
    );
    println!(
        "\n{}-{} of {}",
        page.offset + 1,
        page.offset + page.items.len(),
        page.total
    );
    Ok(())
}

fn stale(ctx: &Context, older_than: Option<Duration>) -> anyhow::Result<()> {
    let ws = ctx.open()?;
    let stale = ws.engine.stale_executions(&ctx.actor, &ws.org, older_than)?;
    if ctx.json {
        return print_json(&stale);
    }
    if stale.is_empty() {
        println!("No stale executions.");
        return Ok(());
    }
    print_table(
        &["ID", "RULE", "STATUS", "TRIGGER", "STARTED", "ACTIONS"],
        stale.iter().map(row).collect(),
    );
    Ok(())
}

fn status_label(exec: &Execution) -> String {
    if exec.is_awaiting_approval() {
        "awaiting approval".to_string()
    } else {
        exec.status.to_string()
    }
}

fn row(exec: &Execution) -> Vec<String> {
    vec![
        exec.id.to_string(),
        exec.rule_name.clone(),
        status_label(exec),
        exec.trigger.to_string(),
        when(&exec.started_at),
        exec.result.len().to_string(),
    ]
}

/// Print one execution, as JSON or as a summary with one line per action.
pub fn show(exec: &Execution, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(exec);
    }
    println!("Execution {} ({})", exec.id, exec.rule_name);
    println!("  status:    {}", status_label(exec));
    println!("  trigger:   {} by {}", exec.trigger, exec.triggered_by);
    if exec.dry_run {
        println!("  dry run:   yes");
    }
    println!("  started:   {}", when(&exec.started_at));
    println!("  completed: {}", or_dash(exec.completed_at.as_ref().map(when)));
    if let Some(message) = &exec.message {
        println!("  message:   {message}");
    }
    if let Some(error) = &exec.error {
        println!("  error:     {error}");
    }
    match &exec.approval {
        Some(Approval::Approved { by, .. }) => println!("  approved:  by {by}"),
        Some(Approval::Rejected { by, reason, .. }) => {
            println!("  rejected:  by {by}: {reason}")
        }
        _ => {}
    }
    if !exec.held_actions.is_empty() {
        println!("  held actions:");
        for a in &exec.held_actions {
            println!("    [{}] {}", a.order, a.action_type);
        }
    }
    if !exec.result.is_empty() {
        println!("  results:");
        for r in &exec.result {
            let verdict = if r.success { "ok" } else { "FAILED" };
            let detail = match (&r.error, &r.result) {
                (Some(e), _) => e.clone(),
                (None, Some(v)) => v.to_string(),
                (None, None) => String::new(),
            };
            println!("    [{}] {} {verdict} {detail}", r.order, r.action_type);
        }
    }
    Ok(())
}
