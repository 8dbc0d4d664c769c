use super::{parse_payload, Context};
use crate::output::{or_dash, print_json, print_table};
use ruleflow_core::dispatcher::DispatchReport;
use ruleflow_core::rule::BusinessEvent;

pub fn run(ctx: &Context, name: &str, payload: &str) -> anyhow::Result<()> {
    let event = BusinessEvent::new(name, parse_payload(payload)?);
    let ws = ctx.open()?;
    let report = ws.engine.dispatch_event(&ws.org, &event)?;
    print_report(&report, ctx.json)
}

pub fn print_report(report: &DispatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    if report.runs.is_empty() {
        println!("No rules matched {}.", report.source);
        return Ok(());
    }
    let rows = report
        .runs
        .iter()
        .map(|r| {
            let outcome = match (&r.error, r.status) {
                (Some(e), _) => format!("error: {e}"),
                _ if r.awaiting_approval => "awaiting approval".to_string(),
                (None, Some(status)) => status.to_string(),
                (None, None) => "-".to_string(),
            };
            vec![
                r.rule_name.clone(),
                or_dash(r.execution_id.map(|id| id.to_string())),
                outcome,
            ]
        })
        .collect();
    print_table(&["RULE", "EXECUTION", "OUTCOME"], rows);
    Ok(())
}
