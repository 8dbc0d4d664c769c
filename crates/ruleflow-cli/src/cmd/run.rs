use super::{execution, parse_id, parse_payload, Context};

pub fn run(ctx: &Context, rule_id: &str, payload: &str, dry_run: bool) -> anyhow::Result<()> {
    let rule_id = parse_id(rule_id)?;
    let payload = parse_payload(payload)?;
    let ws = ctx.open()?;
    let exec = ws
        .engine
        .run_rule(&ctx.actor, &ws.org, rule_id, payload, dry_run)?;
    execution::show(&exec, ctx.json)
}
