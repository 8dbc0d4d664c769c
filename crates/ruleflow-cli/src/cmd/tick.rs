use super::{event::print_report, execution::parse_time, Context};
use chrono::{Duration, DurationRound, Utc};

pub fn run(ctx: &Context, at: Option<&str>) -> anyhow::Result<()> {
    let tick = match at {
        Some(raw) => parse_time(raw)?,
        None => Utc::now().duration_trunc(Duration::minutes(1))?,
    };
    let ws = ctx.open()?;
    let report = ws.engine.dispatch_tick(&ws.org, tick)?;
    print_report(&report, ctx.json)
}
