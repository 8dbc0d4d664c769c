use super::{execution, parse_id, Context};
use clap::Subcommand;
use ruleflow_core::Decision;

#[derive(Subcommand)]
pub enum ApprovalSubcommand {
    /// Approve a held execution and run its actions
    Approve { execution_id: String },

    /// Reject a held execution; it fails without running anything
    Reject {
        execution_id: String,
        #[arg(long)]
        reason: String,
    },
}

pub fn run(ctx: &Context, subcmd: ApprovalSubcommand) -> anyhow::Result<()> {
    let (id, decision) = match subcmd {
        ApprovalSubcommand::Approve { execution_id } => (execution_id, Decision::Approve),
        ApprovalSubcommand::Reject {
            execution_id,
            reason,
        } => (execution_id, Decision::Reject { reason }),
    };
    let id = parse_id(&id)?;
    let ws = ctx.open()?;
    let exec = ws
        .engine
        .decide_approval(&ctx.actor, &ws.org, id, decision)?;
    execution::show(&exec, ctx.json)
}
