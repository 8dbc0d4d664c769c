mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    approval::ApprovalSubcommand, audit::AuditSubcommand, config::ConfigSubcommand,
    execution::ExecutionSubcommand, item::ItemSubcommand, notification::NotificationSubcommand,
    purchase::PurchaseSubcommand, rule::RuleSubcommand, Context,
};
use ruleflow_core::RuleflowError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ruleflow",
    about = "Rule-based automation: define rules, fire triggers, inspect executions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .ruleflow/)
    #[arg(long, global = true, env = "RULEFLOW_ROOT")]
    root: Option<PathBuf>,

    /// Organization (default: default_org from config)
    #[arg(long, global = true, env = "RULEFLOW_ORG")]
    org: Option<String>,

    /// Acting user (default: $USER)
    #[arg(long, global = true, env = "RULEFLOW_ACTOR")]
    actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a ruleflow workspace; --org becomes the default organization
    Init,

    /// Create, update, inspect and delete rules
    Rule {
        #[command(subcommand)]
        subcommand: RuleSubcommand,
    },

    /// Run a rule now
    Run {
        /// Rule id
        rule_id: String,
        /// Trigger payload (JSON)
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Simulate every action instead of performing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Dispatch a business event to every matching rule
    Event {
        /// Event name, e.g. stock.changed
        name: String,
        /// Event payload (JSON)
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Dispatch a schedule tick to every matching rule
    Tick {
        /// Tick time in RFC 3339 (default: now, truncated to the minute)
        #[arg(long)]
        at: Option<String>,
    },

    /// Inspect run history
    Execution {
        #[command(subcommand)]
        subcommand: ExecutionSubcommand,
    },

    /// Decide executions held for approval
    Approval {
        #[command(subcommand)]
        subcommand: ApprovalSubcommand,
    },

    /// Manage the local item catalog
    Item {
        #[command(subcommand)]
        subcommand: ItemSubcommand,
    },

    /// Inspect draft purchases created by rules
    Purchase {
        #[command(subcommand)]
        subcommand: PurchaseSubcommand,
    },

    /// Inspect notifications queued by rules
    Notification {
        #[command(subcommand)]
        subcommand: NotificationSubcommand,
    },

    /// Inspect the audit trail
    Audit {
        #[command(subcommand)]
        subcommand: AuditSubcommand,
    },

    /// Show or validate the workspace configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let actor = cli
        .actor
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "operator".to_string());
    let ctx = Context::new(root, cli.org, actor, cli.json);

    let result = match cli.command {
        Commands::Init => cmd::init::run(&ctx),
        Commands::Rule { subcommand } => cmd::rule::run(&ctx, subcommand),
        Commands::Run {
            rule_id,
            payload,
            dry_run,
        } => cmd::run::run(&ctx, &rule_id, &payload, dry_run),
        Commands::Event { name, payload } => cmd::event::run(&ctx, &name, &payload),
        Commands::Tick { at } => cmd::tick::run(&ctx, at.as_deref()),
        Commands::Execution { subcommand } => cmd::execution::run(&ctx, subcommand),
        Commands::Approval { subcommand } => cmd::approval::run(&ctx, subcommand),
        Commands::Item { subcommand } => cmd::item::run(&ctx, subcommand),
        Commands::Purchase { subcommand } => cmd::purchase::run(&ctx, subcommand),
        Commands::Notification { subcommand } => cmd::notification::run(&ctx, subcommand),
        Commands::Audit { subcommand } => cmd::audit::run(&ctx, subcommand),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let code = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<RuleflowError>())
            .map(|err| err.class().exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}
