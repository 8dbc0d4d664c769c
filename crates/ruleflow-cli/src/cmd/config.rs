use super::Context;
use crate::output::print_json;
use clap::{Subcommand, ValueEnum};
use ruleflow_core::config::WarnLevel;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Grant an actor a role in the current organization
    Grant {
        #[arg(id = "grantee", value_name = "ACTOR")]
        actor: String,
        #[arg(long, value_enum, default_value = "runner")]
        role: Role,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Role {
    Manager,
    Runner,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(ctx: &Context, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(ctx),
        ConfigSubcommand::Validate => validate(ctx),
        ConfigSubcommand::Grant { actor, role } => grant(ctx, &actor, role),
    }
}

fn show(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    if ctx.json {
        print_json(&config)
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let warnings = config.validate();

    if ctx.json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// grant
// ---------------------------------------------------------------------------

/// Only a manager of the organization may hand out roles.
fn grant(ctx: &Context, actor: &str, role: Role) -> anyhow::Result<()> {
    let mut config = ctx.load_config()?;
    let org = ctx.org(&config)?;
    ruleflow_core::auth::require(
        &config.access,
        &ctx.actor,
        &org,
        ruleflow_core::auth::Capability::ManageRules,
    )?;

    let access = config.access.orgs.entry(org.to_string()).or_default();
    let list = match role {
        Role::Manager => &mut access.managers,
        Role::Runner => &mut access.runners,
    };
    if !list.iter().any(|a| a == actor) {
        list.push(actor.to_string());
    }
    config.save(&ctx.root)?;

    let role_name = match role {
        Role::Manager => "manager",
        Role::Runner => "runner",
    };
    if ctx.json {
        print_json(&serde_json::json!({ "org": org.as_str(), "actor": actor, "role": role_name }))
    } else {
        println!("Granted {role_name} on {org} to {actor}");
        Ok(())
    }
}
