use super::Context;
use anyhow::Context as _;
use ruleflow_core::config::Config;
use ruleflow_core::paths;
use ruleflow_core::store::RedbStore;
use ruleflow_core::types::OrgId;

const DEFAULT_ORG: &str = "default";

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let root = &ctx.root;
    println!("Initializing ruleflow in: {}", root.display());

    let dir = paths::ruleflow_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        let org = OrgId::new(ctx.org_flag().unwrap_or(DEFAULT_ORG))?;
        let cfg = Config::new(&org, ctx.actor.id());
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {} (org '{org}', manager '{}')", paths::CONFIG_FILE, ctx.actor);
    }

    RedbStore::open(&paths::db_path(root)).context("failed to create database")?;
    println!("  ready:   {}", paths::DB_FILE);
    Ok(())
}
