pub mod approval;
pub mod audit;
pub mod config;
pub mod event;
pub mod execution;
pub mod init;
pub mod item;
pub mod notification;
pub mod purchase;
pub mod rule;
pub mod run;
pub mod tick;

use anyhow::Context as _;
use ruleflow_core::config::Config;
use ruleflow_core::store::RedbStore;
use ruleflow_core::types::{Actor, OrgId};
use ruleflow_core::Engine;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Global flags shared by every subcommand.
pub struct Context {
    pub root: PathBuf,
    org: Option<String>,
    pub actor: Actor,
    pub json: bool,
}

/// An opened workspace: the engine and its backing store.
pub struct Workspace {
    pub org: OrgId,
    pub engine: Engine,
    pub store: Arc<RedbStore>,
}

impl Context {
    pub fn new(root: PathBuf, org: Option<String>, actor: String, json: bool) -> Self {
        Self {
            root,
            org,
            actor: Actor::new(actor),
            json,
        }
    }

    /// `--org` as given, if any.
    pub fn org_flag(&self) -> Option<&str> {
        self.org.as_deref()
    }

    pub fn load_config(&self) -> anyhow::Result<Config> {
        Config::load(&self.root).context("failed to load config")
    }

    /// `--org`, else the config's `default_org`.
    pub fn org(&self, config: &Config) -> anyhow::Result<OrgId> {
        if let Some(org) = &self.org {
            return Ok(OrgId::new(org.as_str())?);
        }
        match config.default_org() {
            Some(org) => Ok(org?),
            None => anyhow::bail!("no organization: pass --org or set default_org in config"),
        }
    }

    pub fn open(&self) -> anyhow::Result<Workspace> {
        let config = self.load_config()?;
        let org = self.org(&config)?;
        let (engine, store) =
            Engine::open_local(&self.root, &config).context("failed to open database")?;
        Ok(Workspace {
            org,
            engine,
            store,
        })
    }
}

pub fn parse_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("'{raw}' is not a valid id"))
}

pub fn parse_payload(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).context("payload must be valid JSON")
}
