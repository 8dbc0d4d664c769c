use crate::error::{Result, RuleflowError};
use crate::paths;
use crate::types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// EngineSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
    /// Reject a second concurrent run of the same rule in this process.
    #[serde(default)]
    pub serialize_runs: bool,
    #[serde(default = "default_stale_after")]
    pub stale_running_after_secs: u64,
    #[serde(default = "default_true")]
    pub delete_executions_with_rule: bool,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_stale_after() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    50
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            webhook_timeout_secs: default_webhook_timeout(),
            serialize_runs: false,
            stale_running_after_secs: default_stale_after(),
            delete_executions_with_rule: true,
            page_size: default_page_size(),
        }
    }
}

impl EngineSettings {
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_running_after_secs)
    }
}

// ---------------------------------------------------------------------------
// AccessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgAccess {
    #[serde(default)]
    pub managers: Vec<String>,
    #[serde(default)]
    pub runners: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Skip capability checks entirely.
    #[serde(default)]
    pub open: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub orgs: BTreeMap<String, OrgAccess>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_org: Option<String>,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub access: AccessConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    /// A config for a fresh workspace where `manager` administers `org`.
    pub fn new(org: &OrgId, manager: &str) -> Self {
        let mut access = AccessConfig::default();
        access.orgs.insert(
            org.to_string(),
            OrgAccess {
                managers: vec![manager.to_string()],
                runners: Vec::new(),
            },
        );
        Self {
            version: 1,
            default_org: Some(org.to_string()),
            engine: EngineSettings::default(),
            access,
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(RuleflowError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn default_org(&self) -> Option<Result<OrgId>> {
        self.default_org.as_deref().map(OrgId::new)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Some(org) = &self.default_org {
            if OrgId::new(org.as_str()).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("default_org '{org}' is not a valid organization id"),
                });
            }
        }

        for (org, access) in &self.access.orgs {
            if OrgId::new(org.as_str()).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("access.orgs key '{org}' is not a valid organization id"),
                });
            }
            if access.managers.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("organization '{org}' has no managers"),
                });
            }
        }

        if self.access.open {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "access.open is set: every actor may manage and run rules".into(),
            });
        }

        if self.engine.webhook_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "engine.webhook_timeout_secs must be greater than zero".into(),
            });
        } else if self.engine.webhook_timeout_secs > 120 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "engine.webhook_timeout_secs={} holds the whole run that long (>120 is unusual)",
                    self.engine.webhook_timeout_secs
                ),
            });
        }

        if self.engine.page_size == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "engine.page_size must be greater than zero".into(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
