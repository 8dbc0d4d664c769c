use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const RULEFLOW_DIR: &str = ".ruleflow";
pub const CONFIG_FILE: &str = ".ruleflow/config.yaml";
pub const DB_FILE: &str = ".ruleflow/ruleflow.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn ruleflow_dir(root: &Path) -> PathBuf {
    root.join(RULEFLOW_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}
