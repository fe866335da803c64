use crate::error::{Result, ScoreError};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SCOREBOT_DIR: &str = ".scorebot";

pub const CONFIG_FILE: &str = ".scorebot/config.yaml";
pub const INVENTORY_FILE: &str = ".scorebot/inventory.yaml";
pub const CREDENTIALS_FILE: &str = ".scorebot/credentials.yaml";
pub const RESULTS_DB: &str = ".scorebot/results.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn scorebot_dir(root: &Path) -> PathBuf {
    root.join(SCOREBOT_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn inventory_path(root: &Path) -> PathBuf {
    root.join(INVENTORY_FILE)
}

pub fn credentials_path(root: &Path) -> PathBuf {
    root.join(CREDENTIALS_FILE)
}

pub fn results_db_path(root: &Path) -> PathBuf {
    root.join(RESULTS_DB)
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

/// Team and service names end up in result keys and in `team/service/check`
/// labels, so they are restricted to a path-safe alphabet.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = name.len() <= 64
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !valid {
        return Err(ScoreError::Inventory(format!("invalid {kind} name '{name}'")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
