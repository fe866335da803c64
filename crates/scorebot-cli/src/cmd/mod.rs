pub mod checks;
pub mod config;
pub mod init;
pub mod results;
pub mod round;
pub mod run;

use anyhow::Context;
use scorebot_core::config::WarnLevel;
use scorebot_core::{paths, Config, FileCredentials, FileInventory, Registry, ResultStore};
use scorebot_engine::{RoundScheduler, SchedulerConfig};
use std::path::Path;
use std::sync::Arc;

/// Load the config and refuse to continue on error-level warnings.
pub(crate) fn load_config(root: &Path) -> anyhow::Result<Config> {
    let config = Config::load(root).context("failed to load config")?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
        }
    }
    Ok(config)
}

pub(crate) fn open_store(root: &Path) -> anyhow::Result<ResultStore> {
    let path = paths::results_db_path(root);
    ResultStore::open(&path)
        .with_context(|| format!("failed to open result database {}", path.display()))
}

/// Wire the file-backed collaborators into a scheduler.
pub(crate) fn build_scheduler(root: &Path) -> anyhow::Result<RoundScheduler> {
    let config = load_config(root)?;
    let store = open_store(root)?;
    Ok(RoundScheduler::new(
        SchedulerConfig::from(&config),
        Arc::new(Registry::with_builtin_checks()),
        Arc::new(FileInventory::for_root(root)),
        Arc::new(FileCredentials::for_root(root)),
        Arc::new(store),
    ))
}
