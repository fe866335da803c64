use crate::error::{Result, ScoreError};
use crate::inventory::MAX_TIMEOUT_SECONDS;
use crate::paths;
use serde::{Deserialize, Serialize};
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

impl ConfigWarning {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Engine settings from `.scorebot/config.yaml`. Every field has a default,
/// so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_round_interval")]
    pub round_interval_seconds: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_probes: usize,
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,
    /// Grace added to the longest job timeout to form the round deadline.
    #[serde(default = "default_slack")]
    pub deadline_slack_seconds: u64,
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
}

fn default_version() -> u32 {
    1
}

fn default_round_interval() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    16
}

fn default_timeout() -> u64 {
    30
}

fn default_slack() -> u64 {
    5
}

fn default_max_output() -> usize {
    10 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            round_interval_seconds: default_round_interval(),
            max_concurrent_probes: default_max_concurrent(),
            default_timeout_seconds: default_timeout(),
            deadline_slack_seconds: default_slack(),
            max_output_bytes: default_max_output(),
        }
    }
}

impl Config {
    pub fn round_interval(&self) -> Duration {
        Duration::from_secs(self.round_interval_seconds)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }

    pub fn deadline_slack(&self) -> Duration {
        Duration::from_secs(self.deadline_slack_seconds)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ScoreError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::replace_file(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.max_concurrent_probes == 0 {
            warnings.push(ConfigWarning::error(
                "max_concurrent_probes is 0: no probe could ever run",
            ));
        }

        if self.round_interval_seconds == 0 {
            warnings.push(ConfigWarning::error("round_interval_seconds must be at least 1"));
        }

        if self.default_timeout_seconds == 0 {
            warnings.push(ConfigWarning::error(
                "default_timeout_seconds is 0: every probe would time out",
            ));
        } else if self.default_timeout_seconds > MAX_TIMEOUT_SECONDS {
            warnings.push(ConfigWarning::error(format!(
                "default_timeout_seconds must be at most {MAX_TIMEOUT_SECONDS}"
            )));
        }

        if self.max_output_bytes == 0 {
            warnings.push(ConfigWarning::warning(
                "max_output_bytes is 0: probe output will not be kept",
            ));
        }

        // Rounds never overlap, so a round that outlives the interval delays
        // the next one.
        let worst_round = self
            .default_timeout_seconds
            .saturating_add(self.deadline_slack_seconds);
        if self.round_interval_seconds > 0 && worst_round > self.round_interval_seconds {
            warnings.push(ConfigWarning::warning(format!(
                "default_timeout_seconds + deadline_slack_seconds ({worst_round}s) exceeds \
                 round_interval_seconds ({}s); slow rounds will push later rounds back",
                self.round_interval_seconds
            )));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
