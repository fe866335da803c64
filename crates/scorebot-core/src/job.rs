//! Turning an inventory entry into a runnable probe job.

use crate::account::CredentialSnapshot;
use crate::error::{Result, ScoreError};
use crate::inventory::InventoryEntry;
use crate::invocation::Invocation;
use crate::registry::Registry;
use crate::types::JobKey;
use regex::Regex;
use std::time::Duration;

/// One probe for one round. Owns everything it needs: the properties and
/// account were resolved into `invocation` when the job was built, so later
/// edits to the inventory or credentials cannot reach it.
#[derive(Debug, Clone)]
pub struct ProbeJob {
    pub key: JobKey,
    pub round_id: u64,
    pub host: String,
    pub port: u16,
    pub invocation: Invocation,
    pub timeout: Duration,
    pub expect: Option<Regex>,
}

impl ProbeJob {
    /// Resolve, validate and render a job.
    ///
    /// Timeout precedence: the service's `timeout_seconds`, then the check
    /// type's default, then `default_timeout`.
    pub fn build(
        registry: &Registry,
        entry: &InventoryEntry,
        credentials: &CredentialSnapshot,
        round_id: u64,
        default_timeout: Duration,
    ) -> Result<Self> {
        let descriptor = registry.lookup(&entry.check)?;
        descriptor.validate(&entry.properties)?;

        let account = if descriptor.needs_account() || !entry.accounts.is_empty() {
            credentials.select(&entry.team, &entry.service, &entry.accounts, round_id)?
        } else {
            None
        };

        let invocation =
            descriptor.build(&entry.host, entry.port, account.as_ref(), &entry.properties)?;

        let timeout = entry
            .timeout_seconds
            .map(Duration::from_secs)
            .or(descriptor.default_timeout)
            .unwrap_or(default_timeout);

        let expect = entry
            .expect
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ScoreError::InvalidExpect {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            key: entry.key(),
            round_id,
            host: entry.host.clone(),
            port: entry.port,
            invocation,
            timeout,
            expect,
        })
    }

    /// The redacted command line, as logged and persisted.
    pub fn command_text(&self) -> String {
        self.invocation.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
