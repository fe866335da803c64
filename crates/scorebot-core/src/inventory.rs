//! The inventory collaborator: which services each team exposes and how to
//! check them.
//!
//! `.scorebot/inventory.yaml`:
//!
//! ```yaml
//! teams:
//!   - name: team1
//!     services:
//!       - name: db
//!         host: 10.1.1.5
//!         port: 5432
//!         check: POSTGRESQLCheck
//!         properties:
//!           database: testdb
//!           command: '\d'
//!         accounts: [pwnbus]
//!         timeout_seconds: 10
//!         expect: "List of relations"
//! ```

use crate::error::{Result, ScoreError};
use crate::paths;
use crate::registry::Properties;
use crate::types::JobKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub teams: Vec<TeamDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamDefinition {
    pub name: String,
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub port: u16,
    pub check: String,
    #[serde(default)]
    pub properties: Properties,
    /// Usernames to rotate through; empty means every account on file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Regex the probe output must match for the probe to count as a success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
}

// ---------------------------------------------------------------------------
// InventoryEntry
// ---------------------------------------------------------------------------

/// One (team, service, check) tuple, flattened from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryEntry {
    pub team: String,
    pub service: String,
    pub host: String,
    pub port: u16,
    pub check: String,
    pub properties: Properties,
    pub accounts: Vec<String>,
    pub timeout_seconds: Option<u64>,
    pub expect: Option<String>,
}

impl InventoryEntry {
    pub fn new(
        team: impl Into<String>,
        service: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        check: impl Into<String>,
    ) -> Self {
        Self {
            team: team.into(),
            service: service.into(),
            host: host.into(),
            port,
            check: check.into(),
            properties: Properties::new(),
            accounts: Vec::new(),
            timeout_seconds: None,
            expect: None,
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn account(mut self, username: impl Into<String>) -> Self {
        self.accounts.push(username.into());
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn expect(mut self, pattern: impl Into<String>) -> Self {
        self.expect = Some(pattern.into());
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(&self.team, &self.service, &self.check)
    }
}

/// Upper bound on a per-service `timeout_seconds` override.
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;

impl InventoryFile {
    /// Flatten to entries, rejecting duplicate (team, service, check) keys
    /// and timeout overrides outside `1..=MAX_TIMEOUT_SECONDS`.
    pub fn entries(&self) -> Result<Vec<InventoryEntry>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for team in &self.teams {
            paths::validate_name("team", &team.name)?;
            for svc in &team.services {
                paths::validate_name("service", &svc.name)?;
                if let Some(secs) = svc.timeout_seconds {
                    if secs == 0 || secs > MAX_TIMEOUT_SECONDS {
                        return Err(ScoreError::Inventory(format!(
                            "{}/{}: timeout_seconds must be between 1 and {MAX_TIMEOUT_SECONDS}, got {secs}",
                            team.name, svc.name
                        )));
                    }
                }
                let entry = InventoryEntry {
                    team: team.name.clone(),
                    service: svc.name.clone(),
                    host: svc.host.clone(),
                    port: svc.port,
                    check: svc.check.clone(),
                    properties: svc.properties.clone(),
                    accounts: svc.accounts.clone(),
                    timeout_seconds: svc.timeout_seconds,
                    expect: svc.expect.clone(),
                };
                if !seen.insert(entry.key()) {
                    return Err(ScoreError::Inventory(format!(
                        "duplicate service definition: {}",
                        entry.key()
                    )));
                }
                out.push(entry);
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Inventory collaborator
// ---------------------------------------------------------------------------

/// Source of the services to probe. Read once per round.
pub trait Inventory: Send + Sync {
    fn snapshot(&self) -> Result<Vec<InventoryEntry>>;
}

/// Reads `inventory.yaml` fresh on every snapshot.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_root(root: &Path) -> Self {
        Self::new(paths::inventory_path(root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<InventoryFile> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ScoreError::Inventory(format!("cannot read {}: {e}", self.path.display()))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| ScoreError::Inventory(format!("{}: {e}", self.path.display())))
    }
}

impl Inventory for FileInventory {
    fn snapshot(&self) -> Result<Vec<InventoryEntry>> {
        self.load()?.entries()
    }
}

impl Inventory for Vec<InventoryEntry> {
    fn snapshot(&self) -> Result<Vec<InventoryEntry>> {
        Ok(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
