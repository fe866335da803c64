//! Accounts and the credential collaborator.
//!
//! Layout of `.scorebot/credentials.yaml`:
//!
//! ```yaml
//! teams:
//!   team1:
//!     db:                # service name
//!       pwnbus: pwnbuspass
//! ```
//!
//! The engine takes one [`CredentialSnapshot`] per round and copies accounts
//! out of it by value, so edits to the file (rotation) only affect later rounds.

use crate::error::{Result, ScoreError};
use crate::paths;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A credential value. Never printed, never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, for handing to a child process environment only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub secret: Secret,
}

impl Account {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::new(secret),
        }
    }
}

// ---------------------------------------------------------------------------
// CredentialSnapshot
// ---------------------------------------------------------------------------

/// Accounts frozen for the duration of one round: team → service → username → secret.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialSnapshot {
    #[serde(default)]
    teams: BTreeMap<String, BTreeMap<String, BTreeMap<String, Secret>>>,
}

impl CredentialSnapshot {
    pub fn insert(
        &mut self,
        team: impl Into<String>,
        service: impl Into<String>,
        account: Account,
    ) {
        self.teams
            .entry(team.into())
            .or_default()
            .entry(service.into())
            .or_default()
            .insert(account.username, account.secret);
    }

    /// Usernames known for a service, sorted.
    pub fn usernames(&self, team: &str, service: &str) -> Vec<String> {
        self.teams
            .get(team)
            .and_then(|services| services.get(service))
            .map(|accounts| accounts.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn resolve(&self, team: &str, service: &str, username: &str) -> Result<Account> {
        self.teams
            .get(team)
            .and_then(|services| services.get(service))
            .and_then(|accounts| accounts.get(username))
            .map(|secret| Account {
                username: username.to_string(),
                secret: secret.clone(),
            })
            .ok_or_else(|| ScoreError::UnknownAccount {
                team: team.to_string(),
                service: service.to_string(),
                username: username.to_string(),
            })
    }

    /// Pick the account a service uses in `round_id`.
    ///
    /// Candidates are `refs` when non-empty, otherwise every account on
    /// file for the service. Rotation is `candidates[round_id % len]`.
    /// Returns `Ok(None)` when there are no candidates at all.
    pub fn select(
        &self,
        team: &str,
        service: &str,
        refs: &[String],
        round_id: u64,
    ) -> Result<Option<Account>> {
        let candidates = if refs.is_empty() {
            self.usernames(team, service)
        } else {
            refs.to_vec()
        };
        if candidates.is_empty() {
            return Ok(None);
        }
        let idx = (round_id % candidates.len() as u64) as usize;
        self.resolve(team, service, &candidates[idx]).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Credentials collaborator
// ---------------------------------------------------------------------------

/// Source of account secrets. Called once per round.
pub trait Credentials: Send + Sync {
    fn snapshot(&self) -> Result<CredentialSnapshot>;
}

/// Reads `credentials.yaml` fresh on every snapshot.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_root(root: &Path) -> Self {
        Self::new(paths::credentials_path(root))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Credentials for FileCredentials {
    fn snapshot(&self) -> Result<CredentialSnapshot> {
        if !self.path.exists() {
            return Ok(CredentialSnapshot::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(CredentialSnapshot::default());
        }
        serde_yaml::from_str(&content).map_err(|e| {
            ScoreError::Credentials(format!("{}: {e}", self.path.display()))
        })
    }
}

impl Credentials for CredentialSnapshot {
    fn snapshot(&self) -> Result<CredentialSnapshot> {
        Ok(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
