//! Check descriptor registry.
//!
//! A check type is a named descriptor carrying its property schema, its
//! account requirement and a command-building function. The registry is
//! populated before the first round and then shared read-only behind an
//! `Arc`, so lookups on the probe path take no locks.

use crate::account::Account;
use crate::error::{Result, ScoreError};
use crate::invocation::Invocation;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Check-specific configuration, e.g. `database = "testdb"`.
pub type Properties = BTreeMap<String, String>;

/// Renders an [`Invocation`] for one probe target. Must not execute anything.
pub type BuildFn = Arc<dyn Fn(&BuildTarget<'_>) -> Result<Invocation> + Send + Sync>;

// ---------------------------------------------------------------------------
// AccountRequirement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRequirement {
    None,
    Required,
}

// ---------------------------------------------------------------------------
// BuildTarget
// ---------------------------------------------------------------------------

/// Everything a builder may read: the service address, the account snapshot
/// and the validated properties.
#[derive(Debug, Clone, Copy)]
pub struct BuildTarget<'a> {
    pub check: &'a str,
    pub host: &'a str,
    pub port: u16,
    pub account: Option<&'a Account>,
    pub properties: &'a Properties,
}

impl<'a> BuildTarget<'a> {
    pub fn property(&self, key: &str) -> Result<&'a str> {
        self.properties
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ScoreError::MissingProperty(key.to_string()))
    }

    pub fn property_or(&self, key: &str, default: &'a str) -> &'a str {
        self.properties
            .get(key)
            .map(String::as_str)
            .unwrap_or(default)
    }

    pub fn account(&self) -> Result<&'a Account> {
        self.account
            .ok_or_else(|| ScoreError::MissingAccount(self.check.to_string()))
    }
}

// ---------------------------------------------------------------------------
// CheckDescriptor
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CheckDescriptor {
    pub name: String,
    pub required_properties: Vec<String>,
    pub optional_properties: Vec<String>,
    pub account: AccountRequirement,
    /// Per-check timeout; the engine default applies when `None`.
    pub default_timeout: Option<Duration>,
    builder: BuildFn,
}

impl CheckDescriptor {
    pub fn new<F>(name: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&BuildTarget<'_>) -> Result<Invocation> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required_properties: Vec::new(),
            optional_properties: Vec::new(),
            account: AccountRequirement::None,
            default_timeout: None,
            builder: Arc::new(builder),
        }
    }

    pub fn required(mut self, keys: &[&str]) -> Self {
        self.required_properties = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn optional(mut self, keys: &[&str]) -> Self {
        self.optional_properties = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_account(mut self) -> Self {
        self.account = AccountRequirement::Required;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn needs_account(&self) -> bool {
        self.account == AccountRequirement::Required
    }

    /// Fails with `MissingProperty` naming the first absent required key.
    /// Keys outside the schema are ignored.
    pub fn validate(&self, properties: &Properties) -> Result<()> {
        for key in &self.required_properties {
            if !properties.contains_key(key) {
                return Err(ScoreError::MissingProperty(key.clone()));
            }
        }
        Ok(())
    }

    /// Validate and render the invocation for one target.
    pub fn build(
        &self,
        host: &str,
        port: u16,
        account: Option<&Account>,
        properties: &Properties,
    ) -> Result<Invocation> {
        self.validate(properties)?;
        if self.needs_account() && account.is_none() {
            return Err(ScoreError::MissingAccount(self.name.clone()));
        }
        let target = BuildTarget {
            check: &self.name,
            host,
            port,
            account,
            properties,
        };
        (self.builder)(&target)
    }
}

impl fmt::Debug for CheckDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckDescriptor")
            .field("name", &self.name)
            .field("required_properties", &self.required_properties)
            .field("optional_properties", &self.optional_properties)
            .field("account", &self.account)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Registry {
    checks: HashMap<String, CheckDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in check type.
    pub fn with_builtin_checks() -> Self {
        let mut registry = Self::new();
        for descriptor in crate::checks::builtin() {
            // Built-in names are distinct, so this cannot collide.
            if let Err(e) = registry.register(descriptor) {
                tracing::error!(error = %e, "built-in check registration failed");
            }
        }
        registry
    }

    pub fn register(&mut self, descriptor: CheckDescriptor) -> Result<()> {
        if self.checks.contains_key(&descriptor.name) {
            return Err(ScoreError::DuplicateCheckType(descriptor.name));
        }
        tracing::debug!(check = %descriptor.name, "registered check type");
        self.checks.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&CheckDescriptor> {
        self.checks
            .get(name)
            .ok_or_else(|| ScoreError::UnknownCheckType(name.to_string()))
    }

    pub fn validate(&self, name: &str, properties: &Properties) -> Result<()> {
        self.lookup(name)?.validate(properties)
    }

    pub fn build(
        &self,
        name: &str,
        host: &str,
        port: u16,
        account: Option<&Account>,
        properties: &Properties,
    ) -> Result<Invocation> {
        self.lookup(name)?.build(host, port, account, properties)
    }

    /// Registered check names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
