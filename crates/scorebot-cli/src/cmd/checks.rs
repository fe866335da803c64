use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use scorebot_core::registry::AccountRequirement;
use scorebot_core::{
    Config, Credentials, FileCredentials, FileInventory, Inventory, ProbeJob, Registry,
};
use serde::Serialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ChecksSubcommand {
    /// List the registered check types and the properties they take
    List,

    /// Show the command each inventory entry would run (secrets are never shown)
    Render {
        /// Round id used for account rotation
        #[arg(long, default_value = "0")]
        round: u64,

        /// Only render services of this team
        #[arg(long)]
        team: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ChecksSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ChecksSubcommand::List => list(json),
        ChecksSubcommand::Render { round, team } => render(root, round, team.as_deref(), json),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct CheckRow<'a> {
    name: &'a str,
    required: &'a [String],
    optional: &'a [String],
    account: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
}

fn list(json: bool) -> anyhow::Result<()> {
    let registry = Registry::with_builtin_checks();
    let mut rows = Vec::with_capacity(registry.len());
    for name in registry.names() {
        let d = registry.lookup(name)?;
        rows.push(CheckRow {
            name: &d.name,
            required: &d.required_properties,
            optional: &d.optional_properties,
            account: d.account == AccountRequirement::Required,
            timeout_seconds: d.default_timeout.map(|t| t.as_secs()),
        });
    }

    if json {
        return print_json(&rows);
    }
    let table = rows
        .iter()
        .map(|r| {
            vec![
                r.name.to_string(),
                r.required.join(","),
                r.optional.join(","),
                (if r.account { "yes" } else { "-" }).to_string(),
                r.timeout_seconds
                    .map(|s| format!("{s}s"))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["CHECK", "REQUIRED", "OPTIONAL", "ACCOUNT", "TIMEOUT"], table);
    Ok(())
}

// ---------------------------------------------------------------------------
// render
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RenderRow {
    team: String,
    service: String,
    check: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn render(root: &Path, round: u64, team: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let registry = Registry::with_builtin_checks();
    let entries = FileInventory::for_root(root)
        .snapshot()
        .context("failed to load inventory")?;
    let credentials = FileCredentials::for_root(root)
        .snapshot()
        .context("failed to load credentials")?;

    let rows: Vec<RenderRow> = entries
        .iter()
        .filter(|e| team.map_or(true, |t| e.team == t))
        .map(|entry| {
            let built = ProbeJob::build(
                &registry,
                entry,
                &credentials,
                round,
                config.default_timeout(),
            );
            let (timeout_seconds, command, error) = match built {
                Ok(job) => (Some(job.timeout.as_secs()), Some(job.command_text()), None),
                Err(e) => (None, None, Some(e.to_string())),
            };
            RenderRow {
                team: entry.team.clone(),
                service: entry.service.clone(),
                check: entry.check.clone(),
                timeout_seconds,
                command,
                error,
            }
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    let table = rows
        .into_iter()
        .map(|r| {
            let detail = match (r.command, r.error) {
                (Some(cmd), _) => cmd,
                (None, Some(err)) => format!("misconfigured: {err}"),
                (None, None) => String::new(),
            };
            vec![
                r.team,
                r.service,
                r.check,
                r.timeout_seconds
                    .map(|s| format!("{s}s"))
                    .unwrap_or_else(|| "-".to_string()),
                detail,
            ]
        })
        .collect();
    print_table(&["TEAM", "SERVICE", "CHECK", "TIMEOUT", "COMMAND"], table);
    Ok(())
}
