use crate::output::{first_line, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use scorebot_core::{paths, Config, ProbeStatus, RoundSummary};
use std::path::Path;

#[derive(Subcommand)]
pub enum ResultsSubcommand {
    /// List recorded rounds, newest first
    Rounds {
        /// Show at most this many rounds
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show every result of one round
    Show {
        /// Round id (default: latest round)
        #[arg(long)]
        round: Option<u64>,
    },
}

pub fn run(root: &Path, subcmd: ResultsSubcommand, json: bool) -> anyhow::Result<()> {
    Config::load(root).context("failed to load config")?;
    // Nothing has run yet; avoid creating an empty database just to read it.
    if !paths::results_db_path(root).exists() {
        if json {
            return print_json(&serde_json::json!([]));
        }
        println!("No rounds recorded yet.");
        return Ok(());
    }
    match subcmd {
        ResultsSubcommand::Rounds { limit } => rounds(root, limit, json),
        ResultsSubcommand::Show { round } => show(root, round, json),
    }
}

// ---------------------------------------------------------------------------
// rounds
// ---------------------------------------------------------------------------

fn rounds(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let mut rounds = store.rounds()?;
    rounds.reverse();
    rounds.truncate(limit);

    if json {
        return print_json(&rounds);
    }
    if rounds.is_empty() {
        println!("No rounds recorded yet.");
        return Ok(());
    }

    let mut headers = vec!["ROUND", "STATE", "STARTED", "JOBS"];
    headers.extend(ProbeStatus::all().iter().map(|s| s.as_str()));
    let rows = rounds.iter().map(round_row).collect();
    print_table(&headers, rows);
    Ok(())
}

fn round_row(r: &RoundSummary) -> Vec<String> {
    let mut row = vec![
        r.id.to_string(),
        r.state.to_string(),
        r.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        r.job_count.to_string(),
    ];
    row.extend(ProbeStatus::all().iter().map(|s| r.count(*s).to_string()));
    row
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, round: Option<u64>, json: bool) -> anyhow::Result<()> {
    let store = super::open_store(root)?;
    let summary = match round {
        Some(id) => store
            .round(id)?
            .with_context(|| format!("round {id} not found"))?,
        None => store.latest_round()?.context("no rounds recorded yet")?,
    };
    let records = store.round_records(summary.id)?;

    if json {
        return print_json(&serde_json::json!({
            "round": summary,
            "records": records,
        }));
    }

    println!(
        "round {} [{}] started {}",
        summary.id,
        summary.state,
        summary.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(err) = &summary.error {
        println!("error: {err}");
    }
    println!();

    let rows = records
        .iter()
        .map(|r| {
            let status = if r.forced {
                format!("{} (deadline)", r.status())
            } else {
                r.status().to_string()
            };
            vec![
                r.key.team.clone(),
                r.key.service.clone(),
                r.key.check.clone(),
                status,
                r.outcome.elapsed_ms.to_string(),
                r.command.clone(),
                first_line(&r.outcome.output, 60),
            ]
        })
        .collect();
    print_table(
        &["TEAM", "SERVICE", "CHECK", "STATUS", "MS", "COMMAND", "OUTPUT"],
        rows,
    );
    Ok(())
}
