use crate::types::{JobKey, ProbeOutcome, ProbeStatus, RoundState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ResultRecord
// ---------------------------------------------------------------------------

/// The persisted outcome of one job in one round. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: Uuid,
    pub round_id: u64,
    pub key: JobKey,
    /// Redacted command line; empty when the job never got as far as rendering.
    #[serde(default)]
    pub command: String,
    pub outcome: ProbeOutcome,
    /// True when the outcome is a deadline placeholder rather than a report
    /// from the probe itself.
    #[serde(default)]
    pub forced: bool,
}

impl ResultRecord {
    pub fn new(round_id: u64, key: JobKey, command: impl Into<String>, outcome: ProbeOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            round_id,
            key,
            command: command.into(),
            outcome,
            forced: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    pub fn status(&self) -> ProbeStatus {
        self.outcome.status
    }
}

// ---------------------------------------------------------------------------
// RoundSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub id: u64,
    pub state: RoundState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub job_count: usize,
    /// Round deadline measured from dispatch; 0 until jobs are built.
    #[serde(default)]
    pub deadline_ms: u64,
    /// Records per status, keyed by the status' snake_case name.
    #[serde(default)]
    pub counts: BTreeMap<String, usize>,
    /// Set when the round failed before dispatching anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoundSummary {
    pub fn open(id: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            state: RoundState::Open,
            started_at,
            closed_at: None,
            job_count: 0,
            deadline_ms: 0,
            counts: BTreeMap::new(),
            error: None,
        }
    }

    pub fn tally(&mut self, records: &[ResultRecord]) {
        self.counts.clear();
        for record in records {
            *self
                .counts
                .entry(record.status().as_str().to_string())
                .or_default() += 1;
        }
        self.job_count = records.len();
    }

    pub fn count(&self, status: ProbeStatus) -> usize {
        self.counts.get(status.as_str()).copied().unwrap_or(0)
    }
}
