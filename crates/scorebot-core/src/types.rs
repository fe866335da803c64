use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ScoreError;

// ---------------------------------------------------------------------------
// JobKey
// ---------------------------------------------------------------------------

/// Identity of one probe within a round: at most one result per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub team: String,
    pub service: String,
    pub check: String,
}

impl JobKey {
    pub fn new(
        team: impl Into<String>,
        service: impl Into<String>,
        check: impl Into<String>,
    ) -> Self {
        Self {
            team: team.into(),
            service: service.into(),
            check: check.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.team, self.service, self.check)
    }
}

// ---------------------------------------------------------------------------
// ProbeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The probe command exited 0 (and matched `expect`, when set).
    Success,
    /// The service rejected the probe or answered with the wrong content.
    Failure,
    /// The probe did not finish within its timeout, or the round closed first.
    Timeout,
    /// The engine could not launch the probe (missing binary, permissions).
    BuildError,
    /// The check definition is unusable: unknown type, missing property or account.
    Misconfigured,
}

impl ProbeStatus {
    pub fn all() -> &'static [ProbeStatus] {
        &[
            ProbeStatus::Success,
            ProbeStatus::Failure,
            ProbeStatus::Timeout,
            ProbeStatus::BuildError,
            ProbeStatus::Misconfigured,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeStatus::Success => "success",
            ProbeStatus::Failure => "failure",
            ProbeStatus::Timeout => "timeout",
            ProbeStatus::BuildError => "build_error",
            ProbeStatus::Misconfigured => "misconfigured",
        }
    }

    pub fn is_success(self) -> bool {
        self == ProbeStatus::Success
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProbeOutcome
// ---------------------------------------------------------------------------

/// Classified result of executing one probe. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    /// Tail of combined stdout/stderr, or a diagnostic message.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn new(status: ProbeStatus, output: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            status,
            output: output.into(),
            exit_code: None,
            elapsed_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Outcome for a job that never ran because its definition is broken.
    pub fn misconfigured(err: &ScoreError) -> Self {
        Self::new(ProbeStatus::Misconfigured, err.to_string(), 0)
    }

    /// Placeholder written when a round closes before the job reported.
    pub fn forced_timeout(elapsed_ms: u64) -> Self {
        Self::new(
            ProbeStatus::Timeout,
            "round deadline reached before the probe reported",
            elapsed_ms,
        )
    }

    /// Downgrade a successful outcome to `Failure` when its output does not
    /// contain the expected content. Other statuses pass through unchanged.
    pub fn require_match(mut self, expect: &Regex) -> Self {
        if self.status == ProbeStatus::Success && !expect.is_match(&self.output) {
            self.status = ProbeStatus::Failure;
            self.output = format!(
                "expected content not found (pattern: {})\n{}",
                expect.as_str(),
                self.output
            );
        }
        self
    }
}

// ---------------------------------------------------------------------------
// RoundState
// ---------------------------------------------------------------------------

/// Lifecycle of a round.
///
/// Transitions: `Open → Closing → Closed`, or `Open → Failed` when the
/// inventory cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Open,
    Closing,
    Closed,
    Failed,
}

impl RoundState {
    pub fn as_str(self) -> &'static str {
        match self {
            RoundState::Open => "open",
            RoundState::Closing => "closing",
            RoundState::Closed => "closed",
            RoundState::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: RoundState) -> bool {
        matches!(
            (self, next),
            (RoundState::Open, RoundState::Closing)
                | (RoundState::Open, RoundState::Failed)
                | (RoundState::Closing, RoundState::Closed)
        )
    }

    pub fn transition(self, next: RoundState) -> Result<RoundState, ScoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ScoreError::InvalidRoundTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
