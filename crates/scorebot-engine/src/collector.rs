//! Per-round aggregation of probe outcomes.
//!
//! The collector knows every job dispatched in its round. Writers call
//! [`ResultCollector::record`] from their own tasks; the scheduler waits on
//! [`ResultCollector::wait_complete`] or, at the deadline, closes the round
//! with forced `Timeout` placeholders and seals it.
//!
//! ```text
//! Open ──close_with_placeholders──► Closing ──seal──► Closed
//!  first write wins                  placeholders      late writes
//!                                    may be replaced   are dropped
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use scorebot_core::{JobKey, ProbeOutcome, ResultRecord, RoundState, ScoreError};
use tokio::sync::Notify;

/// What happened to an outcome handed to [`ResultCollector::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    /// First outcome for this key.
    Recorded,
    /// The key already has a real outcome; this one was ignored.
    Duplicate,
    /// A real outcome arrived during close-out and replaced its placeholder.
    ReplacedPlaceholder,
    /// The round is sealed; the outcome was discarded.
    DroppedLate,
    /// The key was not dispatched in this round.
    Unexpected,
}

#[derive(Debug)]
struct Slot {
    outcome: ProbeOutcome,
    forced: bool,
}

#[derive(Debug)]
struct Inner {
    state: RoundState,
    /// Dispatched keys and their redacted command text.
    expected: BTreeMap<JobKey, String>,
    slots: BTreeMap<JobKey, Slot>,
}

#[derive(Debug)]
pub struct ResultCollector {
    round_id: u64,
    inner: Mutex<Inner>,
    complete: Notify,
}

impl ResultCollector {
    pub fn new(round_id: u64, expected: impl IntoIterator<Item = (JobKey, String)>) -> Self {
        Self {
            round_id,
            inner: Mutex::new(Inner {
                state: RoundState::Open,
                expected: expected.into_iter().collect(),
                slots: BTreeMap::new(),
            }),
            complete: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A writer that panicked mid-record left the maps consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn round_id(&self) -> u64 {
        self.round_id
    }

    pub fn state(&self) -> RoundState {
        self.lock().state
    }

    pub fn expected(&self) -> usize {
        self.lock().expected.len()
    }

    pub fn recorded(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_complete(&self) -> bool {
        let inner = self.lock();
        inner.slots.len() == inner.expected.len()
    }

    pub fn record(&self, key: &JobKey, outcome: ProbeOutcome) -> RecordDisposition {
        let mut guard = self.lock();
        let inner = &mut *guard;
        if !inner.expected.contains_key(key) {
            return RecordDisposition::Unexpected;
        }
        let disposition = match inner.state {
            RoundState::Open => {
                if inner.slots.contains_key(key) {
                    RecordDisposition::Duplicate
                } else {
                    inner.slots.insert(
                        key.clone(),
                        Slot {
                            outcome,
                            forced: false,
                        },
                    );
                    RecordDisposition::Recorded
                }
            }
            RoundState::Closing => match inner.slots.get_mut(key) {
                Some(slot) if slot.forced => {
                    slot.outcome = outcome;
                    slot.forced = false;
                    RecordDisposition::ReplacedPlaceholder
                }
                Some(_) => RecordDisposition::Duplicate,
                None => {
                    inner.slots.insert(
                        key.clone(),
                        Slot {
                            outcome,
                            forced: false,
                        },
                    );
                    RecordDisposition::Recorded
                }
            },
            RoundState::Closed | RoundState::Failed => RecordDisposition::DroppedLate,
        };
        if disposition == RecordDisposition::Recorded
            && inner.slots.len() == inner.expected.len()
        {
            // notify_one stores a permit, so a waiter that has not polled yet
            // still sees it.
            self.complete.notify_one();
        }
        disposition
    }

    /// Resolves once every dispatched key has an outcome.
    pub async fn wait_complete(&self) {
        loop {
            if self.is_complete() {
                return;
            }
            self.complete.notified().await;
        }
    }

    /// Enter `Closing` and fill every missing key with a forced `Timeout`.
    /// Returns the number of placeholders written.
    pub fn close_with_placeholders(&self, elapsed_ms: u64) -> Result<usize, ScoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.state = inner.state.transition(RoundState::Closing)?;
        let missing: Vec<JobKey> = inner
            .expected
            .keys()
            .filter(|k| !inner.slots.contains_key(*k))
            .cloned()
            .collect();
        for key in &missing {
            inner.slots.insert(
                key.clone(),
                Slot {
                    outcome: ProbeOutcome::forced_timeout(elapsed_ms),
                    forced: true,
                },
            );
        }
        Ok(missing.len())
    }

    /// Enter `Closed` and emit exactly one record per dispatched key.
    pub fn seal(&self) -> Result<Vec<ResultRecord>, ScoreError> {
        let mut inner = self.lock();
        inner.state = inner.state.transition(RoundState::Closed)?;
        let Inner {
            expected, slots, ..
        } = &mut *inner;
        let records = expected
            .iter()
            .map(|(key, command)| {
                let (outcome, forced) = match slots.remove(key) {
                    Some(slot) => (slot.outcome, slot.forced),
                    None => (ProbeOutcome::forced_timeout(0), true),
                };
                let record = ResultRecord::new(self.round_id, key.clone(), command.clone(), outcome);
                if forced {
                    record.forced()
                } else {
                    record
                }
            })
            .collect();
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
