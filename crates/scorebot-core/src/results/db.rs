//! Persistent result storage using redb.
//!
//! # Table design
//!
//! `RESULTS` uses a composite key:
//! ```text
//! [ round_id: u64 big-endian (8 bytes) | team \0 service \0 check ]
//! ```
//!
//! The round id occupies the high bytes, so byte order equals round order
//! and one range scan returns every record of a round. A key is written at
//! most once; a second write is rejected with `DuplicateRecord`.
//!
//! `ROUNDS` maps a round id to its JSON `RoundSummary`. `META` holds the
//! last allocated round id so ids are never reused across restarts.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{Result, ScoreError};
use crate::types::JobKey;

use super::record::{ResultRecord, RoundSummary};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

/// Key: round id ++ job key. Value: JSON-encoded `ResultRecord`.
const RESULTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("results");

/// Key: round id. Value: JSON-encoded `RoundSummary`.
const ROUNDS: TableDefinition<u64, &[u8]> = TableDefinition::new("rounds");

const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const LAST_ROUND_ID: &str = "last_round_id";

fn db_err(e: impl std::fmt::Display) -> ScoreError {
    ScoreError::ResultDb(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn record_key(round_id: u64, key: &JobKey) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(8 + key.team.len() + key.service.len() + key.check.len() + 2);
    out.extend_from_slice(&round_id.to_be_bytes());
    out.extend_from_slice(key.team.as_bytes());
    out.push(0);
    out.extend_from_slice(key.service.as_bytes());
    out.push(0);
    out.extend_from_slice(key.check.as_bytes());
    out
}

// ---------------------------------------------------------------------------
// ResultSink
// ---------------------------------------------------------------------------

/// Where the engine sends round ids, records and summaries.
pub trait ResultSink: Send + Sync {
    /// Allocate the next round id. Strictly greater than any id returned before.
    fn next_round_id(&self) -> Result<u64>;

    /// Persist records in one transaction. Fails without writing anything if
    /// any (round, key) pair already exists.
    fn append(&self, records: &[ResultRecord]) -> Result<()>;

    /// Insert or replace the summary for a round.
    fn save_round(&self, summary: &RoundSummary) -> Result<()>;
}

// ---------------------------------------------------------------------------
// ResultStore
// ---------------------------------------------------------------------------

pub struct ResultStore {
    db: Database,
}

impl ResultStore {
    /// Open or create the database at `path`, creating all tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(RESULTS).map_err(db_err)?;
        wt.open_table(ROUNDS).map_err(db_err)?;
        wt.open_table(META).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// All records of one round, ordered by job key.
    pub fn round_records(&self, round_id: u64) -> Result<Vec<ResultRecord>> {
        let lower = round_id.to_be_bytes();
        let upper = round_id.saturating_add(1).to_be_bytes();
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(RESULTS).map_err(db_err)?;

        let mut out = Vec::new();
        for entry in table
            .range(lower.as_slice()..upper.as_slice())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            let record: ResultRecord = serde_json::from_slice(v.value()).map_err(db_err)?;
            out.push(record);
        }
        Ok(out)
    }

    /// Every round summary, oldest first.
    pub fn rounds(&self) -> Result<Vec<RoundSummary>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ROUNDS).map_err(db_err)?;

        let mut out = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let summary: RoundSummary = serde_json::from_slice(v.value()).map_err(db_err)?;
            out.push(summary);
        }
        Ok(out)
    }

    pub fn round(&self, round_id: u64) -> Result<Option<RoundSummary>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ROUNDS).map_err(db_err)?;
        let summary = match table.get(round_id).map_err(db_err)? {
            Some(v) => Some(serde_json::from_slice(v.value()).map_err(db_err)?),
            None => None,
        };
        Ok(summary)
    }

    pub fn latest_round(&self) -> Result<Option<RoundSummary>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(ROUNDS).map_err(db_err)?;
        let latest = match table.last().map_err(db_err)? {
            Some((_, v)) => Some(serde_json::from_slice(v.value()).map_err(db_err)?),
            None => None,
        };
        Ok(latest)
    }
}

impl ResultSink for ResultStore {
    fn next_round_id(&self) -> Result<u64> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let next = {
            let mut table = wt.open_table(META).map_err(db_err)?;
            let last = table
                .get(LAST_ROUND_ID)
                .map_err(db_err)?
                .map(|v| v.value())
                .unwrap_or(0);
            let next = last + 1;
            table.insert(LAST_ROUND_ID, next).map_err(db_err)?;
            next
        };
        wt.commit().map_err(db_err)?;
        Ok(next)
    }

    fn append(&self, records: &[ResultRecord]) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(RESULTS).map_err(db_err)?;
            for record in records {
                let key = record_key(record.round_id, &record.key);
                if table.get(key.as_slice()).map_err(db_err)?.is_some() {
                    return Err(ScoreError::DuplicateRecord {
                        round_id: record.round_id,
                        key: record.key.to_string(),
                    });
                }
                let value = serde_json::to_vec(record)?;
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    fn save_round(&self, summary: &RoundSummary) -> Result<()> {
        let value = serde_json::to_vec(summary)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(ROUNDS).map_err(db_err)?;
            table.insert(summary.id, value.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProbeOutcome, ProbeStatus, RoundState};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, ResultStore) {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::open(&dir.path().join("results.db")).unwrap();
        (dir, store)
    }

    fn record(round_id: u64, team: &str, service: &str) -> ResultRecord {
        ResultRecord::new(
            round_id,
            JobKey::new(team, service, "ICMPCheck"),
            format!("ping -c 1 {service}"),
            ProbeOutcome::new(ProbeStatus::Success, "1 packets received", 3),
        )
    }

    #[test]
    fn round_ids_strictly_increase() {
        let (_dir, store) = open_tmp();
        assert_eq!(store.next_round_id().unwrap(), 1);
        assert_eq!(store.next_round_id().unwrap(), 2);
        assert_eq!(store.next_round_id().unwrap(), 3);
    }

    #[test]
    fn round_ids_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.db");
        {
            let store = ResultStore::open(&path).unwrap();
            store.next_round_id().unwrap();
            store.next_round_id().unwrap();
        }
        let store = ResultStore::open(&path).unwrap();
        assert_eq!(store.next_round_id().unwrap(), 3);
    }

    #[test]
    fn append_and_read_back_by_round() {
        let (_dir, store) = open_tmp();
        store
            .append(&[record(1, "team2", "web"), record(1, "team1", "web")])
            .unwrap();
        store.append(&[record(2, "team1", "web")]).unwrap();

        let r1 = store.round_records(1).unwrap();
        assert_eq!(r1.len(), 2);
        // key order, not insertion order
        assert_eq!(r1[0].key.team, "team1");
        assert_eq!(r1[1].key.team, "team2");
        assert_eq!(store.round_records(2).unwrap().len(), 1);
        assert!(store.round_records(3).unwrap().is_empty());
    }

    #[test]
    fn duplicate_key_is_rejected_and_batch_discarded() {
        let (_dir, store) = open_tmp();
        store.append(&[record(1, "team1", "db")]).unwrap();

        let err = store
            .append(&[record(1, "team1", "web"), record(1, "team1", "db")])
            .unwrap_err();
        assert!(matches!(err, ScoreError::DuplicateRecord { round_id: 1, .. }));

        // the whole batch rolled back
        let records = store.round_records(1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.service, "db");
    }

    #[test]
    fn duplicate_within_one_batch_is_rejected() {
        let (_dir, store) = open_tmp();
        let err = store
            .append(&[record(4, "t", "s"), record(4, "t", "s")])
            .unwrap_err();
        assert!(matches!(err, ScoreError::DuplicateRecord { .. }));
        assert!(store.round_records(4).unwrap().is_empty());
    }

    #[test]
    fn prefix_names_do_not_collide() {
        let (_dir, store) = open_tmp();
        // "ab" + "c" must differ from "a" + "bc"
        store
            .append(&[record(1, "ab", "c"), record(1, "a", "bc")])
            .unwrap();
        assert_eq!(store.round_records(1).unwrap().len(), 2);
    }

    #[test]
    fn summaries_and_latest_round() {
        let (_dir, store) = open_tmp();
        assert!(store.latest_round().unwrap().is_none());

        let mut first = RoundSummary::open(1, Utc::now());
        first.state = RoundState::Closed;
        store.save_round(&first).unwrap();

        let mut second = RoundSummary::open(2, Utc::now());
        second.state = RoundState::Failed;
        second.error = Some("inventory error: cannot read".into());
        store.save_round(&second).unwrap();

        let rounds = store.rounds().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].id, 1);

        let latest = store.latest_round().unwrap().unwrap();
        assert_eq!(latest.id, 2);
        assert_eq!(latest.state, RoundState::Failed);

        assert_eq!(store.round(1).unwrap().unwrap().state, RoundState::Closed);
        assert!(store.round(9).unwrap().is_none());
    }

    #[test]
    fn save_round_replaces_summary() {
        let (_dir, store) = open_tmp();
        let mut summary = RoundSummary::open(5, Utc::now());
        store.save_round(&summary).unwrap();
        summary.state = RoundState::Closing;
        store.save_round(&summary).unwrap();
        summary.state = RoundState::Closed;
        summary.closed_at = Some(Utc::now());
        store.save_round(&summary).unwrap();

        let rounds = store.rounds().unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].state, RoundState::Closed);
    }
}
