//! Round results: the record model and its redb-backed store.

pub mod db;
pub mod record;

pub use db::{ResultSink, ResultStore};
pub use record::{ResultRecord, RoundSummary};
