use scorebot_core::ScoreError;
use thiserror::Error;

/// A round-level failure. Probe failures never show up here: they are
/// outcomes, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("round {round_id} failed: cannot snapshot inventory: {source}")]
    Inventory {
        round_id: u64,
        #[source]
        source: ScoreError,
    },

    #[error("round {round_id} failed: cannot snapshot credentials: {source}")]
    Credentials {
        round_id: u64,
        #[source]
        source: ScoreError,
    },

    #[error("result persistence failed: {0}")]
    Persist(#[from] ScoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
