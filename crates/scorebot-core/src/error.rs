use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("not initialized: run 'scorebot init'")]
    NotInitialized,

    #[error("unknown check type: {0}")]
    UnknownCheckType(String),

    #[error("check type already registered: {0}")]
    DuplicateCheckType(String),

    #[error("missing required property '{0}'")]
    MissingProperty(String),

    #[error("check '{0}' requires an account but none was supplied")]
    MissingAccount(String),

    #[error("account '{username}' not found for {team}/{service}")]
    UnknownAccount {
        team: String,
        service: String,
        username: String,
    },

    #[error("invalid expect pattern '{pattern}': {reason}")]
    InvalidExpect { pattern: String, reason: String },

    #[error("invalid round transition from {from} to {to}")]
    InvalidRoundTransition { from: String, to: String },

    #[error("inventory error: {0}")]
    Inventory(String),

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("result database error: {0}")]
    ResultDb(String),

    #[error("result already recorded for round {round_id}: {key}")]
    DuplicateRecord { round_id: u64, key: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ScoreError {
    /// True for errors raised while turning an inventory entry into a job.
    ///
    /// These exclude the job from dispatch and are recorded as a
    /// `Misconfigured` outcome instead of failing the round.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScoreError::UnknownCheckType(_)
                | ScoreError::MissingProperty(_)
                | ScoreError::MissingAccount(_)
                | ScoreError::UnknownAccount { .. }
                | ScoreError::InvalidExpect { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScoreError>;
