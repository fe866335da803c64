use thiserror::Error;

/// Why a probe could not be launched. Every variant ends up as a
/// `BuildError` outcome; none of them escape the executor.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("program '{program}' not found: {source}")]
    ProgramNotFound {
        program: String,
        #[source]
        source: which::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} not captured")]
    Pipe(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
