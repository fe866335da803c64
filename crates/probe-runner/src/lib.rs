//! `probe-runner`: runs scorebot probe invocations as subprocesses.
//!
//! ```text
//! Invocation ──► Executor::run ──► tokio::process::Command
//!                    │                 own process group, kill_on_drop
//!                    │                 stdout+stderr → TailBuffer
//!                    ▼
//!               ProbeOutcome   Success | Failure | Timeout | BuildError
//! ```
//!
//! The executor never returns an error: launch failures become `BuildError`
//! outcomes and a timeout kills the whole process group before reporting
//! `Timeout`.

pub mod error;
pub mod executor;

mod output;


pub use error::ProbeError;
pub use executor::{Executor, DEFAULT_MAX_OUTPUT_BYTES};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ProbeError>;
