//! Round scheduling and result collection for scorebot.
//!
//! [`RoundScheduler`] owns the loop; [`ResultCollector`] is the single
//! point where concurrent probe tasks meet.

pub mod collector;
pub mod error;
pub mod scheduler;

pub use collector::{RecordDisposition, ResultCollector};
pub use error::{EngineError, Result};
pub use scheduler::{RoundReport, RoundScheduler, SchedulerConfig};
