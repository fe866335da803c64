pub mod account;
pub mod checks;
pub mod config;
pub mod error;
pub mod inventory;
pub mod invocation;
pub mod io;
pub mod job;
pub mod paths;
pub mod registry;
pub mod results;
pub mod types;

pub use account::{Account, CredentialSnapshot, Credentials, FileCredentials, Secret};
pub use config::Config;
pub use error::{Result, ScoreError};
pub use inventory::{FileInventory, Inventory, InventoryEntry};
pub use invocation::Invocation;
pub use job::ProbeJob;
pub use registry::{CheckDescriptor, Properties, Registry};
pub use results::{ResultRecord, ResultSink, ResultStore, RoundSummary};
pub use types::{JobKey, ProbeOutcome, ProbeStatus, RoundState};
