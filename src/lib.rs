//! Black-box test harness for leader-based replicated key-value clusters.
//!
//! The harness spawns a leader and a set of replicas as separate
//! processes, drives them through the line-oriented control protocol
//! (`join`, `dropped`, `leader`, `put`, `direct_get`), injects crash
//! faults, and checks leader election, failure detection and replication.
//!
//! ```text
//! Scenario --> ScenarioRunner --+--> ProcessManager --> NodeLauncher
//!                               +--> ControlClient (tcp | ctl)
//!                               +--> Cluster model --> assertions
//!                               +--> ScenarioReport
//! ```

pub mod assertions;
mod cluster;
mod config;
mod control;
mod errors;
mod process;
mod report;
mod scenario;
pub mod utils;

pub use cluster::*;
pub use config::*;
pub use control::*;
pub use errors::*;
pub use process::*;
pub use report::*;
pub use scenario::*;
pub use utils::*;

#[cfg(test)]
pub(crate) mod test_utils;
