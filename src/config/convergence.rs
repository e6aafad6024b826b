use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConvergenceMode {
    /// Sleep the whole window, then query once
    Fixed,
    /// Probe leader agreement and retry queries until the window's deadline
    #[default]
    Poll,
}

/// The settling event a convergence step waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceWindow {
    /// Startup and membership joins
    Settle,
    /// Leader election after the leader died
    Election,
    /// A dead node showing up in the dropped list
    FailureDetection,
    /// Writes reaching every replica
    Replication,
}

/// Convergence windows, each sized above the cluster's expected worst-case
/// settling time for that event.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConvergenceConfig {
    #[serde(default)]
    pub mode: ConvergenceMode,

    #[serde(default = "default_settle")]
    pub settle_ms: u64,

    #[serde(default = "default_election")]
    pub election_ms: u64,

    /// Time between a node dying and its address appearing in `dropped`
    #[serde(default = "default_failure_detection")]
    pub failure_detection_ms: u64,

    #[serde(default = "default_replication")]
    pub replication_ms: u64,

    /// Pause between polling rounds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            mode: ConvergenceMode::default(),
            settle_ms: default_settle(),
            election_ms: default_election(),
            failure_detection_ms: default_failure_detection(),
            replication_ms: default_replication(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl ConvergenceConfig {
    pub fn window(
        &self,
        window: ConvergenceWindow,
    ) -> Duration {
        match window {
            ConvergenceWindow::Settle => Duration::from_millis(self.settle_ms),
            ConvergenceWindow::Election => Duration::from_millis(self.election_ms),
            ConvergenceWindow::FailureDetection => Duration::from_millis(self.failure_detection_ms),
            ConvergenceWindow::Replication => Duration::from_millis(self.replication_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == ConvergenceMode::Poll && self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "convergence.poll_interval_ms must be greater than 0 in poll mode".into(),
            ));
        }

        let windows = [
            ("settle_ms", self.settle_ms),
            ("election_ms", self.election_ms),
            ("failure_detection_ms", self.failure_detection_ms),
            ("replication_ms", self.replication_ms),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, ms)| *ms == 0) {
            return Err(Error::InvalidConfig(format!("convergence.{name} must be greater than 0")));
        }

        Ok(())
    }
}

fn default_settle() -> u64 {
    2000
}
fn default_election() -> u64 {
    5000
}
fn default_failure_detection() -> u64 {
    2000
}
fn default_replication() -> u64 {
    5000
}
fn default_poll_interval() -> u64 {
    200
}
