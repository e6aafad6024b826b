use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Spawn and termination behaviour of the process manager
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProcessConfig {
    /// Refuse to spawn onto an address that already accepts connections
    #[serde(default = "default_true")]
    pub check_ports: bool,

    /// Probe both endpoints after spawn until they accept connections
    #[serde(default = "default_true")]
    pub wait_ready: bool,

    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,

    #[serde(default = "default_probe_interval")]
    pub probe_interval_ms: u64,

    /// How long to wait for a killed process to exit
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            check_ports: true,
            wait_ready: true,
            startup_timeout_ms: default_startup_timeout(),
            probe_interval_ms: default_probe_interval(),
            terminate_grace_ms: default_terminate_grace(),
        }
    }
}

impl ProcessConfig {
    pub fn validate(&self) -> Result<()> {
        // The interval also bounds each connect attempt
        if (self.wait_ready || self.check_ports) && self.probe_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "process.probe_interval_ms must be greater than 0".into(),
            ));
        }
        if self.wait_ready && self.startup_timeout_ms < self.probe_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "process.startup_timeout_ms ({}) shorter than probe interval ({})",
                self.startup_timeout_ms, self.probe_interval_ms
            )));
        }
        if self.terminate_grace_ms == 0 {
            return Err(Error::InvalidConfig(
                "process.terminate_grace_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_startup_timeout() -> u64 {
    10_000
}
fn default_probe_interval() -> u64 {
    100
}
fn default_terminate_grace() -> u64 {
    2000
}
