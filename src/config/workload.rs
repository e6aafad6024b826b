use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Data written through the leader by the replication scenario
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkloadConfig {
    /// Number of distinct keys, named `1..=keys`
    #[serde(default = "default_keys")]
    pub keys: usize,

    #[serde(default = "default_value")]
    pub value: String,

    /// Seed for key order and random kill selection; drawn at random if unset
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            value: default_value(),
            seed: None,
        }
    }
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keys == 0 {
            return Err(Error::InvalidConfig("workload.keys must be at least 1".into()));
        }
        if self.value.is_empty() || self.value.contains(char::is_whitespace) {
            return Err(Error::InvalidConfig(
                "workload.value must be a non-empty token without whitespace".into(),
            ));
        }
        Ok(())
    }
}

fn default_keys() -> usize {
    20
}
fn default_value() -> String {
    "2".to_string()
}
