use serde::Deserialize;
use serde::Serialize;

use crate::CommandEndpoint;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Text line over a direct TCP connection
    #[default]
    Tcp,
    /// One run of the external ctl binary per command
    Ctl,
}

/// Control-plane client parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControlConfig {
    #[serde(default)]
    pub transport: TransportKind,

    /// Node endpoint that receives commands
    #[serde(default)]
    pub endpoint: CommandEndpoint,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Response read timeout in milliseconds (whole ctl run for `ctl`)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Upper bound on one response
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            endpoint: CommandEndpoint::default(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("control timeouts must be greater than 0".into()));
        }
        if self.max_response_bytes == 0 {
            return Err(Error::InvalidConfig(
                "control.max_response_bytes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    3000
}
fn default_max_response_bytes() -> usize {
    64 * 1024
}
