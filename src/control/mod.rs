//! Control-plane client for the cluster under test.
//!
//! The control protocol is single-shot: one command per connection, one
//! textual response, then close. No retries happen at this layer since a
//! failed command against a dead node is often exactly what a scenario
//! expects to observe.

mod ctl;
mod response;
mod tcp;
pub use ctl::*;
pub use response::*;
pub use tcp::*;


use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::BinariesConfig;
use crate::ControlConfig;
use crate::ControlError;
use crate::TransportKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Join,
    Dropped,
    Leader,
    Put,
    DirectGet,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Join => "join",
            Verb::Dropped => "dropped",
            Verb::Leader => "leader",
            Verb::Put => "put",
            Verb::DirectGet => "direct_get",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verb plus at most one string argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub verb: Verb,
    pub argument: Option<String>,
}

impl ControlCommand {
    pub fn join(control: SocketAddr) -> Self {
        Self {
            verb: Verb::Join,
            argument: Some(control.to_string()),
        }
    }

    pub fn dropped() -> Self {
        Self {
            verb: Verb::Dropped,
            argument: None,
        }
    }

    pub fn leader() -> Self {
        Self {
            verb: Verb::Leader,
            argument: None,
        }
    }

    pub fn put(
        key: &str,
        value: &str,
    ) -> Self {
        Self {
            verb: Verb::Put,
            argument: Some(format!("{key} {value}")),
        }
    }

    pub fn direct_get(key: &str) -> Self {
        Self {
            verb: Verb::DirectGet,
            argument: Some(key.to_string()),
        }
    }

    /// Wire form without the trailing newline
    pub fn line(&self) -> String {
        match &self.argument {
            Some(arg) => format!("{} {}", self.verb, arg),
            None => self.verb.to_string(),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.line())
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlClient: Send + Sync + 'static {
    /// Sends one command to `target` and returns its raw response.
    ///
    /// # Errors
    /// - [`ControlError::Connection`] if `target` is unreachable
    /// - [`ControlError::Timeout`] if no response arrives in time
    /// - [`ControlError::Protocol`] if the response is empty or not text
    async fn send(
        &self,
        target: SocketAddr,
        command: &ControlCommand,
    ) -> std::result::Result<ControlResponse, ControlError>;
}

/// Builds the configured transport.
pub fn control_client(
    control: &ControlConfig,
    binaries: &BinariesConfig,
) -> Arc<dyn ControlClient> {
    match control.transport {
        TransportKind::Tcp => Arc::new(TcpControlClient::new(control)),
        TransportKind::Ctl => Arc::new(CtlControlClient::new(&binaries.ctl, control)),
    }
}
