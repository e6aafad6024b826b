//! Harness Error Hierarchy
//!
//! Failures are grouped by the layer that observed them: process lifecycle,
//! control protocol, assertion evaluation and scenario sequencing. Every
//! variant aborts the running scenario into teardown; none crosses the
//! process boundary except as an exit status and printed diagnostics.

use std::net::SocketAddr;
use std::time::Duration;

use config::ConfigError;

use crate::Phase;
use crate::Role;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A node process could not be started or never became ready
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// A control command could not be delivered or answered
    #[error(transparent)]
    Control(#[from] ControlError),

    /// A well-formed response did not satisfy the expected predicate
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// The scenario itself is malformed or referenced a missing node
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// Configuration sources could not be merged or deserialized
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values violate a validation rule
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failures that bounded polling may retry until its deadline.
    ///
    /// Protocol errors are never retryable: they signal a mismatch between
    /// the harness and the node, which waiting does not fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Control(ControlError::Connection { .. }) => true,
            Error::Control(ControlError::Timeout { .. }) => true,
            Error::Assertion(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to launch {role} via {program}: {source}")]
    Launch {
        role: Role,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Something is already listening where the node should bind
    #[error("Address {addr} is already in use")]
    AddressInUse { addr: SocketAddr },

    #[error("{role} node at {addr} exited during startup: {status}")]
    ExitedEarly {
        role: Role,
        addr: SocketAddr,
        status: String,
    },

    #[error("{role} node at {addr} not ready after {timeout:?}")]
    NotReady {
        role: Role,
        addr: SocketAddr,
        timeout: Duration,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Target unreachable: not listening yet, or dead
    #[error("Connection to {target} failed: {source}")]
    Connection {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("No response from {target} within {duration:?}")]
    Timeout {
        target: SocketAddr,
        duration: Duration,
    },

    /// Response received but not in any recognized shape
    #[error("Malformed response from {target}: {reason}")]
    Protocol { target: SocketAddr, reason: String },
}

/// Observed state that contradicts the expected predicate.
#[derive(Debug, thiserror::Error)]
#[error("{check} failed ({context}): expected {expected}, observed {observed}")]
pub struct AssertionFailure {
    pub check: &'static str,
    pub context: String,
    pub expected: String,
    pub observed: String,
}

impl AssertionFailure {
    pub(crate) fn new(
        check: &'static str,
        context: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
    ) -> Self {
        Self {
            check,
            context: context.into(),
            expected: expected.into(),
            observed: observed.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Invalid phase transition {from:?} -> {to:?}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    #[error("No node with index {0}")]
    UnknownNode(usize),

    #[error("Node {0} is not running")]
    NodeNotRunning(String),

    #[error("No believed leader; run a leader agreement check first")]
    NoLeader,

    #[error("No live replica left to kill")]
    NoKillCandidate,
}
