//! Assertion primitives over control-protocol observations.
//!
//! Each check is a pure function of what was observed, returning the
//! [`AssertionFailure`] that explains the mismatch. Querying the nodes is
//! the runner's job; matching rules live in [`ControlResponse`].


use std::collections::BTreeSet;
use std::net::SocketAddr;

use crate::AssertionFailure;
use crate::ControlResponse;
use crate::OK_TOKEN;

pub const JOIN: &str = "join";
pub const WRITE: &str = "write";
pub const LEADER_AGREEMENT: &str = "leader agreement";
pub const FAILURE_DETECTION: &str = "failure detection";
pub const REPLICATION: &str = "replication completeness";
pub const CATCH_UP: &str = "catch-up replication";

/// `join` was answered with exactly the success token
pub fn join_accepted(
    joining: SocketAddr,
    response: &ControlResponse,
) -> Result<(), AssertionFailure> {
    if response.is_ok() {
        return Ok(());
    }
    Err(AssertionFailure::new(
        JOIN,
        format!("join {} via {}", joining, response.source()),
        OK_TOKEN,
        format!("{:?}", response.raw()),
    ))
}

/// `put` was answered with exactly the success token
pub fn write_accepted(
    key: &str,
    response: &ControlResponse,
) -> Result<(), AssertionFailure> {
    if response.is_ok() {
        return Ok(());
    }
    Err(AssertionFailure::new(
        WRITE,
        format!("put {} via {}", key, response.source()),
        OK_TOKEN,
        format!("{:?}", response.raw()),
    ))
}

/// Every queried node names the same leader, and that leader is neither a
/// terminated node nor unknown to the cluster.
///
/// `answers` pairs each queried address with the leader it reported.
pub fn leader_agreement(
    answers: &[(SocketAddr, SocketAddr)],
    terminated: &[SocketAddr],
    known: &[SocketAddr],
) -> Result<SocketAddr, AssertionFailure> {
    let Some(&(_, leader)) = answers.first() else {
        return Err(AssertionFailure::new(
            LEADER_AGREEMENT,
            "no live member to ask",
            "at least one answer",
            "none",
        ));
    };

    let distinct: BTreeSet<SocketAddr> = answers.iter().map(|(_, a)| *a).collect();
    if distinct.len() > 1 {
        let observed = answers
            .iter()
            .map(|(queried, answer)| format!("{queried} -> {answer}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(AssertionFailure::new(
            LEADER_AGREEMENT,
            format!("{} live members", answers.len()),
            "one leader address",
            observed,
        ));
    }

    if terminated.contains(&leader) {
        return Err(AssertionFailure::new(
            LEADER_AGREEMENT,
            format!("{} live members", answers.len()),
            "a leader that is still running",
            format!("terminated node {leader}"),
        ));
    }

    if !known.contains(&leader) {
        return Err(AssertionFailure::new(
            LEADER_AGREEMENT,
            format!("{} live members", answers.len()),
            "a leader from the cluster",
            format!("unknown address {leader}"),
        ));
    }

    Ok(leader)
}

/// The dropped list reported by `queried` contains every terminated member
/// and no node that is still alive.
pub fn failure_detected(
    queried: SocketAddr,
    dropped: &BTreeSet<SocketAddr>,
    terminated: &[SocketAddr],
    alive: &[SocketAddr],
) -> Result<(), AssertionFailure> {
    let missing: Vec<String> =
        terminated.iter().filter(|a| !dropped.contains(a)).map(|a| a.to_string()).collect();
    if !missing.is_empty() {
        return Err(AssertionFailure::new(
            FAILURE_DETECTION,
            format!("dropped on {queried}"),
            format!("list containing {}", missing.join(", ")),
            format!("{dropped:?}"),
        ));
    }

    let wrongly: Vec<String> =
        alive.iter().filter(|a| dropped.contains(a)).map(|a| a.to_string()).collect();
    if !wrongly.is_empty() {
        return Err(AssertionFailure::new(
            FAILURE_DETECTION,
            format!("dropped on {queried}"),
            "no live node in the list",
            format!("live {} reported dropped", wrongly.join(", ")),
        ));
    }

    Ok(())
}

/// `direct_get key` on the queried node returned `Value:\t<value>`.
pub fn replicated(
    check: &'static str,
    key: &str,
    value: &str,
    response: &ControlResponse,
) -> Result<(), AssertionFailure> {
    if response.has_value(value) {
        return Ok(());
    }
    Err(AssertionFailure::new(
        check,
        format!("direct_get {} on {}", key, response.source()),
        format!("Value:\\t{value}"),
        match response.value() {
            Some(stale) => format!("Value:\\t{stale}"),
            None => format!("{:?}", response.raw()),
        },
    ))
}
