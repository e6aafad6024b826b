//! Scenario definitions and the runner that executes them.
//!
//! A [`Scenario`] is an ordered list of [`Step`]s over a fixed
//! [`Topology`]. Every step belongs to one [`Phase`]; a scenario whose step
//! order the state machine rejects is refused before anything is spawned.

mod builtin;
mod phase;
mod runner;
pub use builtin::*;
pub use phase::*;
pub use runner::*;


use std::collections::HashSet;

use crate::ConvergenceWindow;
use crate::ScenarioError;
use crate::Topology;

/// A node by its position in the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// The node spawned as leader
    Leader,
    /// Zero-based replica index
    Replica(usize),
}

impl NodeRef {
    /// Position in the cluster's node list
    pub fn index(self) -> usize {
        match self {
            NodeRef::Leader => 0,
            NodeRef::Replica(i) => i + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillTarget {
    Node(NodeRef),
    /// Uniformly chosen among live joined replicas other than the believed
    /// leader, so no particular election outcome is assumed
    RandomReplica,
    /// Whoever the last agreed `leader` answer named
    BelievedLeader,
}

/// Which nodes a verification queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryScope {
    BelievedLeader,
    /// Every running node that has joined
    LiveMembers,
    Node(NodeRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// All live members report the same running leader
    LeaderAgreement,
    /// `dropped` lists every terminated member and no live node
    FailureDetected { scope: QueryScope },
    /// `direct_get` returns every written value
    Replicated { scope: QueryScope },
    /// A late joiner returns every value written before it joined
    CaughtUp { node: NodeRef },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Spawn the leader and every replica of the topology
    Spawn,
    /// Admit a spawned replica through the believed leader
    Join(NodeRef),
    Converge(ConvergenceWindow),
    Kill(KillTarget),
    /// `put` each key with `value` through the believed leader
    Write { keys: Vec<String>, value: String },
    Verify(Expectation),
}

impl Step {
    pub fn phase(&self) -> Phase {
        match self {
            Step::Spawn => Phase::Setup,
            Step::Join(_) => Phase::Joining,
            Step::Converge(_) => Phase::Converging,
            Step::Kill(_) => Phase::FaultInjection,
            Step::Write { .. } | Step::Verify(_) => Phase::Verifying,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub topology: Topology,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        topology: Topology,
    ) -> Self {
        Self {
            name: name.into(),
            topology,
            steps: Vec::new(),
        }
    }

    pub fn step(
        mut self,
        step: Step,
    ) -> Self {
        self.steps.push(step);
        self
    }

    /// Checks the scenario without touching any process. Addresses must be
    /// unique and node references inside the topology; a node joins and is
    /// killed at most once; the state machine must accept the step order and
    /// replication is only checked after a write.
    pub fn validate(&self) -> std::result::Result<(), ScenarioError> {
        let mut seen = HashSet::new();
        for addrs in std::iter::once(&self.topology.leader).chain(&self.topology.replicas) {
            for addr in [addrs.client, addrs.control] {
                if !seen.insert(addr) {
                    return Err(ScenarioError::InvalidStep {
                        index: 0,
                        reason: format!("address {addr} used twice in topology"),
                    });
                }
            }
        }

        let nodes = self.topology.replicas.len() + 1;
        let check_ref = |index: usize, node: NodeRef| {
            if node.index() >= nodes {
                return Err(ScenarioError::InvalidStep {
                    index,
                    reason: format!("{node:?} outside a topology of {nodes} nodes"),
                });
            }
            Ok(())
        };

        let mut state = ScenarioState::new();
        let mut wrote = false;
        let mut joined = HashSet::new();
        let mut killed = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            state.enter(step.phase()).map_err(|e| ScenarioError::InvalidStep {
                index,
                reason: e.to_string(),
            })?;

            match step {
                Step::Join(node) => {
                    check_ref(index, *node)?;
                    if *node == NodeRef::Leader || !joined.insert(*node) {
                        return Err(ScenarioError::InvalidStep {
                            index,
                            reason: format!("{node:?} cannot join (again)"),
                        });
                    }
                }
                Step::Kill(KillTarget::Node(node)) => {
                    check_ref(index, *node)?;
                    if !killed.insert(*node) {
                        return Err(ScenarioError::InvalidStep {
                            index,
                            reason: format!("{node:?} already killed"),
                        });
                    }
                }
                Step::Write { keys, .. } => {
                    if keys.is_empty() {
                        return Err(ScenarioError::InvalidStep {
                            index,
                            reason: "write without keys".into(),
                        });
                    }
                    wrote = true;
                }
                Step::Verify(Expectation::Replicated { scope } | Expectation::FailureDetected { scope }) => {
                    if let QueryScope::Node(node) = scope {
                        check_ref(index, *node)?;
                    }
                    if matches!(step, Step::Verify(Expectation::Replicated { .. })) && !wrote {
                        return Err(ScenarioError::InvalidStep {
                            index,
                            reason: "replication checked before any write".into(),
                        });
                    }
                }
                Step::Verify(Expectation::CaughtUp { node }) => {
                    check_ref(index, *node)?;
                    if !wrote {
                        return Err(ScenarioError::InvalidStep {
                            index,
                            reason: "catch-up checked before any write".into(),
                        });
                    }
                }
                _ => {}
            }
        }

        if state.phase().is_none() {
            return Err(ScenarioError::InvalidStep {
                index: 0,
                reason: "scenario has no steps".into(),
            });
        }
        Ok(())
    }
}
