use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use super::Expectation;
use super::KillTarget;
use super::NodeRef;
use super::QueryScope;
use super::Scenario;
use super::Step;
use crate::ConvergenceWindow;
use crate::Result;
use crate::Topology;
use crate::WorkloadConfig;

/// Replicas needed by the largest built-in scenario
pub const MAX_REPLICAS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    FailureDetection,
    LeaderElection,
    Replication,
}

impl ScenarioKind {
    pub fn all() -> [ScenarioKind; 3] {
        [
            ScenarioKind::FailureDetection,
            ScenarioKind::LeaderElection,
            ScenarioKind::Replication,
        ]
    }

    /// Builds the scenario over the first nodes of `base`.
    pub fn build(
        self,
        base: &Topology,
        workload: &WorkloadConfig,
        rng: &mut impl Rng,
    ) -> Result<Scenario> {
        match self {
            ScenarioKind::FailureDetection => failure_detection(base),
            ScenarioKind::LeaderElection => leader_election(base),
            ScenarioKind::Replication => replication(base, workload, rng),
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ScenarioKind::FailureDetection => write!(f, "failure-detection"),
            ScenarioKind::LeaderElection => write!(f, "leader-election"),
            ScenarioKind::Replication => write!(f, "replication"),
        }
    }
}

/// Leader + 2 replicas. Kill one replica at random, expect it in the
/// leader's dropped list; kill the other, expect both.
pub fn failure_detection(base: &Topology) -> Result<Scenario> {
    let dropped_on_leader = Step::Verify(Expectation::FailureDetected {
        scope: QueryScope::BelievedLeader,
    });
    Ok(Scenario::new(ScenarioKind::FailureDetection.to_string(), base.with_replicas(2)?)
        .step(Step::Spawn)
        .step(Step::Join(NodeRef::Replica(0)))
        .step(Step::Join(NodeRef::Replica(1)))
        .step(Step::Converge(ConvergenceWindow::Settle))
        .step(Step::Kill(KillTarget::RandomReplica))
        .step(Step::Converge(ConvergenceWindow::FailureDetection))
        .step(dropped_on_leader.clone())
        .step(Step::Kill(KillTarget::RandomReplica))
        .step(Step::Converge(ConvergenceWindow::FailureDetection))
        .step(dropped_on_leader))
}

/// Leader + 4 replicas. Kill the leader, expect the survivors to agree on a
/// new one; kill that one too and expect agreement on a third.
pub fn leader_election(base: &Topology) -> Result<Scenario> {
    let mut scenario =
        Scenario::new(ScenarioKind::LeaderElection.to_string(), base.with_replicas(4)?)
            .step(Step::Spawn);
    for i in 0..4 {
        scenario = scenario.step(Step::Join(NodeRef::Replica(i)));
    }
    Ok(scenario
        .step(Step::Converge(ConvergenceWindow::Settle))
        .step(Step::Kill(KillTarget::Node(NodeRef::Leader)))
        .step(Step::Converge(ConvergenceWindow::Election))
        .step(Step::Verify(Expectation::LeaderAgreement))
        .step(Step::Kill(KillTarget::BelievedLeader))
        .step(Step::Converge(ConvergenceWindow::Election))
        .step(Step::Verify(Expectation::LeaderAgreement)))
}

/// Leader + 3 replicas, the third joining late. Writes go through the
/// leader; every member must serve them, and the late joiner must catch up.
pub fn replication(
    base: &Topology,
    workload: &WorkloadConfig,
    rng: &mut impl Rng,
) -> Result<Scenario> {
    let mut keys: Vec<String> = (1..=workload.keys).map(|k| k.to_string()).collect();
    keys.shuffle(rng);

    Ok(Scenario::new(ScenarioKind::Replication.to_string(), base.with_replicas(3)?)
        .step(Step::Spawn)
        .step(Step::Join(NodeRef::Replica(0)))
        .step(Step::Join(NodeRef::Replica(1)))
        .step(Step::Converge(ConvergenceWindow::Settle))
        .step(Step::Write {
            keys,
            value: workload.value.clone(),
        })
        .step(Step::Converge(ConvergenceWindow::Replication))
        .step(Step::Verify(Expectation::Replicated {
            scope: QueryScope::LiveMembers,
        }))
        .step(Step::Join(NodeRef::Replica(2)))
        .step(Step::Converge(ConvergenceWindow::Replication))
        .step(Step::Verify(Expectation::CaughtUp {
            node: NodeRef::Replica(2),
        })))
}
