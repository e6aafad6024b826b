use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::time::sleep;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Expectation;
use super::KillTarget;
use super::QueryScope;
use super::Scenario;
use super::ScenarioState;
use super::Step;
use crate::assertions;
use crate::async_task::retry_until_deadline;
use crate::AssertionFailure;
use crate::Cluster;
use crate::CommandEndpoint;
use crate::ControlClient;
use crate::ControlCommand;
use crate::ConvergenceConfig;
use crate::ConvergenceMode;
use crate::ConvergenceWindow;
use crate::LaunchSpec;
use crate::Node;
use crate::Phase;
use crate::ProcessManager;
use crate::Result;
use crate::Role;
use crate::ScenarioError;
use crate::ScenarioReport;

/// Mutable state of one scenario execution
#[derive(Default)]
struct Execution {
    cluster: Cluster,
    state: ScenarioState,
    /// End of the current convergence window; `None` means query once
    deadline: Option<Instant>,
    /// Every acknowledged write, replayed by replication checks
    written: BTreeMap<String, String>,
}

/// Drives a [`Scenario`] through its phases against real node processes.
///
/// Whatever happens during execution, every spawned node is terminated
/// before [`ScenarioRunner::run`] returns.
pub struct ScenarioRunner {
    manager: ProcessManager,
    client: Arc<dyn ControlClient>,
    endpoint: CommandEndpoint,
    convergence: ConvergenceConfig,
    rng: StdRng,
}

impl ScenarioRunner {
    /// `seed` drives every random choice the runner makes (kill targets).
    pub fn new(
        manager: ProcessManager,
        client: Arc<dyn ControlClient>,
        endpoint: CommandEndpoint,
        convergence: ConvergenceConfig,
        seed: u64,
    ) -> Self {
        Self {
            manager,
            client,
            endpoint,
            convergence,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub async fn run(
        &mut self,
        scenario: &Scenario,
    ) -> ScenarioReport {
        let started = Instant::now();
        let mut report = ScenarioReport::new(&scenario.name);

        if let Err(e) = scenario.validate() {
            report.abort(None, &e.into());
            // Nothing spawned, straight to the terminal phase
            let mut state = ScenarioState::new();
            if let Err(e) = state.enter(Phase::Teardown) {
                warn!("[{}] {}", scenario.name, e);
            }
            report.finish(state.visited(), Default::default(), started.elapsed());
            return report;
        }

        info!(
            "[{}] run {}: {} steps over {} nodes",
            scenario.name,
            report.run_id,
            scenario.steps.len(),
            scenario.topology.replicas.len() + 1
        );

        let mut exec = Execution::default();
        for (index, step) in scenario.steps.iter().enumerate() {
            debug!("[{}] step {}: {:?}", scenario.name, index, step);
            if let Err(e) = self.execute(scenario, step, &mut exec, &mut report).await {
                report.abort(exec.state.phase(), &e);
                break;
            }
        }

        if let Err(e) = exec.state.enter(Phase::Teardown) {
            warn!("[{}] {}", scenario.name, e);
        }
        let cluster = std::mem::take(&mut exec.cluster);
        let teardown = cluster.teardown(&self.manager).await;
        report.finish(exec.state.visited(), teardown, started.elapsed());
        report
    }

    async fn execute(
        &mut self,
        scenario: &Scenario,
        step: &Step,
        exec: &mut Execution,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        exec.state.enter(step.phase())?;

        match step {
            Step::Spawn => self.spawn_all(scenario, exec, report).await,
            Step::Join(node) => self.join(node.index(), exec, report).await,
            Step::Converge(window) => {
                self.converge(*window, exec).await;
                Ok(())
            }
            Step::Kill(target) => self.kill(*target, exec, report).await,
            Step::Write { keys, value } => self.write(keys, value, exec, report).await,
            Step::Verify(expectation) => self.verify(*expectation, exec, report).await,
        }
    }

    async fn spawn_all(
        &self,
        scenario: &Scenario,
        exec: &mut Execution,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let topology = &scenario.topology;

        let handle = self.manager.spawn(&LaunchSpec::leader(topology.leader)).await?;
        exec.cluster.add(Node::new("leader", Role::Leader, handle))?;

        for (i, addrs) in topology.replicas.iter().enumerate() {
            let spec = LaunchSpec::replica(*addrs, topology.leader.control);
            let handle = self.manager.spawn(&spec).await?;
            exec.cluster.add(Node::new(format!("kvs{}", i + 1), Role::Replica, handle))?;
        }

        if !self.manager.config().wait_ready {
            // No readiness probe: give the processes time to bind.
            sleep(self.convergence.window(ConvergenceWindow::Settle)).await;
        }

        report.event(format!("spawned {} nodes", exec.cluster.len()));
        Ok(())
    }

    async fn join(
        &self,
        index: usize,
        exec: &mut Execution,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let node = exec.cluster.node(index)?;
        if !node.is_running() {
            return Err(ScenarioError::NodeNotRunning(node.name.clone()).into());
        }
        let (name, joining) = (node.name.clone(), node.addrs.control);
        let target = self.endpoint.select(&exec.cluster.live_leader()?.addrs);

        let response = self.client.send(target, &ControlCommand::join(joining)).await?;
        assertions::join_accepted(joining, &response)?;

        exec.cluster.node_mut(index)?.joined = true;
        report.pass(assertions::JOIN, format!("{name} ({joining}) joined via {target}"));
        Ok(())
    }

    async fn converge(
        &self,
        window: ConvergenceWindow,
        exec: &mut Execution,
    ) {
        let duration = self.convergence.window(window);
        match self.convergence.mode {
            ConvergenceMode::Fixed => {
                debug!("converge: sleeping {:?} for {:?}", duration, window);
                sleep(duration).await;
                exec.deadline = None;
            }
            ConvergenceMode::Poll => {
                let deadline = Instant::now() + duration;
                self.probe_leader(&mut exec.cluster, deadline).await;
                exec.deadline = Some(deadline);
            }
        }
    }

    /// Polls `leader` on every live member until two consecutive rounds
    /// agree on the same leader, or `deadline` passes. An unsettled probe is
    /// not a failure; the following verification decides.
    async fn probe_leader(
        &self,
        cluster: &mut Cluster,
        deadline: Instant,
    ) {
        let interval = self.convergence.poll_interval();
        let mut previous: Option<SocketAddr> = None;
        loop {
            match self.agreed_leader(cluster).await {
                Ok(leader) if previous == Some(leader) => {
                    if let Some(index) = cluster.find_by_control(leader) {
                        cluster.set_leader(index);
                    }
                    debug!("converge: leader {} stable", leader);
                    return;
                }
                Ok(leader) => previous = Some(leader),
                Err(e) => {
                    debug!("converge: not settled yet: {}", e);
                    previous = None;
                }
            }
            if Instant::now() + interval > deadline {
                info!("converge: window ended before leader answers settled");
                return;
            }
            sleep(interval).await;
        }
    }

    async fn kill(
        &mut self,
        target: KillTarget,
        exec: &mut Execution,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let cluster = &mut exec.cluster;
        let index = match target {
            KillTarget::Node(node) => node.index(),
            KillTarget::BelievedLeader => cluster.leader().ok_or(ScenarioError::NoLeader)?,
            KillTarget::RandomReplica => {
                let leader = cluster.leader();
                let candidates: Vec<usize> =
                    cluster.live_members().map(|(i, _)| i).filter(|i| Some(*i) != leader).collect();
                *candidates.choose(&mut self.rng).ok_or(ScenarioError::NoKillCandidate)?
            }
        };

        let name = cluster.node(index)?.name.clone();
        let outcome = cluster.terminate(index, &self.manager).await?;
        report.event(format!("killed {name} ({outcome:?})"));
        Ok(())
    }

    async fn write(
        &self,
        keys: &[String],
        value: &str,
        exec: &mut Execution,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let target = self.endpoint.select(&exec.cluster.live_leader()?.addrs);
        let interval = self.convergence.poll_interval();

        for key in keys {
            retry_until_deadline("put", exec.deadline, interval, move || self.put(target, key, value)).await?;
            exec.written.insert(key.clone(), value.to_string());
        }

        report.pass(assertions::WRITE, format!("{} keys written via {}", keys.len(), target));
        Ok(())
    }

    async fn verify(
        &self,
        expectation: Expectation,
        exec: &mut Execution,
        report: &mut ScenarioReport,
    ) -> Result<()> {
        let interval = self.convergence.poll_interval();
        let deadline = exec.deadline;

        match expectation {
            Expectation::LeaderAgreement => {
                let cluster = &exec.cluster;
                let leader =
                    retry_until_deadline("leader agreement", deadline, interval, move || self.agreed_leader(cluster))
                        .await?;
                let members = cluster.live_members().count();
                if let Some(index) = exec.cluster.find_by_control(leader) {
                    exec.cluster.set_leader(index);
                }
                report.pass(assertions::LEADER_AGREEMENT, format!("{members} live members agree on {leader}"));
            }
            Expectation::FailureDetected { scope } => {
                let cluster = &exec.cluster;
                let terminated = cluster.terminated_members();
                let alive: Vec<SocketAddr> =
                    cluster.nodes().iter().filter(|n| n.is_running()).map(|n| n.addrs.control).collect();
                let (terminated_ref, alive_ref) = (&terminated[..], &alive[..]);
                for target in self.targets(cluster, scope)? {
                    retry_until_deadline("dropped", deadline, interval, move || {
                        self.check_dropped(target, terminated_ref, alive_ref)
                    })
                    .await?;
                }
                report.pass(
                    assertions::FAILURE_DETECTION,
                    format!("{} terminated members reported dropped", terminated.len()),
                );
            }
            Expectation::Replicated { scope } => {
                let targets = self.targets(&exec.cluster, scope)?;
                self.check_written(assertions::REPLICATION, &targets, exec).await?;
                report.pass(
                    assertions::REPLICATION,
                    format!("{} keys on {} nodes", exec.written.len(), targets.len()),
                );
            }
            Expectation::CaughtUp { node } => {
                let targets = self.targets(&exec.cluster, QueryScope::Node(node))?;
                self.check_written(assertions::CATCH_UP, &targets, exec).await?;
                report.pass(
                    assertions::CATCH_UP,
                    format!("{} keys on late joiner {}", exec.written.len(), targets[0]),
                );
            }
        }
        Ok(())
    }

    /// Command targets of the nodes `scope` names; every one must be running.
    fn targets(
        &self,
        cluster: &Cluster,
        scope: QueryScope,
    ) -> Result<Vec<SocketAddr>> {
        let targets = match scope {
            QueryScope::BelievedLeader => vec![self.endpoint.select(&cluster.live_leader()?.addrs)],
            QueryScope::LiveMembers => cluster.live_members().map(|(_, n)| self.endpoint.select(&n.addrs)).collect(),
            QueryScope::Node(node) => {
                let node = cluster.node(node.index())?;
                if !node.is_running() {
                    return Err(ScenarioError::NodeNotRunning(node.name.clone()).into());
                }
                vec![self.endpoint.select(&node.addrs)]
            }
        };
        Ok(targets)
    }

    async fn check_written(
        &self,
        check: &'static str,
        targets: &[SocketAddr],
        exec: &Execution,
    ) -> Result<()> {
        let interval = self.convergence.poll_interval();
        for &target in targets {
            for (key, value) in &exec.written {
                retry_until_deadline("direct_get", exec.deadline, interval, move || {
                    self.check_value(check, target, key, value)
                })
                .await?;
            }
        }
        Ok(())
    }

    async fn put(
        &self,
        target: SocketAddr,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let response = self.client.send(target, &ControlCommand::put(key, value)).await?;
        assertions::write_accepted(key, &response)?;
        Ok(())
    }

    /// Asks every live member for its leader and checks they agree.
    ///
    /// An answer without any address counts as disagreement rather than a
    /// protocol error, since nodes may say so while an election runs.
    async fn agreed_leader(
        &self,
        cluster: &Cluster,
    ) -> Result<SocketAddr> {
        let mut answers = Vec::new();
        for (_, node) in cluster.live_members() {
            let target = self.endpoint.select(&node.addrs);
            let response = self.client.send(target, &ControlCommand::leader()).await?;
            let leader = response.leader_address().map_err(|e| {
                AssertionFailure::new(
                    assertions::LEADER_AGREEMENT,
                    format!("leader on {target}"),
                    "a leader address",
                    e.to_string(),
                )
            })?;
            answers.push((node.addrs.control, leader));
        }

        let known: Vec<SocketAddr> = cluster.nodes().iter().map(|n| n.addrs.control).collect();
        Ok(assertions::leader_agreement(&answers, &cluster.terminated(), &known)?)
    }

    async fn check_dropped(
        &self,
        target: SocketAddr,
        terminated: &[SocketAddr],
        alive: &[SocketAddr],
    ) -> Result<()> {
        let response = self.client.send(target, &ControlCommand::dropped()).await?;
        assertions::failure_detected(target, &response.addresses(), terminated, alive)?;
        Ok(())
    }

    async fn check_value(
        &self,
        check: &'static str,
        target: SocketAddr,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let response = self.client.send(target, &ControlCommand::direct_get(key)).await?;
        assertions::replicated(check, key, value, &response)?;
        Ok(())
    }
}
