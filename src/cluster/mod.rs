//! In-memory model of the cluster under test.
//!
//! The [`Cluster`] owns every spawned [`Node`] and, through each node, its
//! process handle. The leader reference is a lookup into the node list,
//! refreshed from the latest agreed `leader` answer, and may be stale while
//! an election is in progress.


use std::fmt;
use std::net::SocketAddr;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::ProcessHandle;
use crate::ProcessManager;
use crate::ScenarioError;
use crate::TerminateOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Leader,
    Replica,
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Replica => write!(f, "replica"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    Terminated,
}

/// Client-facing and control-plane endpoints of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddrs {
    pub client: SocketAddr,
    pub control: SocketAddr,
}

impl NodeAddrs {
    pub fn new(
        client: SocketAddr,
        control: SocketAddr,
    ) -> Self {
        Self { client, control }
    }
}

/// Which endpoint of a node receives control commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandEndpoint {
    #[default]
    Control,
    Client,
}

impl CommandEndpoint {
    pub fn select(
        &self,
        addrs: &NodeAddrs,
    ) -> SocketAddr {
        match self {
            CommandEndpoint::Control => addrs.control,
            CommandEndpoint::Client => addrs.client,
        }
    }
}

pub struct Node {
    pub name: String,
    pub addrs: NodeAddrs,
    pub role: Role,
    pub liveness: Liveness,
    /// Admitted into the cluster (the initial leader always is)
    pub joined: bool,
    handle: Option<ProcessHandle>,
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("addrs", &self.addrs)
            .field("role", &self.role)
            .field("liveness", &self.liveness)
            .field("joined", &self.joined)
            .finish()
    }
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        role: Role,
        handle: ProcessHandle,
    ) -> Self {
        Self {
            name: name.into(),
            addrs: handle.addrs(),
            role,
            liveness: Liveness::Running,
            joined: role == Role::Leader,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.liveness == Liveness::Running
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.pid())
    }
}

/// Tally of the release pass run at teardown
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownSummary {
    pub terminated: usize,
    pub already_gone: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Cluster {
    nodes: Vec<Node>,
    leader: Option<usize>,
}

impl Cluster {
    /// Adds a node, rejecting any address already used by another node.
    pub fn add(
        &mut self,
        node: Node,
    ) -> std::result::Result<usize, ScenarioError> {
        let candidate = [node.addrs.client, node.addrs.control];
        if candidate[0] == candidate[1] {
            return Err(ScenarioError::InvalidStep {
                index: self.nodes.len(),
                reason: format!("{} uses {} for both endpoints", node.name, candidate[0]),
            });
        }
        if let Some(clash) = self.nodes.iter().find(|n| {
            candidate.contains(&n.addrs.client) || candidate.contains(&n.addrs.control)
        }) {
            return Err(ScenarioError::InvalidStep {
                index: self.nodes.len(),
                reason: format!("{} shares an address with {}", node.name, clash.name),
            });
        }

        let index = self.nodes.len();
        if node.role == Role::Leader {
            self.set_leader(index);
        }
        debug!("cluster: added {} at {:?}", node.name, node.addrs);
        self.nodes.push(node);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(
        &self,
        index: usize,
    ) -> std::result::Result<&Node, ScenarioError> {
        self.nodes.get(index).ok_or(ScenarioError::UnknownNode(index))
    }

    pub fn node_mut(
        &mut self,
        index: usize,
    ) -> std::result::Result<&mut Node, ScenarioError> {
        self.nodes.get_mut(index).ok_or(ScenarioError::UnknownNode(index))
    }

    /// Index of the node currently believed to lead
    pub fn leader(&self) -> Option<usize> {
        self.leader
    }

    /// Running leader or [`ScenarioError::NoLeader`]
    pub fn live_leader(&self) -> std::result::Result<&Node, ScenarioError> {
        self.leader
            .map(|i| &self.nodes[i])
            .filter(|n| n.is_running())
            .ok_or(ScenarioError::NoLeader)
    }

    /// Running nodes that have been admitted into the cluster
    pub fn live_members(&self) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes.iter().enumerate().filter(|(_, n)| n.is_running() && n.joined)
    }

    /// Control addresses of every terminated node that had joined
    pub fn terminated_members(&self) -> Vec<SocketAddr> {
        self.nodes
            .iter()
            .filter(|n| !n.is_running() && n.joined)
            .map(|n| n.addrs.control)
            .collect()
    }

    /// Control addresses of every terminated node, joined or not
    pub fn terminated(&self) -> Vec<SocketAddr> {
        self.nodes.iter().filter(|n| !n.is_running()).map(|n| n.addrs.control).collect()
    }

    pub fn find_by_control(
        &self,
        addr: SocketAddr,
    ) -> Option<usize> {
        self.nodes.iter().position(|n| n.addrs.control == addr)
    }

    /// Records `index` as the believed leader; every other node that was
    /// marked leader is demoted so at most one carries the role.
    pub fn set_leader(
        &mut self,
        index: usize,
    ) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if i != index && node.role == Role::Leader {
                node.role = Role::Replica;
            }
        }
        if let Some(node) = self.nodes.get_mut(index) {
            node.role = Role::Leader;
        }
        if self.leader != Some(index) {
            info!("cluster: believed leader is now node #{}", index);
        }
        self.leader = Some(index);
    }

    /// Kills one node through `manager`. The node stays in the list as
    /// terminated so later checks can reason about it.
    pub async fn terminate(
        &mut self,
        index: usize,
        manager: &ProcessManager,
    ) -> std::result::Result<TerminateOutcome, ScenarioError> {
        let node = self.nodes.get_mut(index).ok_or(ScenarioError::UnknownNode(index))?;
        if !node.is_running() {
            return Err(ScenarioError::NodeNotRunning(node.name.clone()));
        }

        let outcome = match node.handle.as_mut() {
            Some(handle) => manager.terminate(handle).await,
            None => TerminateOutcome::AlreadyReleased,
        };
        node.handle = None;
        node.liveness = Liveness::Terminated;
        if node.role == Role::Leader {
            node.role = Role::Unknown;
        }
        if self.leader == Some(index) {
            self.leader = None;
        }
        info!("cluster: node {} terminated ({:?})", node.name, outcome);
        Ok(outcome)
    }

    /// Terminates every node that is still running and releases all handles.
    ///
    /// Consumes the cluster, so it runs at most once per scenario.
    pub async fn teardown(
        mut self,
        manager: &ProcessManager,
    ) -> TeardownSummary {
        let mut summary = TeardownSummary::default();
        for node in self.nodes.iter_mut() {
            let Some(mut handle) = node.handle.take() else {
                continue;
            };
            match manager.terminate(&mut handle).await {
                TerminateOutcome::Killed => summary.terminated += 1,
                TerminateOutcome::AlreadyExited | TerminateOutcome::AlreadyReleased => {
                    summary.already_gone += 1;
                    summary.warnings.push(format!("{} had already exited", node.name));
                }
                TerminateOutcome::GraceExpired => {
                    summary.terminated += 1;
                    let msg = format!("{} did not exit within the grace period", node.name);
                    warn!("teardown: {}", msg);
                    summary.warnings.push(msg);
                }
            }
            node.liveness = Liveness::Terminated;
        }
        self.leader = None;
        info!(
            "teardown: {} terminated, {} already gone",
            summary.terminated, summary.already_gone
        );
        summary
    }
}
