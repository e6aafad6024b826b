//! In-process stand-in for the cluster under test.
//!
//! Every simulated node binds real TCP listeners on its client and control
//! addresses and speaks the text control protocol, so the harness drives it
//! exactly as it would drive real binaries. Killing a node aborts its
//! listener tasks, which closes its ports.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use kvs_harness::ConvergenceConfig;
use kvs_harness::ConvergenceMode;
use kvs_harness::LaunchSpec;
use kvs_harness::NodeAddrs;
use kvs_harness::NodeLauncher;
use kvs_harness::NodeProcess;
use kvs_harness::ProcessConfig;
use kvs_harness::Role;
use kvs_harness::Topology;
use parking_lot::Mutex;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
struct SimNode {
    alive: bool,
    store: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct SimState {
    nodes: BTreeMap<SocketAddr, SimNode>,
    members: BTreeSet<SocketAddr>,
    leader: Option<SocketAddr>,
}

impl SimState {
    fn is_alive(
        &self,
        control: SocketAddr,
    ) -> bool {
        self.nodes.get(&control).is_some_and(|n| n.alive)
    }

    /// The current leader, electing the lowest live member when it died.
    fn leader(&mut self) -> Option<SocketAddr> {
        if let Some(leader) = self.leader.filter(|l| self.is_alive(*l)) {
            return Some(leader);
        }
        let next = self.members.iter().copied().find(|m| self.is_alive(*m));
        self.leader = next;
        next
    }

    fn handle(
        &mut self,
        me: SocketAddr,
        line: &str,
    ) -> String {
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "join" => {
                let Ok(joining) = arg.parse::<SocketAddr>() else {
                    return "ERROR bad address".into();
                };
                if self.leader() != Some(me) {
                    return "ERROR not leader".into();
                }
                let snapshot = self.nodes.get(&me).map(|n| n.store.clone()).unwrap_or_default();
                if let Some(node) = self.nodes.get_mut(&joining) {
                    node.store = snapshot;
                }
                self.members.insert(joining);
                "OK".into()
            }
            "leader" => match self.leader() {
                Some(leader) => format!("{leader}\n"),
                None => "no leader\n".into(),
            },
            "dropped" => {
                let dead: Vec<String> = self
                    .members
                    .iter()
                    .filter(|m| !self.is_alive(**m))
                    .map(|m| m.to_string())
                    .collect();
                format!("[{}]\n", dead.join(", "))
            }
            "put" => {
                let Some((key, value)) = arg.split_once(' ') else {
                    return "ERROR usage: put <key> <value>".into();
                };
                if self.leader() != Some(me) {
                    return "ERROR not leader".into();
                }
                for member in self.members.clone() {
                    if let Some(node) = self.nodes.get_mut(&member).filter(|n| n.alive) {
                        node.store.insert(key.to_string(), value.to_string());
                    }
                }
                "OK".into()
            }
            "direct_get" => match self.nodes.get(&me).and_then(|n| n.store.get(arg)) {
                Some(value) => format!("Value:\t{value}\n"),
                None => "Key not found\n".into(),
            },
            _ => format!("ERROR unknown command {verb}"),
        }
    }
}

/// Launches simulated nodes that share one cluster state.
#[derive(Clone, Default)]
pub struct SimLauncher {
    state: Arc<Mutex<SimState>>,
}

impl SimLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> usize {
        self.state.lock().nodes.values().filter(|n| n.alive).count()
    }
}

async fn serve(
    listener: TcpListener,
    me: SocketAddr,
    state: Arc<Mutex<SimState>>,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = answer(stream, me, state).await {
                debug!("sim {}: {}", me, e);
            }
        });
    }
}

async fn answer(
    stream: TcpStream,
    me: SocketAddr,
    state: Arc<Mutex<SimState>>,
) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut line = String::new();
    // Readiness probes connect and close without a command
    if BufReader::new(read).read_line(&mut line).await? == 0 {
        return Ok(());
    }
    let response = state.lock().handle(me, line.trim());
    write.write_all(response.as_bytes()).await?;
    write.shutdown().await
}

#[async_trait]
impl NodeLauncher for SimLauncher {
    async fn launch(
        &self,
        spec: &LaunchSpec,
    ) -> io::Result<Box<dyn NodeProcess>> {
        let client = TcpListener::bind(spec.addrs.client).await?;
        let control = TcpListener::bind(spec.addrs.control).await?;
        let me = spec.addrs.control;

        {
            let mut state = self.state.lock();
            state.nodes.insert(
                me,
                SimNode {
                    alive: true,
                    ..Default::default()
                },
            );
            if spec.role == Role::Leader {
                state.members.insert(me);
                state.leader = Some(me);
            }
        }

        let tasks = vec![
            tokio::spawn(serve(client, me, self.state.clone())),
            tokio::spawn(serve(control, me, self.state.clone())),
        ];
        Ok(Box::new(SimProcess {
            control: me,
            state: self.state.clone(),
            tasks,
        }))
    }

    fn program(
        &self,
        role: Role,
    ) -> String {
        format!("sim-{role}")
    }
}

pub struct SimProcess {
    control: SocketAddr,
    state: Arc<Mutex<SimState>>,
    tasks: Vec<JoinHandle<()>>,
}

#[async_trait]
impl NodeProcess for SimProcess {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn exit_status(&mut self) -> io::Result<Option<String>> {
        let alive = self.state.lock().is_alive(self.control);
        Ok((!alive).then(|| "signal: 9 (SIGKILL)".to_string()))
    }

    fn start_kill(&mut self) -> io::Result<()> {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(node) = self.state.lock().nodes.get_mut(&self.control) {
            node.alive = false;
        }
        Ok(())
    }

    async fn wait_exit(&mut self) -> io::Result<()> {
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        Ok(())
    }
}

pub async fn get_available_ports(count: usize) -> Vec<u16> {
    use std::net::TcpListener;
    let mut ports = Vec::new();
    let mut listeners = Vec::new();

    // Keep every listener until all ports are picked so none repeats
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        ports.push(listener.local_addr().unwrap().port());
        listeners.push(listener);
    }
    ports
}

/// A leader plus `replicas` replicas on free local ports
pub async fn free_topology(replicas: usize) -> Topology {
    let ports = get_available_ports(2 * (replicas + 1)).await;
    let mut nodes = ports.chunks(2).map(|pair| {
        NodeAddrs::new(
            SocketAddr::from(([127, 0, 0, 1], pair[0])),
            SocketAddr::from(([127, 0, 0, 1], pair[1])),
        )
    });
    let leader = nodes.next().unwrap();
    Topology {
        leader,
        replicas: nodes.collect(),
    }
}

pub fn fast_convergence(mode: ConvergenceMode) -> ConvergenceConfig {
    ConvergenceConfig {
        mode,
        settle_ms: 100,
        election_ms: 300,
        failure_detection_ms: 200,
        replication_ms: 300,
        poll_interval_ms: 20,
    }
}

pub fn fast_process() -> ProcessConfig {
    ProcessConfig {
        startup_timeout_ms: 2000,
        probe_interval_ms: 20,
        terminate_grace_ms: 500,
        ..Default::default()
    }
}
