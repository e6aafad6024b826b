//! Node process lifecycle: launch, readiness, forced termination.
//!
//! Launching is behind the [`NodeLauncher`] seam so the runner does not care
//! whether a node is an OS process or something else that can be killed.
//! Termination never fails the harness: problems surface as a
//! [`TerminateOutcome`] and a warning.

mod command_launcher;
pub use command_launcher::*;


use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::net::is_server_ready;
use crate::NodeAddrs;
use crate::ProcessConfig;
use crate::Role;
use crate::SpawnError;

/// Everything a launcher needs to start one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchSpec {
    pub role: Role,
    pub addrs: NodeAddrs,
    /// Leader control address a replica is started against
    pub leader_control: Option<SocketAddr>,
}

impl LaunchSpec {
    pub fn leader(addrs: NodeAddrs) -> Self {
        Self {
            role: Role::Leader,
            addrs,
            leader_control: None,
        }
    }

    pub fn replica(
        addrs: NodeAddrs,
        leader_control: SocketAddr,
    ) -> Self {
        Self {
            role: Role::Replica,
            addrs,
            leader_control: Some(leader_control),
        }
    }
}

/// A running node that can be killed and reaped
#[async_trait]
pub trait NodeProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// `Some(status)` once the process has exited
    fn exit_status(&mut self) -> io::Result<Option<String>>;

    /// Sends the kill signal without waiting
    fn start_kill(&mut self) -> io::Result<()>;

    async fn wait_exit(&mut self) -> io::Result<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeLauncher: Send + Sync + 'static {
    /// Starts one node. The returned process is owned by the caller.
    async fn launch(
        &self,
        spec: &LaunchSpec,
    ) -> io::Result<Box<dyn NodeProcess>>;

    /// Program name used in diagnostics
    fn program(
        &self,
        role: Role,
    ) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    Killed,
    /// The process was already dead before the signal
    AlreadyExited,
    /// The handle was released by an earlier terminate
    AlreadyReleased,
    /// Signal sent but the process was still around after the grace period
    GraceExpired,
}

/// Exclusive ownership of one spawned node process.
///
/// Dropping a handle that was never terminated kills the process, so a
/// panic unwinding through the runner does not leak listening ports.
pub struct ProcessHandle {
    role: Role,
    addrs: NodeAddrs,
    pid: Option<u32>,
    process: Option<Box<dyn NodeProcess>>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("role", &self.role)
            .field("addrs", &self.addrs)
            .field("pid", &self.pid)
            .field("released", &self.process.is_none())
            .finish()
    }
}

impl ProcessHandle {
    pub fn new(
        role: Role,
        addrs: NodeAddrs,
        process: Box<dyn NodeProcess>,
    ) -> Self {
        Self {
            role,
            addrs,
            pid: process.pid(),
            process: Some(process),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn addrs(&self) -> NodeAddrs {
        self.addrs
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_released(&self) -> bool {
        self.process.is_none()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Some(mut process) = self.process.take() {
            warn!(
                "{} node {:?} (pid {:?}) dropped without terminate, killing",
                self.role, self.addrs, self.pid
            );
            if let Err(e) = process.start_kill() {
                error!("kill on drop failed for pid {:?}: {}", self.pid, e);
            }
        }
    }
}

/// Spawns and terminates node processes through a [`NodeLauncher`].
#[derive(Clone)]
pub struct ProcessManager {
    launcher: Arc<dyn NodeLauncher>,
    config: ProcessConfig,
}

impl ProcessManager {
    pub fn new(
        launcher: Arc<dyn NodeLauncher>,
        config: ProcessConfig,
    ) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Launches one node and, when configured, waits until both of its
    /// endpoints accept connections.
    ///
    /// # Errors
    /// - [`SpawnError::AddressInUse`] if an endpoint is already served
    /// - [`SpawnError::Launch`] if the launcher cannot start the program
    /// - [`SpawnError::ExitedEarly`] if the node dies during startup
    /// - [`SpawnError::NotReady`] if the startup timeout elapses
    pub async fn spawn(
        &self,
        spec: &LaunchSpec,
    ) -> std::result::Result<ProcessHandle, SpawnError> {
        if self.config.check_ports {
            let probe_timeout = Duration::from_millis(self.config.probe_interval_ms);
            for addr in [spec.addrs.client, spec.addrs.control] {
                if is_server_ready(addr, probe_timeout).await {
                    error!("spawn: {} already has a listener", addr);
                    return Err(SpawnError::AddressInUse { addr });
                }
            }
        }

        let process = self.launcher.launch(spec).await.map_err(|source| SpawnError::Launch {
            role: spec.role,
            program: self.launcher.program(spec.role),
            source,
        })?;
        let mut handle = ProcessHandle::new(spec.role, spec.addrs, process);
        info!(
            "spawn: {} node client={} control={} pid={:?}",
            spec.role, spec.addrs.client, spec.addrs.control, handle.pid
        );

        if self.config.wait_ready {
            if let Err(e) = self.wait_ready(&mut handle).await {
                self.terminate(&mut handle).await;
                return Err(e);
            }
        }

        Ok(handle)
    }

    async fn wait_ready(
        &self,
        handle: &mut ProcessHandle,
    ) -> std::result::Result<(), SpawnError> {
        let startup_timeout = Duration::from_millis(self.config.startup_timeout_ms);
        let interval = Duration::from_millis(self.config.probe_interval_ms);
        let deadline = Instant::now() + startup_timeout;
        let (role, addrs) = (handle.role, handle.addrs);

        loop {
            if let Some(process) = handle.process.as_mut() {
                match process.exit_status() {
                    Ok(Some(status)) => {
                        error!("spawn: {} node at {} exited: {}", role, addrs.control, status);
                        return Err(SpawnError::ExitedEarly {
                            role,
                            addr: addrs.control,
                            status,
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!("spawn: cannot poll pid {:?}: {}", handle.pid, e),
                }
            }

            if is_server_ready(addrs.client, interval).await && is_server_ready(addrs.control, interval).await {
                debug!("spawn: {} node at {} is ready", role, addrs.control);
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(SpawnError::NotReady {
                    role,
                    addr: addrs.control,
                    timeout: startup_timeout,
                });
            }
            sleep(interval).await;
        }
    }

    /// Kills the node behind `handle` and releases it.
    ///
    /// Idempotent: a handle that is already released or a process that
    /// already died yields a warning, never an error. Waiting for the exit
    /// is bounded by the grace period.
    pub async fn terminate(
        &self,
        handle: &mut ProcessHandle,
    ) -> TerminateOutcome {
        let Some(mut process) = handle.process.take() else {
            warn!("terminate: pid {:?} already released", handle.pid);
            return TerminateOutcome::AlreadyReleased;
        };

        if let Ok(Some(status)) = process.exit_status() {
            warn!(
                "terminate: {} node at {} had already exited ({})",
                handle.role, handle.addrs.control, status
            );
            return TerminateOutcome::AlreadyExited;
        }

        if let Err(e) = process.start_kill() {
            // The child may have been reaped between the poll and the kill.
            warn!("terminate: kill pid {:?} failed: {}", handle.pid, e);
            return TerminateOutcome::AlreadyExited;
        }

        let grace = Duration::from_millis(self.config.terminate_grace_ms);
        match timeout(grace, process.wait_exit()).await {
            Ok(Ok(())) => {
                debug!("terminate: pid {:?} exited", handle.pid);
                TerminateOutcome::Killed
            }
            Ok(Err(e)) => {
                warn!("terminate: wait on pid {:?} failed: {}", handle.pid, e);
                TerminateOutcome::Killed
            }
            Err(_) => {
                warn!("terminate: pid {:?} still alive after {:?}", handle.pid, grace);
                TerminateOutcome::GraceExpired
            }
        }
    }
}
