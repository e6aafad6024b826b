use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::LaunchSpec;
use crate::NodeLauncher;
use crate::NodeProcess;
use crate::Role;

/// Observable state of one [`StubProcess`]
#[derive(Debug, Default)]
pub(crate) struct StubState {
    exited: AtomicBool,
    kills: AtomicUsize,
    ignore_kill: bool,
}

impl StubState {
    pub(crate) fn is_alive(&self) -> bool {
        !self.exited.load(Ordering::SeqCst)
    }

    pub(crate) fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub(crate) fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct StubProcess {
    pid: u32,
    state: Arc<StubState>,
}

impl StubProcess {
    pub(crate) fn new(
        pid: u32,
        ignore_kill: bool,
    ) -> (Self, Arc<StubState>) {
        let state = Arc::new(StubState {
            ignore_kill,
            ..Default::default()
        });
        (
            Self {
                pid,
                state: state.clone(),
            },
            state,
        )
    }
}

#[async_trait]
impl NodeProcess for StubProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn exit_status(&mut self) -> io::Result<Option<String>> {
        Ok((!self.state.is_alive()).then(|| "exit status: 1".to_string()))
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.state.kills.fetch_add(1, Ordering::SeqCst);
        if !self.state.ignore_kill {
            self.state.exit();
        }
        Ok(())
    }

    async fn wait_exit(&mut self) -> io::Result<()> {
        if self.state.ignore_kill {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Hands out [`StubProcess`]es and remembers every launch.
#[derive(Default)]
pub(crate) struct StubLauncher {
    pub launched: Mutex<Vec<(LaunchSpec, Arc<StubState>)>>,
    /// Launching this role fails with `NotFound`
    pub fail_on: Option<Role>,
    /// Processes are dead right after launch
    pub exit_on_start: bool,
    pub ignore_kill: bool,
}

impl StubLauncher {
    pub(crate) fn states(&self) -> Vec<Arc<StubState>> {
        self.launched.lock().iter().map(|(_, s)| s.clone()).collect()
    }

    pub(crate) fn specs(&self) -> Vec<LaunchSpec> {
        self.launched.lock().iter().map(|(spec, _)| *spec).collect()
    }
}

#[async_trait]
impl NodeLauncher for StubLauncher {
    async fn launch(
        &self,
        spec: &LaunchSpec,
    ) -> io::Result<Box<dyn NodeProcess>> {
        if self.fail_on == Some(spec.role) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
        }
        let mut launched = self.launched.lock();
        let (process, state) = StubProcess::new(1000 + launched.len() as u32, self.ignore_kill);
        if self.exit_on_start {
            state.exit();
        }
        launched.push((*spec, state));
        Ok(Box::new(process))
    }

    fn program(
        &self,
        role: Role,
    ) -> String {
        format!("stub-{role}")
    }
}
