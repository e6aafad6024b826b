use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;

use super::LaunchSpec;
use super::NodeLauncher;
use super::NodeProcess;
use crate::BinariesConfig;
use crate::ProgramSpec;
use crate::Role;

#[async_trait]
impl NodeProcess for Child {
    fn pid(&self) -> Option<u32> {
        self.id()
    }

    fn exit_status(&mut self) -> io::Result<Option<String>> {
        Ok(self.try_wait()?.map(|status| status.to_string()))
    }

    fn start_kill(&mut self) -> io::Result<()> {
        Child::start_kill(self)
    }

    async fn wait_exit(&mut self) -> io::Result<()> {
        self.wait().await.map(|_| ())
    }
}

/// Launches leader and replica nodes as OS processes.
///
/// Arguments come from the configured templates with `{client}`,
/// `{control}` and `{leader}` substituted. Children are marked
/// `kill_on_drop` as a last line of defence.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    leader: ProgramSpec,
    kvs: ProgramSpec,
    output_dir: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new(binaries: &BinariesConfig) -> Self {
        Self {
            leader: binaries.leader.clone(),
            kvs: binaries.kvs.clone(),
            output_dir: binaries.output_dir.clone(),
        }
    }

    fn program_spec(
        &self,
        role: Role,
    ) -> &ProgramSpec {
        match role {
            Role::Leader => &self.leader,
            Role::Replica | Role::Unknown => &self.kvs,
        }
    }

    pub(crate) fn render_args(
        template: &[String],
        spec: &LaunchSpec,
    ) -> Vec<String> {
        let leader = spec.leader_control.map(|a| a.to_string()).unwrap_or_default();
        template
            .iter()
            .map(|arg| {
                arg.replace("{client}", &spec.addrs.client.to_string())
                    .replace("{control}", &spec.addrs.control.to_string())
                    .replace("{leader}", &leader)
            })
            .collect()
    }

    fn output(
        &self,
        spec: &LaunchSpec,
    ) -> io::Result<(Stdio, Stdio)> {
        let Some(dir) = &self.output_dir else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}-{}.log", spec.role, spec.addrs.control.port()));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok((Stdio::from(file.try_clone()?), Stdio::from(file)))
    }
}

#[async_trait]
impl NodeLauncher for CommandLauncher {
    async fn launch(
        &self,
        spec: &LaunchSpec,
    ) -> io::Result<Box<dyn NodeProcess>> {
        let program = self.program_spec(spec.role);
        let args = Self::render_args(&program.args, spec);
        let (stdout, stderr) = self.output(spec)?;
        debug!("launch: {} {:?}", program.program, args);

        let child = Command::new(&program.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(child))
    }

    fn program(
        &self,
        role: Role,
    ) -> String {
        self.program_spec(role).program.clone()
    }
}
