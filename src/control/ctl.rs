use std::io;
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::ControlClient;
use super::ControlCommand;
use super::ControlResponse;
use crate::ControlConfig;
use crate::ControlError;
use crate::ProgramSpec;

/// Issues commands by running the cluster's own ctl binary and capturing
/// its stdout.
#[derive(Debug, Clone)]
pub struct CtlControlClient {
    ctl: ProgramSpec,
    request_timeout: Duration,
}

impl CtlControlClient {
    pub fn new(
        ctl: &ProgramSpec,
        config: &ControlConfig,
    ) -> Self {
        Self {
            ctl: ctl.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    /// Expands the template; an `{arg}`-only token disappears when the
    /// command carries no argument.
    pub(crate) fn render_args(
        template: &[String],
        target: SocketAddr,
        command: &ControlCommand,
    ) -> Vec<String> {
        template
            .iter()
            .filter(|arg| command.argument.is_some() || arg.as_str() != "{arg}")
            .map(|arg| {
                arg.replace("{target}", &target.to_string())
                    .replace("{verb}", command.verb.as_str())
                    .replace("{arg}", command.argument.as_deref().unwrap_or_default())
            })
            .collect()
    }
}

#[async_trait]
impl ControlClient for CtlControlClient {
    async fn send(
        &self,
        target: SocketAddr,
        command: &ControlCommand,
    ) -> std::result::Result<ControlResponse, ControlError> {
        let args = Self::render_args(&self.ctl.args, target, command);
        let child = Command::new(&self.ctl.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ControlError::Connection { target, source })?;

        let output = match timeout(self.request_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ControlError::Connection { target, source }),
            Err(_) => {
                return Err(ControlError::Timeout {
                    target,
                    duration: self.request_timeout,
                })
            }
        };

        // ctl reports an unreachable node through its exit status with
        // nothing useful on stdout.
        if !output.status.success() && output.stdout.iter().all(u8::is_ascii_whitespace) {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ControlError::Connection {
                target,
                source: io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("ctl exited with {}: {}", output.status, stderr),
                ),
            });
        }

        let response = ControlResponse::parse(target, output.stdout)?;
        debug!("ctl: {} {:?} -> {:?}", target, command.line(), response.raw());
        Ok(response)
    }
}
