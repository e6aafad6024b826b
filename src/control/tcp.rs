use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use super::ControlClient;
use super::ControlCommand;
use super::ControlResponse;
use crate::ControlConfig;
use crate::ControlError;

/// Speaks the text control protocol directly: one connection per command,
/// `"<verb>[ <arg>]\n"` out, everything up to EOF back.
#[derive(Debug, Clone)]
pub struct TcpControlClient {
    connect_timeout: Duration,
    request_timeout: Duration,
    max_response_bytes: usize,
}

impl TcpControlClient {
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_response_bytes: config.max_response_bytes,
        }
    }

    /// Reads until the peer closes. If the deadline passes after some bytes
    /// arrived, those bytes are the response; with nothing received it is a
    /// timeout.
    async fn read_response(
        &self,
        target: SocketAddr,
        stream: &mut TcpStream,
    ) -> std::result::Result<Vec<u8>, ControlError> {
        let deadline = Instant::now() + self.request_timeout;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => return Ok(buf),
                Ok(Ok(n)) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > self.max_response_bytes {
                        return Err(ControlError::Protocol {
                            target,
                            reason: format!("response exceeds {} bytes", self.max_response_bytes),
                        });
                    }
                }
                Ok(Err(source)) => {
                    if buf.is_empty() {
                        return Err(ControlError::Connection { target, source });
                    }
                    warn!("control: read from {} ended with {}", target, source);
                    return Ok(buf);
                }
                Err(_) if !buf.is_empty() => {
                    debug!("control: {} kept the connection open, using {} bytes", target, buf.len());
                    return Ok(buf);
                }
                Err(_) => {
                    return Err(ControlError::Timeout {
                        target,
                        duration: self.request_timeout,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl ControlClient for TcpControlClient {
    async fn send(
        &self,
        target: SocketAddr,
        command: &ControlCommand,
    ) -> std::result::Result<ControlResponse, ControlError> {
        let mut stream = match timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ControlError::Connection { target, source }),
            Err(_) => {
                return Err(ControlError::Timeout {
                    target,
                    duration: self.connect_timeout,
                })
            }
        };

        let line = format!("{}\n", command.line());
        let written = async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        };
        match timeout(self.request_timeout, written).await {
            Ok(Ok(())) => {}
            Ok(Err(source)) => return Err(ControlError::Connection { target, source }),
            Err(_) => {
                return Err(ControlError::Timeout {
                    target,
                    duration: self.request_timeout,
                })
            }
        }

        let bytes = self.read_response(target, &mut stream).await?;
        let response = ControlResponse::parse(target, bytes)?;
        debug!("control: {} <- {:?} -> {:?}", target, command.line(), response.raw());
        Ok(response)
    }
}
