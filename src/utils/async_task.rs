use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::Result;

/// Runs `task` until it succeeds, it fails with a non-retryable error, or
/// `deadline` passes. Without a deadline the task runs exactly once.
///
/// When the deadline expires the last error is returned.
pub(crate) async fn retry_until_deadline<F, T, P>(
    name: &str,
    deadline: Option<Instant>,
    interval: Duration,
    mut task: F,
) -> Result<P>
where
    F: FnMut() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        match task().await {
            Ok(r) => {
                if attempts > 1 {
                    debug!("{} succeeded after {} attempts", name, attempts);
                }
                return Ok(r);
            }
            Err(e) => {
                let Some(deadline) = deadline else {
                    return Err(e);
                };
                if !e.is_retryable() || Instant::now() + interval > deadline {
                    warn!("{} gave up after {} attempts: {}", name, attempts, e);
                    return Err(e);
                }
                debug!("{} attempt {} failed, retrying: {}", name, attempts, e);
                sleep(interval).await;
            }
        }
    }
}
