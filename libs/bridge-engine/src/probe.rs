use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("readiness probe cancelled")]
pub struct ProbeCancelled;

/// Blocks a delivery until the external server accepts TCP connections.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProber {
    pub interval: Duration,
    pub attempt_timeout: Duration,
}

impl Default for ReadinessProber {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }
}

impl ReadinessProber {
    pub fn new(interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            interval,
            attempt_timeout,
        }
    }

    /// Retry until a connect to `addr` succeeds. Returns the number of
    /// attempts made. Only cancellation stops the loop early.
    pub async fn wait_until_reachable(
        &self,
        addr: &str,
        cancel: &CancellationToken,
    ) -> Result<u32, ProbeCancelled> {
        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);
            let attempt = tokio::time::timeout(self.attempt_timeout, TcpStream::connect(addr));
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeCancelled),
                outcome = attempt => outcome,
            };

            match outcome {
                Ok(Ok(_stream)) => {
                    tracing::debug!(addr, attempts, "endpoint reachable");
                    return Ok(attempts);
                }
                Ok(Err(e)) => {
                    tracing::info!(addr, attempts, error = %e, "endpoint not reachable, retrying");
                }
                Err(_) => {
                    tracing::info!(addr, attempts, "endpoint connect timed out, retrying");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ProbeCancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
