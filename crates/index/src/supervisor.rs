//! Connection establishment with unbounded retries.
//!
//! The supervisor only knows how to obtain a connection; installing it is
//! the caller's job (see [`IndexClient::connect_in_background`]).
//!
//! [`IndexClient::connect_in_background`]: crate::client::IndexClient::connect_in_background

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::IndexResult;

/// Retries a connect operation at a fixed interval until it succeeds.
#[derive(Debug, Clone)]
pub struct ConnectionSupervisor {
    retry_interval: Duration,
    shutdown: CancellationToken,
}

impl ConnectionSupervisor {
    /// Creates a supervisor that stops retrying once `shutdown` is cancelled.
    pub fn new(retry_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            retry_interval,
            shutdown,
        }
    }

    /// Returns the delay between attempts.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Calls `connect` until it succeeds.
    ///
    /// Returns `None` if shutdown was requested first. An attempt in
    /// progress is abandoned on shutdown, and a connection that completes
    /// after shutdown is dropped.
    pub async fn run<T, F, Fut>(&self, mut connect: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IndexResult<T>>,
    {
        let mut attempt: u64 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                info!(attempts = attempt, "Connection supervisor stopped");
                return None;
            }

            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!(attempts = attempt, "Connection supervisor stopped during attempt");
                    return None;
                }
                result = connect() => result,
            };

            match result {
                Ok(_) if self.shutdown.is_cancelled() => {
                    info!(attempts = attempt, "Connection supervisor stopped, discarding connection");
                    return None;
                }
                Ok(handle) => {
                    info!(attempt = attempt, "Connection established");
                    return Some(handle);
                }
                Err(e) => {
                    error!(
                        attempt = attempt,
                        error = %e,
                        retry_in = %humantime::format_duration(self.retry_interval),
                        "Could not connect to the backing store"
                    );
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(attempts = attempt, "Connection supervisor stopped");
                    return None;
                }
                _ = sleep(self.retry_interval) => {}
            }
        }
    }

    /// Runs the retry loop on a background task.
    ///
    /// The receiver yields the connection once; it errors if shutdown was
    /// requested before a connection could be made.
    pub fn spawn<T, F, Fut>(self, connect: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = IndexResult<T>> + Send,
    {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Some(handle) = self.run(connect).await {
                // Receiver gone means nobody wants the handle any more.
                let _ = tx.send(handle);
            }
        });

        rx
    }
}
