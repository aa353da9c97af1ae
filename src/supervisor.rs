//! Fail-forever policies for connections and workers.
//!
//! Connections retry after a fixed [`ReconnectPolicy`] delay without bound.
//! Long-running workers are wrapped in [`run_forever`], which restarts them
//! after they return, fail or panic.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::TimingConfig;
use crate::metrics;

/// Fixed-delay, unbounded reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self::new(timing.reconnect_delay())
    }

    /// Sleep out the delay before the next attempt of a `kind` connection.
    pub async fn wait(&self, kind: &str) {
        tokio::time::sleep(self.delay).await;
        metrics::record_reconnect(kind);
    }

    /// Post `msg` to `mailbox` once the delay has passed.
    pub fn schedule<M: Send + 'static>(&self, mailbox: mpsc::UnboundedSender<M>, msg: M) {
        post_after(self.delay, mailbox, msg);
    }
}

/// Post `msg` to `mailbox` after `delay`, without blocking the caller.
pub(crate) fn post_after<M: Send + 'static>(
    delay: Duration,
    mailbox: mpsc::UnboundedSender<M>,
    msg: M,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = mailbox.send(msg);
    });
}

/// Run the worker built by `factory` forever.
///
/// Each run is its own task, so a panic is caught at the join point. After
/// any exit the supervisor sleeps `restart_delay` and builds a fresh worker.
pub fn run_forever<F, Fut>(label: &'static str, restart_delay: Duration, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            info!(worker = label, "Starting worker");
            match tokio::spawn(factory()).await {
                Ok(Ok(())) => warn!(worker = label, "Worker exited"),
                Ok(Err(e)) => error!(worker = label, error = %format!("{e:#}"), "Worker failed"),
                Err(e) if e.is_panic() => error!(worker = label, "Worker panicked"),
                Err(e) => error!(worker = label, error = %e, "Worker cancelled"),
            }
            metrics::record_reconnect(label);
            tokio::time::sleep(restart_delay).await;
        }
    })
}
