//! Registry liveness monitor
//!
//! Probes `GET /health` immediately and then on a fixed interval, publishing
//! the result for whoever renders the status.

use crate::client::HealthProbe;
use crate::clock::{Clock, TokioClock};
use crate::types::HealthStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default probe spacing
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            probe,
            clock: Arc::new(TokioClock),
            interval: DEFAULT_HEALTH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Probe once
    pub async fn check(&self) -> HealthStatus {
        if self.probe.probe().await {
            HealthStatus::Online
        } else {
            HealthStatus::Offline
        }
    }

    /// Probe in the background until the handle is dropped
    pub fn spawn(self) -> HealthHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(HealthStatus::Checking);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                let status = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    status = self.check() => status,
                };

                let previous = tx.send_replace(status);
                if previous != status {
                    info!(status = ?status, "Registry health changed");
                }

                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = self.clock.sleep(self.interval) => {}
                }
            }
            debug!("Health monitor stopped");
        });

        HealthHandle {
            cancel,
            status: rx,
            task: Some(task),
        }
    }
}

/// Owner of a running monitor. Dropping it stops probing.
pub struct HealthHandle {
    cancel: CancellationToken,
    status: watch::Receiver<HealthStatus>,
    task: Option<JoinHandle<()>>,
}

impl HealthHandle {
    pub fn status(&self) -> HealthStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.clone()
    }

    /// Stop probing and wait for the task to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for HealthHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
