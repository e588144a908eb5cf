//! Anchoring status poller
//!
//! After a successful commit the record is queued for anchoring on the
//! registry side. The poller observes that progress with a bounded number
//! of spaced requests:
//!
//! - starts in `Queued` without fetching
//! - every interval asks `GET /job/{record_id}`
//! - on `anchored` fetches the full record and stops
//! - request failures are logged and polling continues
//! - after `max_attempts` stops, leaving the last observed status
//!
//! Running out of attempts is not an error: anchoring can legitimately take
//! longer than the client is willing to watch.

use crate::client::JobSource;
use crate::clock::{Clock, TokioClock};
use crate::config::PollerConfig;
use crate::types::{AnchorInfo, AnchoringStatus, FileRecord, Fingerprint, RecordId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How a poll run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Anchored, with the refreshed record
    Anchored { record: FileRecord, anchor: AnchorInfo },
    /// Anchored, but the follow-up record fetch failed
    AnchoredWithoutRecord { anchor: AnchorInfo },
    /// Gave up after `attempts` polls; status is still non-terminal
    Exhausted {
        attempts: u32,
        last_status: AnchoringStatus,
    },
    /// Owner went away before a terminal state
    Cancelled {
        attempts: u32,
        last_status: AnchoringStatus,
    },
}

impl PollOutcome {
    pub fn status(&self) -> AnchoringStatus {
        match self {
            PollOutcome::Anchored { .. } | PollOutcome::AnchoredWithoutRecord { .. } => {
                AnchoringStatus::Anchored
            }
            PollOutcome::Exhausted { last_status, .. }
            | PollOutcome::Cancelled { last_status, .. } => *last_status,
        }
    }
}

/// Drives the anchoring status state machine
#[derive(Clone)]
pub struct StatusPoller {
    source: Arc<dyn JobSource>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn JobSource>, config: PollerConfig) -> Self {
        Self {
            source,
            clock: Arc::new(TokioClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll until anchored, exhausted or cancelled.
    ///
    /// Every observed status is published on `status`.
    pub async fn poll(
        &self,
        record_id: &RecordId,
        fingerprint: &Fingerprint,
        cancel: &CancellationToken,
        status: &watch::Sender<AnchoringStatus>,
    ) -> PollOutcome {
        let mut last_status = AnchoringStatus::Queued;
        status.send_replace(last_status);

        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return PollOutcome::Cancelled { attempts, last_status };
                }
                _ = self.clock.sleep(self.config.interval()) => {}
            }

            attempts += 1;

            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return PollOutcome::Cancelled { attempts, last_status };
                }
                job = self.source.job_status(record_id) => job,
            };

            let job = match job {
                Ok(job) => job,
                Err(e) => {
                    debug!(record_id = %record_id, attempt = attempts, error = %e, "Status poll failed, will retry");
                    continue;
                }
            };

            let observed = job.status();
            if observed != last_status {
                debug!(record_id = %record_id, status = %observed, attempt = attempts, "Anchoring status changed");
            }
            last_status = observed;
            status.send_replace(observed);

            if observed.is_terminal() {
                let anchor = job.anchored.unwrap_or_default();
                info!(record_id = %record_id, hash = %fingerprint, tx_hash = ?anchor.tx_hash, "Record anchored");

                return match self.source.file_by_hash(fingerprint).await {
                    Ok(record) => PollOutcome::Anchored { record, anchor },
                    Err(e) => {
                        debug!(hash = %fingerprint, error = %e, "Anchored record fetch failed");
                        PollOutcome::AnchoredWithoutRecord { anchor }
                    }
                };
            }
        }

        info!(record_id = %record_id, attempts, status = %last_status, "Stopped polling, anchoring still pending");
        PollOutcome::Exhausted {
            attempts,
            last_status,
        }
    }

    /// Poll in the background. The returned handle owns the task: dropping
    /// it cancels the pending timer.
    pub fn spawn(&self, record_id: RecordId, fingerprint: Fingerprint) -> PollHandle {
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(AnchoringStatus::Queued);

        let poller = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            poller
                .poll(&record_id, &fingerprint, &token, &status_tx)
                .await
        });

        PollHandle {
            cancel,
            status: status_rx,
            task: Some(task),
        }
    }
}

/// Owner of a background poll. Dropping it cancels polling.
pub struct PollHandle {
    cancel: CancellationToken,
    status: watch::Receiver<AnchoringStatus>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    /// Latest observed status
    pub fn status(&self) -> AnchoringStatus {
        *self.status.borrow()
    }

    /// Follow status changes
    pub fn subscribe(&self) -> watch::Receiver<AnchoringStatus> {
        self.status.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the poll to end
    pub async fn join(mut self) -> PollOutcome {
        let last_status = self.status();
        match self.task.take() {
            Some(task) => task.await.unwrap_or(PollOutcome::Cancelled {
                attempts: 0,
                last_status,
            }),
            None => PollOutcome::Cancelled {
                attempts: 0,
                last_status,
            },
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
