//! Injectable timer source for the background loops
//!
//! The status poller, layout bridge, relay and health monitor all wait on a
//! `Clock` instead of calling `tokio::time::sleep` directly, so tests can
//! drive them without real delays.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Source of timed waits
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time, backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose sleeps complete immediately.
///
/// Every requested wait is recorded so tests can assert on spacing and
/// count without waiting for it.
#[derive(Debug, Default)]
pub struct ImmediateClock {
    sleeps: AtomicU64,
    requested: Mutex<Vec<Duration>>,
}

impl ImmediateClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sleeps requested so far
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }

    /// Total virtual time requested so far
    pub fn elapsed(&self) -> Duration {
        self.requested
            .lock()
            .map(|r| r.iter().sum())
            .unwrap_or_default()
    }

    /// Every requested duration, in order
    pub fn requested(&self) -> Vec<Duration> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ImmediateClock {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(duration);
        }
        tokio::task::yield_now().await;
    }
}
