//! Layout bridge: reports the embedded document's height to the host page
//!
//! Iframe height changes are not reliably observable through any single
//! mechanism across host environments, so the bridge listens to every
//! source at once: load, window resize, the size observer, and a fallback
//! timer.

use super::{FrameMessage, FrameTarget, TargetOrigin};
use crate::clock::{Clock, TokioClock};
use crate::config::RelayConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default spacing of the fallback timer
pub const DEFAULT_LAYOUT_TICK: Duration = Duration::from_secs(1);

/// Height sources of the embedded document, in CSS pixels
pub trait DocumentMetrics: Send + Sync {
    /// `document.documentElement.scrollHeight`
    fn document_scroll_height(&self) -> u32;
    /// `document.body.scrollHeight`
    fn body_scroll_height(&self) -> u32;
    /// `window.innerHeight`
    fn inner_height(&self) -> u32;
}

/// Why a measurement was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutTrigger {
    Load,
    Resize,
    Observer,
    Tick,
}

/// Measures the document and posts resize notifications to the parent
pub struct LayoutBridge {
    metrics: Arc<dyn DocumentMetrics>,
    parent: Arc<dyn FrameTarget>,
    target_origin: TargetOrigin,
    tick: Duration,
    last_sent: Mutex<Option<u32>>,
}

impl LayoutBridge {
    pub fn new(metrics: Arc<dyn DocumentMetrics>, parent: Arc<dyn FrameTarget>) -> Self {
        Self {
            metrics,
            parent,
            target_origin: TargetOrigin::Any,
            tick: DEFAULT_LAYOUT_TICK,
            last_sent: Mutex::new(None),
        }
    }

    /// Bridge using the configured host origin and fallback tick
    pub fn from_config(
        metrics: Arc<dyn DocumentMetrics>,
        parent: Arc<dyn FrameTarget>,
        config: &RelayConfig,
    ) -> Self {
        Self::new(metrics, parent)
            .with_target_origin(TargetOrigin::from_known(config.target_origin.as_deref()))
            .with_tick(config.layout_tick())
    }

    /// Restrict notifications to a known host origin
    pub fn with_target_origin(mut self, target_origin: TargetOrigin) -> Self {
        self.target_origin = target_origin;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Current document height
    pub fn measure(&self) -> u32 {
        self.metrics
            .document_scroll_height()
            .max(self.metrics.body_scroll_height())
            .max(self.metrics.inner_height())
    }

    /// Take a measurement and notify the parent.
    ///
    /// Returns the height that was posted. A height equal to the last one
    /// posted is skipped, except on load.
    pub fn notify(&self, trigger: LayoutTrigger) -> Option<u32> {
        let height = self.measure();

        let mut last = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if trigger != LayoutTrigger::Load && *last == Some(height) {
            trace!(height, ?trigger, "Height unchanged");
            return None;
        }

        match self
            .parent
            .post_message(&FrameMessage::EmbedResize { height }, &self.target_origin)
        {
            Ok(()) => {
                debug!(height, ?trigger, "Posted embed height");
                *last = Some(height);
                Some(height)
            }
            Err(e) => {
                debug!(error = %e, "Failed to post embed height");
                None
            }
        }
    }

    /// Run the bridge in the background.
    ///
    /// Posts once for `Load`, then for every event on `events` and on every
    /// tick of the fallback timer, until the handle is cancelled or dropped.
    pub fn spawn(self: Arc<Self>, events: mpsc::Receiver<LayoutTrigger>) -> BridgeHandle {
        self.spawn_with_clock(events, Arc::new(TokioClock))
    }

    pub fn spawn_with_clock(
        self: Arc<Self>,
        mut events: mpsc::Receiver<LayoutTrigger>,
        clock: Arc<dyn Clock>,
    ) -> BridgeHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tick = self.tick;

        let task = tokio::spawn(async move {
            self.notify(LayoutTrigger::Load);
            let mut events_open = true;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = events.recv(), if events_open => match event {
                        Some(trigger) => {
                            self.notify(trigger);
                        }
                        None => events_open = false,
                    },
                    _ = clock.sleep(tick) => {
                        self.notify(LayoutTrigger::Tick);
                    }
                }
            }
            debug!("Layout bridge stopped");
        });

        BridgeHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Owner of a running layout bridge. Dropping it stops the bridge.
pub struct BridgeHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop the bridge and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ImmediateClock;
    use crate::relay::RecordingTarget;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Metrics {
        doc: AtomicU32,
        body: AtomicU32,
        inner: AtomicU32,
    }

    impl Metrics {
        fn new(doc: u32, body: u32, inner: u32) -> Self {
            Self {
                doc: AtomicU32::new(doc),
                body: AtomicU32::new(body),
                inner: AtomicU32::new(inner),
            }
        }
    }

    impl DocumentMetrics for Metrics {
        fn document_scroll_height(&self) -> u32 {
            self.doc.load(Ordering::SeqCst)
        }
        fn body_scroll_height(&self) -> u32 {
            self.body.load(Ordering::SeqCst)
        }
        fn inner_height(&self) -> u32 {
            self.inner.load(Ordering::SeqCst)
        }
    }

    fn heights(target: &RecordingTarget) -> Vec<u32> {
        target
            .messages()
            .into_iter()
            .filter_map(|(m, _)| match m {
                FrameMessage::EmbedResize { height } => Some(height),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_measure_takes_max() {
        let parent = Arc::new(RecordingTarget::default());
        let bridge = LayoutBridge::new(Arc::new(Metrics::new(700, 910, 600)), parent);
        assert_eq!(bridge.measure(), 910);
    }

    #[test]
    fn test_notify_skips_unchanged_except_load() {
        let metrics = Arc::new(Metrics::new(500, 480, 300));
        let parent = Arc::new(RecordingTarget::default());
        let bridge = LayoutBridge::new(metrics.clone(), parent.clone());

        assert_eq!(bridge.notify(LayoutTrigger::Load), Some(500));
        assert_eq!(bridge.notify(LayoutTrigger::Tick), None);
        assert_eq!(bridge.notify(LayoutTrigger::Load), Some(500));

        metrics.body.store(1200, Ordering::SeqCst);
        assert_eq!(bridge.notify(LayoutTrigger::Observer), Some(1200));

        assert_eq!(heights(&parent), vec![500, 500, 1200]);
        assert!(parent.messages().iter().all(|(_, o)| *o == TargetOrigin::Any));
    }

    #[test]
    fn test_post_failure_is_swallowed_and_retried() {
        let parent = Arc::new(RecordingTarget::closed());
        let bridge = LayoutBridge::new(Arc::new(Metrics::new(400, 0, 0)), parent);

        assert_eq!(bridge.notify(LayoutTrigger::Resize), None);
        // Nothing was recorded as sent, so the next trigger tries again
        assert_eq!(bridge.notify(LayoutTrigger::Resize), None);
    }

    #[tokio::test]
    async fn test_spawned_bridge_follows_events() {
        let metrics = Arc::new(Metrics::new(300, 0, 0));
        let parent = Arc::new(RecordingTarget::default());
        let bridge = Arc::new(
            LayoutBridge::new(metrics.clone(), parent.clone())
                .with_target_origin(TargetOrigin::Exact("https://host.example".into()))
                .with_tick(Duration::from_secs(3600)),
        );
        let (tx, rx) = mpsc::channel(8);

        let handle = bridge.spawn(rx);
        // Let the load notification go out first
        tokio::time::sleep(Duration::from_millis(20)).await;

        metrics.doc.store(650, Ordering::SeqCst);
        tx.send(LayoutTrigger::Resize).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.shutdown().await;

        assert_eq!(heights(&parent), vec![300, 650]);
        assert_eq!(
            parent.messages()[0].1,
            TargetOrigin::Exact("https://host.example".into())
        );
    }

    async fn wait_for_height(parent: &RecordingTarget, height: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !heights(parent).contains(&height) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_fallback_tick_picks_up_height_change() {
        let metrics = Arc::new(Metrics::new(300, 0, 0));
        let parent = Arc::new(RecordingTarget::default());
        let bridge = Arc::new(
            LayoutBridge::new(metrics.clone(), parent.clone()).with_tick(Duration::from_millis(250)),
        );
        let clock = Arc::new(ImmediateClock::new());
        // Kept open so only the timer can trigger measurements
        let (_tx, rx) = mpsc::channel(8);

        let handle = bridge.spawn_with_clock(rx, clock.clone());
        wait_for_height(&parent, 300).await;

        metrics.doc.store(820, Ordering::SeqCst);
        wait_for_height(&parent, 820).await;
        handle.shutdown().await;

        assert_eq!(heights(&parent), vec![300, 820]);
        assert!(clock.sleep_count() > 0);
        assert!(clock
            .requested()
            .iter()
            .all(|d| *d == Duration::from_millis(250)));
    }

    #[test]
    fn test_from_config() {
        let config = RelayConfig {
            target_origin: Some("https://host.example/".into()),
            layout_tick_ms: 400,
            ..Default::default()
        };
        let parent = Arc::new(RecordingTarget::default());
        let bridge = LayoutBridge::from_config(Arc::new(Metrics::new(10, 0, 0)), parent.clone(), &config);

        assert_eq!(bridge.tick, Duration::from_millis(400));
        bridge.notify(LayoutTrigger::Load);
        assert_eq!(
            parent.messages()[0].1,
            TargetOrigin::Exact("https://host.example".into())
        );

        let fallback = LayoutBridge::from_config(
            Arc::new(Metrics::new(10, 0, 0)),
            Arc::new(RecordingTarget::default()),
            &RelayConfig::default(),
        );
        assert_eq!(fallback.target_origin, TargetOrigin::Any);
        assert_eq!(fallback.tick, DEFAULT_LAYOUT_TICK);
    }
}
