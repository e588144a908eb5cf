//! Host-embedding side of the auth relay
//!
//! Runs once when the embedded auth window loads: check for a session, post
//! its token to the window that opened or embeds us, then close (popup) or
//! stay (iframe) after a short confirmation delay.

use super::{FrameMessage, FrameTarget, RelayTransport, TargetOrigin};
use crate::clock::{Clock, TokioClock};
use crate::config::RelayConfig;
use crate::session::{SessionContext, SessionToken};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default delay before a popup closes itself, so the user sees the result
pub const DEFAULT_CONFIRM_DELAY: Duration = Duration::from_millis(600);

/// Where the relay gets the current session from
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// `Ok(None)` when signed out; `Err` with the provider's message when the
    /// session lookup itself failed
    async fn current_session(&self) -> Result<Option<SessionToken>, String>;
}

#[async_trait]
impl SessionSource for SessionContext {
    async fn current_session(&self) -> Result<Option<SessionToken>, String> {
        Ok(self.access_token())
    }
}

/// The window the relay runs in
pub trait EmbeddingWindow: Send + Sync {
    /// `window.opener`, absent when not opened by another window
    fn opener(&self) -> Option<Arc<dyn FrameTarget>>;

    /// `window.parent`, absent when top-level
    fn parent(&self) -> Option<Arc<dyn FrameTarget>>;

    /// Origin of this window, when the host binding can report it
    fn origin(&self) -> Option<String>;

    /// Close this window
    fn close(&self);
}

/// Relay progress, mirrored in the auth window's UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Checking,
    SignedOut,
    Sending,
    Done,
}

/// Final state of one relay run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub status: RelayStatus,
    /// User-visible error, if any step failed
    pub error: Option<String>,
    /// Whether the token was handed to the receiving window
    pub delivered: bool,
}

/// Forwards the session token across the frame boundary
pub struct AuthRelay {
    source: Arc<dyn SessionSource>,
    window: Arc<dyn EmbeddingWindow>,
    clock: Arc<dyn Clock>,
    transport: RelayTransport,
    target_origin: Option<String>,
    confirm_delay: Duration,
    status: watch::Sender<RelayStatus>,
    error: Mutex<Option<String>>,
}

impl AuthRelay {
    pub fn new(
        source: Arc<dyn SessionSource>,
        window: Arc<dyn EmbeddingWindow>,
        transport: RelayTransport,
    ) -> Self {
        let (status, _rx) = watch::channel(RelayStatus::Checking);
        Self {
            source,
            window,
            clock: Arc::new(TokioClock),
            transport,
            target_origin: None,
            confirm_delay: DEFAULT_CONFIRM_DELAY,
            status,
            error: Mutex::new(None),
        }
    }

    /// Relay configured for one deployment
    pub fn from_config(
        source: Arc<dyn SessionSource>,
        window: Arc<dyn EmbeddingWindow>,
        config: &RelayConfig,
    ) -> Self {
        let relay = Self::new(source, window, config.transport)
            .with_confirm_delay(config.confirm_delay());
        match &config.target_origin {
            Some(origin) => relay.with_target_origin(origin.clone()),
            None => relay,
        }
    }

    /// Restrict delivery to a known receiver origin
    pub fn with_target_origin(mut self, origin: impl Into<String>) -> Self {
        self.target_origin = Some(origin.into());
        self
    }

    pub fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn status(&self) -> RelayStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayStatus> {
        self.status.subscribe()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    /// Run the relay once. Never fails; the outcome is in the report.
    pub async fn run(&self) -> RelayReport {
        self.clear_error();
        self.set_status(RelayStatus::Checking);

        let token = match self.source.current_session().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No session to relay");
                return self.finish(RelayStatus::SignedOut, false);
            }
            Err(message) => {
                warn!(error = %message, "Session lookup failed");
                self.set_error(message);
                return self.finish(RelayStatus::SignedOut, false);
            }
        };

        let receiver = match self.transport {
            RelayTransport::Popup => self.window.opener(),
            RelayTransport::Iframe => self.window.parent(),
        };
        let Some(receiver) = receiver else {
            debug!(transport = ?self.transport, "No receiving window, skipping relay");
            return self.finish(RelayStatus::SignedOut, false);
        };

        self.set_status(RelayStatus::Sending);

        let origin = self.target_origin.clone().or_else(|| self.window.origin());
        let target = TargetOrigin::from_known(origin.as_deref());
        let message = FrameMessage::AuthToken { token };

        if let Err(e) = receiver.post_message(&message, &target) {
            warn!(error = %e, "Auth relay failed");
            self.set_error(e.to_string());
            return self.finish(RelayStatus::Done, false);
        }

        info!(target = %target, transport = ?self.transport, "Relayed session token");
        let report = self.finish(RelayStatus::Done, true);

        if self.transport == RelayTransport::Popup {
            self.clock.sleep(self.confirm_delay).await;
            self.window.close();
        }

        report
    }

    fn set_status(&self, status: RelayStatus) {
        self.status.send_replace(status);
    }

    fn clear_error(&self) {
        if let Ok(mut error) = self.error.lock() {
            *error = None;
        }
    }

    fn set_error(&self, message: String) {
        if let Ok(mut error) = self.error.lock() {
            *error = Some(message);
        }
    }

    fn finish(&self, status: RelayStatus, delivered: bool) -> RelayReport {
        self.set_status(status);
        RelayReport {
            status,
            error: self.error(),
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ImmediateClock;
    use crate::relay::RecordingTarget;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct TestWindow {
        opener: Option<Arc<RecordingTarget>>,
        parent: Option<Arc<RecordingTarget>>,
        origin: Option<String>,
        closed: AtomicBool,
    }

    impl TestWindow {
        fn popup(opener: Option<Arc<RecordingTarget>>) -> Self {
            Self {
                opener,
                parent: None,
                origin: Some("https://app.example.com".into()),
                closed: AtomicBool::new(false),
            }
        }

        fn iframe(parent: Arc<RecordingTarget>) -> Self {
            Self {
                opener: None,
                parent: Some(parent),
                origin: None,
                closed: AtomicBool::new(false),
            }
        }
    }

    impl EmbeddingWindow for TestWindow {
        fn opener(&self) -> Option<Arc<dyn FrameTarget>> {
            self.opener.clone().map(|o| o as Arc<dyn FrameTarget>)
        }
        fn parent(&self) -> Option<Arc<dyn FrameTarget>> {
            self.parent.clone().map(|p| p as Arc<dyn FrameTarget>)
        }
        fn origin(&self) -> Option<String> {
            self.origin.clone()
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SessionSource for FailingSource {
        async fn current_session(&self) -> Result<Option<SessionToken>, String> {
            Err("refresh token expired".into())
        }
    }

    /// Fails the first lookup, then finds a session
    #[derive(Default)]
    struct FlakySource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl SessionSource for FlakySource {
        async fn current_session(&self) -> Result<Option<SessionToken>, String> {
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err("network unreachable".into()),
                _ => Ok(Some(SessionToken::new("jwt-2"))),
            }
        }
    }

    fn signed_in() -> Arc<SessionContext> {
        Arc::new(SessionContext::with_token(SessionToken::new("jwt-1")))
    }

    #[tokio::test]
    async fn test_popup_relays_and_closes() {
        let opener = Arc::new(RecordingTarget::default());
        let window = Arc::new(TestWindow::popup(Some(opener.clone())));
        let clock = Arc::new(ImmediateClock::new());

        let relay = AuthRelay::new(signed_in(), window.clone(), RelayTransport::Popup)
            .with_clock(clock.clone());
        let report = relay.run().await;

        assert_eq!(report.status, RelayStatus::Done);
        assert!(report.delivered);
        assert!(report.error.is_none());

        let sent = opener.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].0,
            FrameMessage::AuthToken {
                token: SessionToken::new("jwt-1")
            }
        );
        assert_eq!(
            sent[0].1,
            TargetOrigin::Exact("https://app.example.com".into())
        );

        assert!(window.closed.load(Ordering::SeqCst));
        assert_eq!(clock.requested(), vec![DEFAULT_CONFIRM_DELAY]);
    }

    #[tokio::test]
    async fn test_popup_without_opener_is_signed_out() {
        let window = Arc::new(TestWindow::popup(None));
        let relay = AuthRelay::new(signed_in(), window.clone(), RelayTransport::Popup)
            .with_clock(Arc::new(ImmediateClock::new()));

        let report = relay.run().await;

        assert_eq!(report.status, RelayStatus::SignedOut);
        assert!(!report.delivered);
        assert!(report.error.is_none());
        assert!(!window.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_closed_receiver_ends_done_with_error() {
        let opener = Arc::new(RecordingTarget::closed());
        let window = Arc::new(TestWindow::popup(Some(opener)));
        let relay = AuthRelay::new(signed_in(), window.clone(), RelayTransport::Popup)
            .with_clock(Arc::new(ImmediateClock::new()));

        let report = relay.run().await;

        assert_eq!(report.status, RelayStatus::Done);
        assert!(!report.delivered);
        assert!(report.error.unwrap().contains("closed"));
        assert!(!window.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_iframe_uses_parent_wildcard_and_stays_open() {
        let parent = Arc::new(RecordingTarget::default());
        let window = Arc::new(TestWindow::iframe(parent.clone()));
        let clock = Arc::new(ImmediateClock::new());
        let relay = AuthRelay::new(signed_in(), window.clone(), RelayTransport::Iframe)
            .with_clock(clock.clone());

        let report = relay.run().await;

        assert!(report.delivered);
        assert_eq!(parent.messages()[0].1, TargetOrigin::Any);
        assert!(!window.closed.load(Ordering::SeqCst));
        assert_eq!(clock.sleep_count(), 0);
    }

    #[tokio::test]
    async fn test_configured_origin_wins() {
        let parent = Arc::new(RecordingTarget::default());
        let window = Arc::new(TestWindow::iframe(parent.clone()));
        let relay = AuthRelay::new(signed_in(), window, RelayTransport::Iframe)
            .with_target_origin("https://www.host.example");

        relay.run().await;

        assert_eq!(
            parent.messages()[0].1,
            TargetOrigin::Exact("https://www.host.example".into())
        );
    }

    #[tokio::test]
    async fn test_from_config() {
        let parent = Arc::new(RecordingTarget::default());
        let window = Arc::new(TestWindow::iframe(parent.clone()));
        let config = RelayConfig {
            transport: RelayTransport::Iframe,
            target_origin: Some("https://de-classifai.com".into()),
            ..Default::default()
        };

        let report = AuthRelay::from_config(signed_in(), window.clone(), &config)
            .run()
            .await;

        assert!(report.delivered);
        assert_eq!(
            parent.messages()[0].1,
            TargetOrigin::Exact("https://de-classifai.com".into())
        );
        assert!(!window.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_signed_out_and_lookup_errors() {
        let opener = Arc::new(RecordingTarget::default());
        let window = Arc::new(TestWindow::popup(Some(opener.clone())));

        let relay = AuthRelay::new(
            Arc::new(SessionContext::new()),
            window.clone(),
            RelayTransport::Popup,
        );
        assert_eq!(relay.run().await.status, RelayStatus::SignedOut);

        let relay = AuthRelay::new(Arc::new(FailingSource), window, RelayTransport::Popup);
        let report = relay.run().await;
        assert_eq!(report.status, RelayStatus::SignedOut);
        assert_eq!(report.error.as_deref(), Some("refresh token expired"));
        assert!(opener.messages().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_clears_previous_error() {
        let parent = Arc::new(RecordingTarget::default());
        let window = Arc::new(TestWindow::iframe(parent.clone()));
        let relay = AuthRelay::new(Arc::new(FlakySource::default()), window, RelayTransport::Iframe)
            .with_clock(Arc::new(ImmediateClock::new()));

        let first = relay.run().await;
        assert_eq!(first.status, RelayStatus::SignedOut);
        assert_eq!(first.error.as_deref(), Some("network unreachable"));

        let second = relay.run().await;
        assert_eq!(second.status, RelayStatus::Done);
        assert!(second.delivered);
        assert!(second.error.is_none());
        assert!(relay.error().is_none());
        assert_eq!(parent.messages().len(), 1);
    }
}
