//! Session context and the authentication gate
//!
//! The session token lives in one explicit `SessionContext` that is handed to
//! every component needing it. Components read the token at call time and
//! may subscribe to changes; nothing holds a private copy.

use crate::error::{ProvenanceError, Result};
use crate::relay::{FrameMessage, FrameTarget, TargetOrigin};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Opaque bearer credential issued by the authentication provider.
///
/// Held in memory only. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value, for the Authorization header only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Shared authentication state.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<Option<SessionToken>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    /// Create a signed-out context
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a context that starts signed in
    pub fn with_token(token: SessionToken) -> Self {
        let ctx = Self::new();
        ctx.sign_in(token);
        ctx
    }

    pub fn sign_in(&self, token: SessionToken) {
        self.tx.send_replace(Some(token));
        debug!("Session token updated");
    }

    pub fn sign_out(&self) {
        if self.tx.send_replace(None).is_some() {
            debug!("Session cleared");
        }
    }

    /// Current token, read at call time
    pub fn access_token(&self) -> Option<SessionToken> {
        self.tx.borrow().clone()
    }

    /// Current token, or `NotSignedIn`
    pub fn require_token(&self) -> Result<SessionToken> {
        self.access_token().ok_or(ProvenanceError::NotSignedIn)
    }

    pub fn is_signed_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Receive a notification on every sign-in or sign-out
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionToken>> {
        self.tx.subscribe()
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

// ============================================================================
// Gate
// ============================================================================

/// What the gated UI should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Session not evaluated yet; render nothing
    Checking,
    Authed,
    Anon,
}

/// Tracks the session and decides whether gated content is shown.
///
/// When embedded, every change of auth state asks the parent frame to
/// scroll back to the top of the embed.
pub struct Gate {
    session: SessionContext,
    parent: Option<Arc<dyn FrameTarget>>,
    state: watch::Sender<AuthState>,
}

impl Gate {
    pub fn new(session: SessionContext) -> Self {
        let (state, _rx) = watch::channel(AuthState::Checking);
        Self {
            session,
            parent: None,
            state,
        }
    }

    /// Attach the parent frame that receives scroll hints
    pub fn with_parent(mut self, parent: Arc<dyn FrameTarget>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Evaluate the current session without waiting for changes
    pub fn check(&self) -> AuthState {
        let next = if self.session.is_signed_in() {
            AuthState::Authed
        } else {
            AuthState::Anon
        };
        self.state.send_replace(next);
        next
    }

    /// Follow session changes until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut changes = self.session.subscribe();
        changes.mark_unchanged();
        self.check();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = self.check();
                    debug!(?state, "Auth state changed");
                    self.hint_scroll_top();
                }
            }
        }
    }

    fn hint_scroll_top(&self) {
        if let Some(parent) = &self.parent {
            if let Err(e) = parent.post_message(&FrameMessage::ScrollTop, &TargetOrigin::Any) {
                warn!(error = %e, "Failed to send scroll hint to parent");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RecordingTarget;

    #[test]
    fn test_token_debug_redacted() {
        let token = SessionToken::new("secret-jwt");
        assert!(!format!("{:?}", token).contains("secret"));
        assert_eq!(token.bearer(), "Bearer secret-jwt");
    }

    #[test]
    fn test_context_shared_between_clones() {
        let ctx = SessionContext::new();
        let other = ctx.clone();
        assert!(matches!(ctx.require_token(), Err(ProvenanceError::NotSignedIn)));

        other.sign_in(SessionToken::new("t1"));
        assert_eq!(ctx.access_token().unwrap().expose(), "t1");

        ctx.sign_out();
        assert!(!other.is_signed_in());
    }

    #[tokio::test]
    async fn test_subscription_sees_changes() {
        let ctx = SessionContext::new();
        let mut rx = ctx.subscribe();

        ctx.sign_in(SessionToken::new("t2"));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());
    }

    #[test]
    fn test_gate_check() {
        let ctx = SessionContext::new();
        let gate = Gate::new(ctx.clone());
        assert_eq!(gate.state(), AuthState::Checking);
        assert_eq!(gate.check(), AuthState::Anon);

        ctx.sign_in(SessionToken::new("t"));
        assert_eq!(gate.check(), AuthState::Authed);
    }

    #[tokio::test]
    async fn test_gate_posts_scroll_hint_on_change() {
        let ctx = SessionContext::new();
        let parent = Arc::new(RecordingTarget::default());
        let gate = Arc::new(Gate::new(ctx.clone()).with_parent(parent.clone()));
        let mut states = gate.subscribe();
        let cancel = CancellationToken::new();

        let runner = {
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.run(cancel).await })
        };

        states.wait_for(|s| *s == AuthState::Anon).await.unwrap();
        ctx.sign_in(SessionToken::new("t"));
        states.wait_for(|s| *s == AuthState::Authed).await.unwrap();

        cancel.cancel();
        runner.await.unwrap();

        let sent = parent.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, FrameMessage::ScrollTop);
    }
}
