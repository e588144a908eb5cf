//! Session relay across a cross-origin boundary
//!
//! Two halves run inside the embedded app:
//! - [`AuthRelay`] forwards the session token to the opener or parent window
//! - [`LayoutBridge`] keeps the host informed of the document height
//!
//! [`RelayReceiver`] is the matching host-side handler. Browser objects
//! (windows, document metrics) are reached through small traits so the state
//! machines stay independent of any particular host binding.
//!
//! Relay is best-effort. Failures are logged and reflected in state, never
//! propagated; the host page owns any timeout for messages it never gets.

mod auth;
mod layout;
mod message;
mod receiver;

pub use auth::{AuthRelay, EmbeddingWindow, RelayReport, RelayStatus, SessionSource};
pub use layout::{BridgeHandle, DocumentMetrics, LayoutBridge, LayoutTrigger};
pub use message::{
    FrameMessage, Inbound, TargetOrigin, AUTH_MESSAGE_TYPE, LEGACY_RESIZE_MESSAGE_TYPE,
    RESIZE_MESSAGE_TYPE, SCROLL_TOP_MESSAGE_TYPE,
};
pub use receiver::{Delivery, OriginPolicy, RelayReceiver};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relay failure. Never escapes the relay state machines.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Receiving window was closed or navigated away
    #[error("Receiving window is closed")]
    WindowClosed,

    /// The host binding refused the message
    #[error("postMessage failed: {0}")]
    PostFailed(String),
}

/// A window that can receive posted messages (opener or parent)
pub trait FrameTarget: Send + Sync {
    fn post_message(
        &self,
        message: &FrameMessage,
        target_origin: &TargetOrigin,
    ) -> Result<(), RelayError>;
}

/// How the embedded app is attached to the host page.
///
/// One transport is chosen per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayTransport {
    /// Opened with `window.open`; relays to the opener, then closes itself
    #[default]
    Popup,
    /// Rendered in an iframe; relays to the parent and stays open
    Iframe,
}

#[cfg(test)]
pub(crate) use test_support::RecordingTarget;

#[cfg(test)]
mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Records every posted message; can be told to fail
    #[derive(Default)]
    pub(crate) struct RecordingTarget {
        sent: Mutex<Vec<(FrameMessage, TargetOrigin)>>,
        closed: AtomicBool,
    }

    impl RecordingTarget {
        pub(crate) fn closed() -> Self {
            let target = Self::default();
            target.closed.store(true, Ordering::SeqCst);
            target
        }

        pub(crate) fn messages(&self) -> Vec<(FrameMessage, TargetOrigin)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl FrameTarget for RecordingTarget {
        fn post_message(
            &self,
            message: &FrameMessage,
            target_origin: &TargetOrigin,
        ) -> Result<(), RelayError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(RelayError::WindowClosed);
            }
            self.sent
                .lock()
                .unwrap()
                .push((message.clone(), target_origin.clone()));
            Ok(())
        }
    }
}
