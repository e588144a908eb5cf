//! Cross-frame message contract
//!
//! Messages are JSON objects tagged by `type`. The set of recognised tags is
//! closed; anything else is ignored on receipt rather than treated as an
//! error, since host pages and browser extensions post unrelated messages to
//! the same window.

use crate::session::SessionToken;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Tag for an auth-token relay
pub const AUTH_MESSAGE_TYPE: &str = "declassifai-auth";
/// Tag for an embed height notification
pub const RESIZE_MESSAGE_TYPE: &str = "declassifai:resize";
/// Older tag for embed height, still posted by the standalone upload embed
pub const LEGACY_RESIZE_MESSAGE_TYPE: &str = "DECLASSIFAI_EMBED_HEIGHT";
/// Tag for a scroll-to-top hint
pub const SCROLL_TOP_MESSAGE_TYPE: &str = "declassifai:scrollTop";

/// A message exchanged between the embedded app and its host page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum FrameMessage {
    #[serde(rename = "declassifai-auth")]
    AuthToken { token: SessionToken },

    #[serde(rename = "declassifai:resize")]
    EmbedResize { height: u32 },

    #[serde(rename = "declassifai:scrollTop")]
    ScrollTop,
}

/// Result of decoding an inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(FrameMessage),
    /// Unrecognised tag or malformed payload; a no-op for the receiver
    Ignored,
}

impl FrameMessage {
    /// Decode an inbound payload.
    ///
    /// Never fails: unknown tags, missing fields and non-object payloads all
    /// decode to `Inbound::Ignored`.
    pub fn parse(payload: &Value) -> Inbound {
        let Some(kind) = payload.get("type").and_then(Value::as_str) else {
            return Inbound::Ignored;
        };

        let message = match kind {
            AUTH_MESSAGE_TYPE => payload
                .get("token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(|t| FrameMessage::AuthToken {
                    token: SessionToken::new(t),
                }),
            RESIZE_MESSAGE_TYPE | LEGACY_RESIZE_MESSAGE_TYPE => payload
                .get("height")
                .and_then(Value::as_f64)
                .filter(|h| h.is_finite() && *h >= 0.0)
                .map(|h| FrameMessage::EmbedResize {
                    height: h.round().min(u32::MAX as f64) as u32,
                }),
            SCROLL_TOP_MESSAGE_TYPE => Some(FrameMessage::ScrollTop),
            other => {
                debug!(kind = other, "Ignoring unrecognised frame message");
                None
            }
        };

        match message {
            Some(m) => Inbound::Message(m),
            None => Inbound::Ignored,
        }
    }

    /// Encode for posting
    pub fn to_value(&self) -> Value {
        // Strings and integers only; cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FrameMessage::AuthToken { .. } => AUTH_MESSAGE_TYPE,
            FrameMessage::EmbedResize { .. } => RESIZE_MESSAGE_TYPE,
            FrameMessage::ScrollTop => SCROLL_TOP_MESSAGE_TYPE,
        }
    }
}

/// Origin a posted message is restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    /// Deliver only if the receiving window has this origin
    Exact(String),
    /// `"*"`: used only where the legitimate origin cannot be known
    Any,
}

impl TargetOrigin {
    /// Exact origin when one is known, wildcard otherwise
    pub fn from_known(origin: Option<&str>) -> Self {
        match origin.map(str::trim).filter(|o| !o.is_empty() && *o != "*") {
            Some(o) => TargetOrigin::Exact(o.trim_end_matches('/').to_string()),
            None => TargetOrigin::Any,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TargetOrigin::Exact(o) => o,
            TargetOrigin::Any => "*",
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
