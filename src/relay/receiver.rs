//! Host side of the relay: accepts messages from the embedded app

use super::{FrameMessage, Inbound};
use crate::config::RelayConfig;
use crate::session::SessionContext;
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowedOrigin {
    Exact(String),
    /// `https://*.example.com`: any subdomain of `example.com` over `https`
    Subdomain { scheme: String, suffix: String },
}

impl AllowedOrigin {
    fn parse(pattern: &str) -> Option<Self> {
        let pattern = pattern.trim().trim_end_matches('/');
        if pattern.is_empty() {
            return None;
        }

        let (scheme, host) = pattern.split_once("://")?;
        match host.strip_prefix("*.") {
            Some(suffix) if !suffix.is_empty() => Some(Self::Subdomain {
                scheme: scheme.to_ascii_lowercase(),
                suffix: suffix.to_ascii_lowercase(),
            }),
            Some(_) => None,
            None => Some(Self::Exact(pattern.to_ascii_lowercase())),
        }
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Exact(o) => o == origin,
            Self::Subdomain { scheme, suffix } => {
                let Some((s, host)) = origin.split_once("://") else {
                    return false;
                };
                s == scheme
                    && host
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|sub| sub.len() > 1 && sub.ends_with('.'))
            }
        }
    }
}

/// Which sender origins are trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    /// The legitimate origin cannot be known; accept every sender
    Unconstrained,
    /// Accept only these origins (exact or `scheme://*.suffix`)
    Allow(Vec<String>),
}

impl OriginPolicy {
    /// Build a policy from configured patterns. No patterns means the
    /// legitimate origin is unknown.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            Self::Unconstrained
        } else {
            Self::Allow(patterns)
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Unconstrained => true,
            Self::Allow(patterns) => {
                let origin = origin.trim().trim_end_matches('/').to_ascii_lowercase();
                patterns
                    .iter()
                    .filter_map(|p| AllowedOrigin::parse(p))
                    .any(|allowed| allowed.matches(&origin))
            }
        }
    }
}

/// What the host should do with a delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A session token was received and applied to the session
    Authenticated,
    /// Resize the embedding frame to this height
    Resize(u32),
    /// Scroll the embedding frame into view
    ScrollTop,
    /// Unrecognised or malformed message
    Ignored,
    /// Sender origin is not trusted
    Rejected,
}

/// Validates and applies messages posted by the embedded app
pub struct RelayReceiver {
    policy: OriginPolicy,
    session: SessionContext,
}

impl RelayReceiver {
    pub fn new(policy: OriginPolicy, session: SessionContext) -> Self {
        Self { policy, session }
    }

    /// Receiver trusting the configured sender origins
    pub fn from_config(config: &RelayConfig, session: SessionContext) -> Self {
        Self::new(OriginPolicy::from_patterns(&config.allowed_origins), session)
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Handle one `message` event
    pub fn receive(&self, origin: &str, payload: &Value) -> Delivery {
        let message = match FrameMessage::parse(payload) {
            Inbound::Message(m) => m,
            Inbound::Ignored => return Delivery::Ignored,
        };

        if !self.policy.allows(origin) {
            warn!(origin, kind = message.kind(), "Dropping message from untrusted origin");
            return Delivery::Rejected;
        }

        match message {
            FrameMessage::AuthToken { token } => {
                self.session.sign_in(token);
                info!(origin, "Accepted relayed session");
                Delivery::Authenticated
            }
            FrameMessage::EmbedResize { height } => {
                debug!(origin, height, "Embed resize");
                Delivery::Resize(height)
            }
            FrameMessage::ScrollTop => Delivery::ScrollTop,
        }
    }
}
