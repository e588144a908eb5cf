//! Verification resolver
//!
//! Answers "has this exact file been registered?" through an ordered chain
//! of strategies. The cheap hash-only lookup goes first; the full-content
//! upload is only tried when the cheap tier cannot give an authoritative
//! answer. A definitive "not found" is a successful result.

use crate::client::RegistryClient;
use crate::error::{ProvenanceError, Result};
use crate::file::SelectedFile;
use crate::hash;
use crate::types::{Fingerprint, VerifyReply};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Authoritative answer: the file is (or is not) registered
    Definitive(bool),
    /// No authoritative answer; try the next tier
    Inconclusive(String),
}

/// Which strategy produced the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationTier {
    HashOnly,
    FullContent,
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationTier::HashOnly => write!(f, "hash-only"),
            VerificationTier::FullContent => write!(f, "full-content"),
        }
    }
}

/// Everything a strategy may need, computed once per resolution
pub struct VerifyInput {
    pub file: SelectedFile,
    pub bytes: Bytes,
    pub fingerprint: Fingerprint,
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub matched: bool,
    pub tier: VerificationTier,
    pub fingerprint: Fingerprint,
}

/// One verification tier
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    fn tier(&self) -> VerificationTier;

    /// `Err` only for failures that make every later tier pointless too
    /// (no session, unreadable file). Anything tier-specific is
    /// `Inconclusive`.
    async fn attempt(&self, input: &VerifyInput) -> Result<Resolution>;
}

/// Interpret a verification reply: authoritative only on 2xx with a
/// boolean `found`.
fn judge(reply: VerifyReply, endpoint: &str) -> Resolution {
    match (reply.is_success(), reply.found) {
        (true, Some(found)) => Resolution::Definitive(found),
        (true, None) => Resolution::Inconclusive(format!("{} returned no found flag", endpoint)),
        (false, _) => Resolution::Inconclusive(format!("{} returned HTTP {}", endpoint, reply.status)),
    }
}

/// Errors no later tier can recover from
fn is_fatal(error: &ProvenanceError) -> bool {
    matches!(error, ProvenanceError::NotSignedIn | ProvenanceError::Io(_))
}

/// `POST /verify-hash` with the locally computed fingerprint
pub struct HashOnlyStrategy {
    client: Arc<RegistryClient>,
}

impl HashOnlyStrategy {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolutionStrategy for HashOnlyStrategy {
    fn tier(&self) -> VerificationTier {
        VerificationTier::HashOnly
    }

    async fn attempt(&self, input: &VerifyInput) -> Result<Resolution> {
        match self.client.verify_hash(&input.fingerprint).await {
            Ok(reply) => Ok(judge(reply, "verify-hash")),
            Err(e) if is_fatal(&e) => Err(e),
            Err(e) => Ok(Resolution::Inconclusive(format!("verify-hash: {}", e))),
        }
    }
}

/// `POST /verify` with the whole file
pub struct FullContentStrategy {
    client: Arc<RegistryClient>,
}

impl FullContentStrategy {
    pub fn new(client: Arc<RegistryClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolutionStrategy for FullContentStrategy {
    fn tier(&self) -> VerificationTier {
        VerificationTier::FullContent
    }

    async fn attempt(&self, input: &VerifyInput) -> Result<Resolution> {
        let content_type = input.file.declared_content_type();
        match self
            .client
            .verify_file(input.file.filename(), &content_type, input.bytes.clone())
            .await
        {
            Ok(reply) => Ok(judge(reply, "verify")),
            Err(e) if is_fatal(&e) => Err(e),
            Err(e) => Ok(Resolution::Inconclusive(format!("verify: {}", e))),
        }
    }
}

/// Runs the strategy chain
pub struct VerificationResolver {
    client: Arc<RegistryClient>,
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl VerificationResolver {
    /// Hash-only first, then full content
    pub fn new(client: Arc<RegistryClient>) -> Self {
        let strategies: Vec<Box<dyn ResolutionStrategy>> = vec![
            Box::new(HashOnlyStrategy::new(Arc::clone(&client))),
            Box::new(FullContentStrategy::new(Arc::clone(&client))),
        ];
        Self { client, strategies }
    }

    /// Custom chain, tried in order
    pub fn with_strategies(
        client: Arc<RegistryClient>,
        strategies: Vec<Box<dyn ResolutionStrategy>>,
    ) -> Self {
        Self { client, strategies }
    }

    /// Decide whether `file` matches a registered fingerprint.
    ///
    /// Requires a session. Has no side effects on the registry.
    pub async fn resolve(&self, file: &SelectedFile) -> Result<Verification> {
        self.client.session().require_token()?;

        let bytes = file.read_bytes().await?;
        let fingerprint = hash::fingerprint_offloaded(bytes.clone()).await?;
        let input = VerifyInput {
            file: file.clone(),
            bytes,
            fingerprint,
        };

        let mut last_reason = String::from("no verification strategy configured");
        for strategy in &self.strategies {
            match strategy.attempt(&input).await? {
                Resolution::Definitive(matched) => {
                    info!(
                        hash = %input.fingerprint,
                        tier = %strategy.tier(),
                        matched,
                        "Verification resolved"
                    );
                    return Ok(Verification {
                        matched,
                        tier: strategy.tier(),
                        fingerprint: input.fingerprint,
                    });
                }
                Resolution::Inconclusive(reason) => {
                    debug!(tier = %strategy.tier(), reason = %reason, "Verification tier inconclusive");
                    last_reason = reason;
                }
            }
        }

        Err(ProvenanceError::Verification(last_reason))
    }
}
