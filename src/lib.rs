//! Client for content-addressed file provenance
//!
//! Registers files against a provenance registry by SHA-256 fingerprint,
//! verifies later copies against those registrations, watches anchoring
//! progress, and relays session and layout state when embedded in a
//! cross-origin host page.
//!
//! # Example
//!
//! ```rust,no_run
//! use provenance_client::{
//!     RegistryClient, RegistryConfig, SelectedFile, SessionContext, SessionToken,
//!     UploadOrchestrator, VerificationResolver,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionContext::with_token(SessionToken::new("eyJhbGciOi..."));
//! let client = Arc::new(RegistryClient::new(
//!     RegistryConfig::new("https://registry.example.com"),
//!     session,
//! )?);
//!
//! // Register, then watch anchoring in the background
//! let uploads = UploadOrchestrator::new(client.clone());
//! let (registration, watch) = uploads
//!     .register_and_watch(SelectedFile::from_path("photo.jpg"))
//!     .await?;
//! println!("registered {} as {}", registration.fingerprint, registration.record_id);
//!
//! // Later: check a copy
//! let resolver = VerificationResolver::new(client);
//! let result = resolver.resolve(&SelectedFile::from_path("copy.jpg")).await?;
//! println!("matched: {} ({})", result.matched, result.tier);
//!
//! let outcome = watch.join().await;
//! println!("anchoring: {}", outcome.status());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod health;
pub mod poller;
pub mod relay;
pub mod session;
pub mod types;
pub mod upload;
pub mod verify;

// Re-export main types
pub use client::{HealthProbe, JobSource, RegistryClient};
pub use clock::{Clock, ImmediateClock, TokioClock};
pub use config::{Config, HealthConfig, PollerConfig, RegistryConfig, RegistryPaths, RelayConfig};
pub use error::{ProvenanceError, Result};
pub use file::SelectedFile;
pub use health::{HealthHandle, HealthMonitor};
pub use poller::{PollHandle, PollOutcome, StatusPoller};
pub use session::{AuthState, Gate, SessionContext, SessionToken};
pub use types::*;
pub use upload::{Registration, UploadOrchestrator, UploadSession};
pub use verify::{Verification, VerificationResolver, VerificationTier};
