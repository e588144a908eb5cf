//! Configuration for the provenance client

use crate::error::{ProvenanceError, Result};
use crate::relay::RelayTransport;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("provenance")
        .join("config.toml")
}

/// Configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ProvenanceError::Config(e.to_string()))
    }

    /// Load from `path` if given, else from the default location if it
    /// exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ProvenanceError::Config(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.registry.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ProvenanceError::Config(format!(
                "registry.base_url must be an http(s) URL, got {:?}",
                self.registry.base_url
            )));
        }
        if self.poller.max_attempts == 0 {
            return Err(ProvenanceError::Config(
                "poller.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Connection to the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry base URL (e.g., "https://registry.example.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Timeout for requests carrying file bytes (blob PUT, multipart
    /// verify and upload), in seconds
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,

    #[serde(default)]
    pub paths: RegistryPaths,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            paths: RegistryPaths::default(),
        }
    }
}

impl RegistryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// Registry endpoint paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryPaths {
    pub presign: String,
    pub commit: String,
    pub verify_hash: String,
    pub verify: String,
    /// Prefix; the record id is appended
    pub job: String,
    /// Prefix; the fingerprint is appended
    pub file_by_hash: String,
    pub direct_upload: String,
    pub health: String,
}

impl Default for RegistryPaths {
    fn default() -> Self {
        Self {
            presign: "/upload-presign".into(),
            commit: "/upload/commit".into(),
            verify_hash: "/verify-hash".into(),
            verify: "/verify".into(),
            job: "/job".into(),
            file_by_hash: "/files/by-hash".into(),
            direct_upload: "/upload".into(),
            health: "/health".into(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_transfer_timeout_secs() -> u64 {
    3_600
}

// ============================================================================
// Status poller
// ============================================================================

/// Anchoring status polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Spacing between polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    /// Polls before giving up and leaving the status pending
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    40
}

// ============================================================================
// Relay
// ============================================================================

/// Cross-origin relay settings for one deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub transport: RelayTransport,

    /// Origin of the receiving window, when known
    #[serde(default)]
    pub target_origin: Option<String>,

    /// Sender origins the host side accepts. Empty accepts any sender.
    /// Entries may use a subdomain wildcard: `https://*.example.com`.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Delay before a popup closes after relaying, in milliseconds
    #[serde(default = "default_confirm_delay_ms")]
    pub confirm_delay_ms: u64,

    /// Layout bridge fallback timer, in milliseconds
    #[serde(default = "default_layout_tick_ms")]
    pub layout_tick_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: RelayTransport::default(),
            target_origin: None,
            allowed_origins: Vec::new(),
            confirm_delay_ms: default_confirm_delay_ms(),
            layout_tick_ms: default_layout_tick_ms(),
        }
    }
}

impl RelayConfig {
    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }

    pub fn layout_tick(&self) -> Duration {
        Duration::from_millis(self.layout_tick_ms)
    }
}

fn default_confirm_delay_ms() -> u64 {
    600
}

fn default_layout_tick_ms() -> u64 {
    1_000
}

// ============================================================================
// Health
// ============================================================================

/// Registry liveness probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval_secs(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_health_interval_secs() -> u64 {
    30
}
