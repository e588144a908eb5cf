//! Wire and domain types shared by the registry client and the components

use crate::error::ProvenanceError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Fingerprint
// ============================================================================

/// Length of a rendered SHA-256 digest
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Content fingerprint: a SHA-256 digest rendered as lowercase hex.
///
/// This is the sole correlation key between a locally hashed file and its
/// record on the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Build from a raw 32 byte digest
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("sha256-").unwrap_or(s);
        if s.len() != FINGERPRINT_HEX_LEN || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProvenanceError::InvalidFingerprint(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ProvenanceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Record identifiers and anchoring status
// ============================================================================

/// Registry-issued identifier for a committed record.
///
/// Registries hand these out as either strings or integers; both are kept
/// as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => RecordId(s),
            Raw::Number(n) => RecordId(n.to_string()),
        })
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Anchoring progress of a record, as observed by polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchoringStatus {
    Queued,
    Processing,
    Anchored,
    /// Unknown or not yet reported
    Pending,
}

impl AnchoringStatus {
    /// Map a registry job state string. Unknown states are `Pending`.
    pub fn from_state(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "processing" | "submitted" | "running" => Self::Processing,
            "anchored" | "confirmed" => Self::Anchored,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Anchored)
    }
}

impl fmt::Display for AnchoringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Anchored => "anchored",
            Self::Pending => "pending",
        };
        f.write_str(s)
    }
}

/// Ledger anchoring details reported by the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorInfo {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

impl AnchorInfo {
    pub fn status(&self) -> AnchoringStatus {
        self.state
            .as_deref()
            .map(AnchoringStatus::from_state)
            .unwrap_or(AnchoringStatus::Pending)
    }
}

/// Read `anchored` as either the detailed object or a bare flag.
///
/// `true` means anchored; `false` carries no state, so it reads as pending.
fn anchor_info<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<AnchorInfo>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Info(AnchorInfo),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Info(info)) => Some(info),
        Some(Raw::Flag(true)) => Some(AnchorInfo {
            state: Some(AnchoringStatus::Anchored.to_string()),
            ..Default::default()
        }),
        Some(Raw::Flag(false)) => Some(AnchorInfo::default()),
    })
}

/// Response from `GET /job/{record_id}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobResponse {
    #[serde(default, deserialize_with = "anchor_info")]
    pub anchored: Option<AnchorInfo>,
}

impl JobResponse {
    pub fn status(&self) -> AnchoringStatus {
        self.anchored
            .as_ref()
            .map(AnchorInfo::status)
            .unwrap_or(AnchoringStatus::Pending)
    }
}

// ============================================================================
// File records
// ============================================================================

/// Width and height of an image or video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaDimensions {
    pub width: u32,
    pub height: u32,
}

/// A committed file record, as returned by `GET /files/by-hash/{sha256}`.
///
/// Immutable except for its anchoring details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub sha256: Fingerprint,
    #[serde(default, alias = "filename")]
    pub original_filename: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content_type: String,
    #[serde(default, rename = "key", alias = "storage_key")]
    pub storage_key: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(
        default,
        deserialize_with = "anchor_info",
        skip_serializing_if = "Option::is_none"
    )]
    pub anchored: Option<AnchorInfo>,
}

/// RFC 3339 first; a timestamp without an offset is taken as UTC.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

impl FileRecord {
    pub fn dimensions(&self) -> Option<MediaDimensions> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(MediaDimensions { width, height }),
            _ => None,
        }
    }

    pub fn anchoring_status(&self) -> AnchoringStatus {
        self.anchored
            .as_ref()
            .map(AnchorInfo::status)
            .unwrap_or(AnchoringStatus::Pending)
    }
}

// ============================================================================
// Registration wire types
// ============================================================================

/// Body of `POST /upload-presign`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresignRequest {
    pub sha256: Fingerprint,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Presigned write credentials
#[derive(Debug, Clone, Deserialize)]
pub struct PresignResponse {
    pub url: String,
    pub key: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl PresignResponse {
    /// Content type the presigned write was signed for, if the registry fixed one
    pub fn required_content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}

/// Body of `POST /upload/commit`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRequest {
    pub sha256: Fingerprint,
    pub key: String,
    pub size: u64,
    pub content_type: String,
    pub original_filename: String,
}

/// Response from `POST /upload/commit`
#[derive(Debug, Clone, Deserialize)]
pub struct CommitResponse {
    pub record_id: RecordId,
}

/// Body of `POST /verify-hash`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyHashRequest {
    pub hash: Fingerprint,
}

/// Raw outcome of a verification endpoint: the status code and the `found`
/// flag when the body carried a well-formed boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReply {
    pub status: u16,
    pub found: Option<bool>,
}

impl VerifyReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Response from the single-shot `POST /upload`
#[derive(Debug, Clone, Deserialize)]
pub struct DirectUploadResponse {
    #[serde(default)]
    pub sha256: Option<Fingerprint>,
    #[serde(default)]
    pub record_id: Option<RecordId>,
}

/// Registry liveness as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Checking,
    Online,
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_fingerprint_parse_normalizes() {
        let upper = HELLO.to_ascii_uppercase();
        let fp: Fingerprint = upper.parse().unwrap();
        assert_eq!(fp.as_str(), HELLO);

        let prefixed: Fingerprint = format!("sha256-{}", HELLO).parse().unwrap();
        assert_eq!(prefixed, fp);
    }

    #[test]
    fn test_fingerprint_rejects_bad_input() {
        assert!("abc".parse::<Fingerprint>().is_err());
        assert!(HELLO.replace('2', "z").parse::<Fingerprint>().is_err());
        assert!(serde_json::from_str::<Fingerprint>("\"nothex\"").is_err());
    }

    #[test]
    fn test_record_id_accepts_numbers_and_strings() {
        let n: CommitResponse = serde_json::from_str(r#"{"record_id": 42}"#).unwrap();
        assert_eq!(n.record_id.as_str(), "42");

        let s: CommitResponse = serde_json::from_str(r#"{"record_id": "rec_9"}"#).unwrap();
        assert_eq!(s.record_id, RecordId::new("rec_9"));
    }

    #[test]
    fn test_job_status_mapping() {
        let job: JobResponse =
            serde_json::from_str(r#"{"anchored": {"state": "processing"}}"#).unwrap();
        assert_eq!(job.status(), AnchoringStatus::Processing);

        let job: JobResponse = serde_json::from_str(
            r#"{"anchored": {"state": "anchored", "tx_hash": "0xabc", "explorer_url": "https://x/tx/0xabc"}}"#,
        )
        .unwrap();
        assert!(job.status().is_terminal());
        assert_eq!(job.anchored.unwrap().tx_hash.as_deref(), Some("0xabc"));

        let job: JobResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(job.status(), AnchoringStatus::Pending);

        assert_eq!(AnchoringStatus::from_state("weird"), AnchoringStatus::Pending);
    }

    #[test]
    fn test_file_record_lenient() {
        let json = serde_json::json!({
            "sha256": HELLO,
            "original_filename": "hello.txt",
            "size": 5,
            "content_type": "text/plain",
            "key": "uploads/2cf2/hello.txt",
            "created_at": "2025-01-02T03:04:05Z",
            "width": 640,
            "height": 480,
            "anchored": {"state": "anchored"},
            "unexpected": true
        });
        let record: FileRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.storage_key, "uploads/2cf2/hello.txt");
        assert_eq!(
            record.dimensions(),
            Some(MediaDimensions { width: 640, height: 480 })
        );
        assert_eq!(record.anchoring_status(), AnchoringStatus::Anchored);
        assert!(record.created_at.is_some());
    }

    #[test]
    fn test_anchored_flag() {
        let job: JobResponse = serde_json::from_str(r#"{"anchored": true}"#).unwrap();
        assert_eq!(job.status(), AnchoringStatus::Anchored);

        let job: JobResponse = serde_json::from_str(r#"{"anchored": false}"#).unwrap();
        assert_eq!(job.status(), AnchoringStatus::Pending);

        let job: JobResponse = serde_json::from_str(r#"{"anchored": null}"#).unwrap();
        assert!(job.anchored.is_none());

        let record: FileRecord =
            serde_json::from_value(serde_json::json!({"sha256": HELLO, "anchored": true}))
                .unwrap();
        assert_eq!(record.anchoring_status(), AnchoringStatus::Anchored);
    }

    #[test]
    fn test_created_at_without_offset_is_utc() {
        let record: FileRecord = serde_json::from_value(serde_json::json!({
            "sha256": HELLO,
            "created_at": "2025-01-02T03:04:05.123456"
        }))
        .unwrap();
        let ts = record.created_at.unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-02T03:04:05.123456+00:00");

        let offset: FileRecord = serde_json::from_value(serde_json::json!({
            "sha256": HELLO,
            "created_at": "2025-01-02T05:04:05+02:00"
        }))
        .unwrap();
        assert_eq!(
            offset.created_at.unwrap().to_rfc3339(),
            "2025-01-02T03:04:05+00:00"
        );

        let missing: FileRecord =
            serde_json::from_value(serde_json::json!({"sha256": HELLO, "created_at": null}))
                .unwrap();
        assert!(missing.created_at.is_none());

        assert!(serde_json::from_value::<FileRecord>(
            serde_json::json!({"sha256": HELLO, "created_at": "yesterday"})
        )
        .is_err());
    }

    #[test]
    fn test_required_content_type_case_insensitive() {
        let presign: PresignResponse = serde_json::from_str(
            r#"{"url": "https://s3/put", "key": "k", "headers": {"content-type": "image/png"}}"#,
        )
        .unwrap();
        assert_eq!(presign.required_content_type(), Some("image/png"));

        let bare: PresignResponse =
            serde_json::from_str(r#"{"url": "https://s3/put", "key": "k"}"#).unwrap();
        assert_eq!(bare.required_content_type(), None);
    }
}
