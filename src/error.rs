//! Error types for the provenance client

use thiserror::Error;

/// Provenance client error
///
/// Every variant is scoped to the single operation that produced it. None of
/// them leave the client in an unusable state; callers may always retry by
/// selecting the file again.
#[derive(Debug, Error)]
pub enum ProvenanceError {
    /// File bytes could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No session token is available for an authenticated call
    #[error("Not signed in")]
    NotSignedIn,

    /// Registry refused to issue upload credentials
    #[error("Presign failed ({status}): {message}")]
    Presign { status: u16, message: String },

    /// Blob storage rejected the direct upload
    #[error("Upload transfer failed ({status}): {message}")]
    Transfer { status: u16, message: String },

    /// Registry refused to finalize the record
    #[error("Commit failed ({status}): {message}")]
    Commit { status: u16, message: String },

    /// Every verification tier was inconclusive
    #[error("Verification failed: {0}")]
    Verification(String),

    /// A registration is already running for this upload session
    #[error("A registration is already in progress")]
    RegistrationInProgress,

    /// No file has been selected
    #[error("No file selected")]
    NoFileSelected,

    /// The file selection changed while the registration was in flight
    #[error("File selection changed while registration was in flight")]
    StaleSelection,

    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fingerprint is not a 64 character hex digest
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Registry returned a non-success status outside the registration phases
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for provenance operations
pub type Result<T> = std::result::Result<T, ProvenanceError>;

/// Extract a user-facing message from an error response body.
///
/// Registries report structured errors as `{"detail": ...}` or
/// `{"message": ...}`; those are surfaced verbatim. Anything else falls back
/// to the raw body, then to the bare status.
pub fn server_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["detail", "message", "error"] {
            match value.get(field) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return s.clone(),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_prefers_detail() {
        let body = r#"{"detail": "hash already registered", "message": "ignored"}"#;
        assert_eq!(server_message(409, body), "hash already registered");
    }

    #[test]
    fn test_server_message_structured_detail() {
        let body = r#"{"detail": [{"loc": ["body", "size"], "msg": "field required"}]}"#;
        let msg = server_message(422, body);
        assert!(msg.contains("field required"));
    }

    #[test]
    fn test_server_message_fallbacks() {
        assert_eq!(server_message(502, "Bad Gateway"), "Bad Gateway");
        assert_eq!(server_message(500, "   "), "HTTP 500");
        assert_eq!(server_message(400, r#"{"other": 1}"#), r#"{"other": 1}"#);
    }
}
