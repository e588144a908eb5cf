//! HTTP client for the provenance registry
//!
//! Every authenticated call reads the bearer token from the
//! [`SessionContext`] immediately before the request is built, so a token
//! refreshed or revoked between calls is picked up without rebuilding the
//! client.

use crate::config::RegistryConfig;
use crate::error::{server_message, ProvenanceError, Result};
use crate::session::SessionContext;
use crate::types::*;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{multipart, Body, Client, RequestBuilder, Response};
use tracing::{debug, warn};

/// HTTP client for the registry
///
/// # Example
///
/// ```rust,no_run
/// use provenance_client::{RegistryClient, RegistryConfig, SessionContext, SessionToken};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = SessionContext::with_token(SessionToken::new("eyJhbGciOi..."));
/// let client = RegistryClient::new(
///     RegistryConfig::new("https://registry.example.com"),
///     session,
/// )?;
///
/// let fp = provenance_client::hash::fingerprint(b"hello");
/// let reply = client.verify_hash(&fp).await?;
/// println!("found: {:?}", reply.found);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    session: SessionContext,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(config: RegistryConfig, session: SessionContext) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            config,
            session,
            http,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    // ==================== Registration ====================

    /// Request presigned write credentials
    pub async fn presign(&self, request: &PresignRequest) -> Result<PresignResponse> {
        let url = self.url(&self.config.paths.presign);
        let response = self.authed(self.http.post(&url))?.json(request).send().await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvenanceError::Presign {
                status,
                message: server_message(status, &body),
            });
        }

        // A 2xx without usable credentials is still a failed presign
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProvenanceError::Presign {
            status,
            message: format!("malformed presign response: {}", e),
        })
    }

    /// Write the raw bytes straight to blob storage.
    ///
    /// Sends every header the registry required. The registry's content type
    /// wins over `declared_content_type`, since the presigned signature
    /// covers it. No bearer token goes to blob storage. Bounded by the
    /// transfer timeout rather than the per-call one.
    pub async fn transfer(
        &self,
        presign: &PresignResponse,
        declared_content_type: &str,
        data: Bytes,
    ) -> Result<()> {
        let content_type = presign
            .required_content_type()
            .unwrap_or(declared_content_type);

        let mut request = self.http.put(&presign.url);
        for (name, value) in &presign.headers {
            if name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => request = request.header(name, value),
                _ => warn!(header = %name, "Skipping invalid presigned header"),
            }
        }

        let response = request
            .header(CONTENT_TYPE, content_type)
            .timeout(self.config.transfer_timeout())
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProvenanceError::Transfer {
                status,
                message: server_message(status, &body),
            });
        }

        debug!(key = %presign.key, content_type, "Transferred blob");
        Ok(())
    }

    /// Finalize the record
    pub async fn commit(&self, request: &CommitRequest) -> Result<CommitResponse> {
        let url = self.url(&self.config.paths.commit);
        let response = self.authed(self.http.post(&url))?.json(request).send().await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvenanceError::Commit {
                status,
                message: server_message(status, &body),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProvenanceError::Commit {
            status,
            message: format!("malformed commit response: {}", e),
        })
    }

    /// Single-shot multipart upload; the registry hashes and stores the file
    pub async fn upload_direct(
        &self,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<DirectUploadResponse> {
        let url = self.url(&self.config.paths.direct_upload);
        let form = multipart::Form::new().part("file", file_part(filename, content_type, data)?);

        let mut request = self
            .http
            .post(&url)
            .timeout(self.config.transfer_timeout())
            .multipart(form);
        if let Some(token) = self.session.access_token() {
            request = request.header(AUTHORIZATION, token.bearer());
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    // ==================== Verification ====================

    /// Lightweight existence check by fingerprint
    pub async fn verify_hash(&self, fingerprint: &Fingerprint) -> Result<VerifyReply> {
        let url = self.url(&self.config.paths.verify_hash);
        let body = VerifyHashRequest {
            hash: fingerprint.clone(),
        };
        let response = self.authed(self.http.post(&url))?.json(&body).send().await?;
        read_verify_reply(response).await
    }

    /// Full-content verification; the registry hashes and looks up the file
    pub async fn verify_file(
        &self,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<VerifyReply> {
        let url = self.url(&self.config.paths.verify);
        let form = multipart::Form::new().part("file", file_part(filename, content_type, data)?);
        let response = self
            .authed(self.http.post(&url))?
            .timeout(self.config.transfer_timeout())
            .multipart(form)
            .send()
            .await?;
        read_verify_reply(response).await
    }

    // ==================== Records ====================

    /// Anchoring job status for a committed record
    pub async fn job_status(&self, record_id: &RecordId) -> Result<JobResponse> {
        let url = format!(
            "{}/{}",
            self.url(&self.config.paths.job),
            urlencoding::encode(record_id.as_str())
        );
        let response = self.authed(self.http.get(&url))?.send().await?;
        self.handle_response(response).await
    }

    /// Full record by fingerprint
    pub async fn file_by_hash(&self, fingerprint: &Fingerprint) -> Result<FileRecord> {
        let url = format!(
            "{}/{}",
            self.url(&self.config.paths.file_by_hash),
            fingerprint
        );
        let response = self.authed(self.http.get(&url))?.send().await?;
        self.handle_response(response).await
    }

    /// Unauthenticated liveness probe
    pub async fn health(&self) -> Result<bool> {
        let url = self.url(&self.config.paths.health);
        let response = self.http.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    // ==================== Helper Methods ====================

    fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Attach the current bearer token, read fresh from the session
    fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.session.require_token()?;
        Ok(request.header(AUTHORIZATION, token.bearer()))
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProvenanceError::Server {
                status,
                message: server_message(status, &body),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Multipart file field over the shared buffer, without copying it
fn file_part(filename: &str, content_type: &str, data: Bytes) -> Result<multipart::Part> {
    let length = data.len() as u64;
    Ok(multipart::Part::stream_with_length(Body::from(data), length)
        .file_name(filename.to_string())
        .mime_str(content_type)?)
}

/// Read a verification response without judging it: the caller decides
/// whether a non-2xx or a missing flag is conclusive.
async fn read_verify_reply(response: Response) -> Result<VerifyReply> {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let found = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("found").and_then(serde_json::Value::as_bool));
    Ok(VerifyReply { status, found })
}

// ============================================================================
// Seams for the background components
// ============================================================================

/// Source of anchoring progress (allows mocking in tests)
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn job_status(&self, record_id: &RecordId) -> Result<JobResponse>;
    async fn file_by_hash(&self, fingerprint: &Fingerprint) -> Result<FileRecord>;
}

#[async_trait]
impl JobSource for RegistryClient {
    async fn job_status(&self, record_id: &RecordId) -> Result<JobResponse> {
        RegistryClient::job_status(self, record_id).await
    }

    async fn file_by_hash(&self, fingerprint: &Fingerprint) -> Result<FileRecord> {
        RegistryClient::file_by_hash(self, fingerprint).await
    }
}

/// Registry liveness probe (allows mocking in tests)
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `true` when the registry answered with a success status
    async fn probe(&self) -> bool;
}

#[async_trait]
impl HealthProbe for RegistryClient {
    async fn probe(&self) -> bool {
        match self.health().await {
            Ok(ok) => ok,
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }
}
