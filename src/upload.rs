//! Upload orchestrator
//!
//! Registration is three strictly ordered phases against two different
//! services:
//!
//! 1. **Presign**: ask the registry for write credentials
//! 2. **Transfer**: `PUT` the bytes straight to blob storage
//! 3. **Commit**: tell the registry the blob is in place
//!
//! A file counts as registered only once Commit succeeds. There is no
//! rollback: a blob transferred before a failed commit is left for the
//! registry to collect. Nothing is retried automatically.
//!
//! The orchestrator owns one [`UploadSession`]. Selecting a new file bumps
//! the selection generation; a registration that finishes for an older
//! generation is discarded instead of being reported as registered.

use crate::client::RegistryClient;
use crate::error::{ProvenanceError, Result};
use crate::file::SelectedFile;
use crate::hash;
use crate::poller::{PollHandle, StatusPoller};
use crate::types::{CommitRequest, DirectUploadResponse, Fingerprint, PresignRequest, RecordId};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Client-local state of the current selection
#[derive(Debug, Clone, Default)]
pub struct UploadSession {
    pub file: Option<SelectedFile>,
    /// None until computed for the current selection
    pub fingerprint: Option<Fingerprint>,
    pub uploading: bool,
    /// Record of the last successful registration
    pub record_id: Option<RecordId>,
    /// Bumped on every selection change
    pub generation: u64,
}

impl UploadSession {
    fn reset_selection(&mut self, file: Option<SelectedFile>) {
        self.file = file;
        self.fingerprint = None;
        self.uploading = false;
        self.record_id = None;
        self.generation += 1;
    }
}

/// A successfully committed registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub record_id: RecordId,
    pub fingerprint: Fingerprint,
    pub storage_key: String,
    pub filename: String,
    /// Effective content type (the one blob storage required)
    pub content_type: String,
    pub size: u64,
}

/// Drives registration for one upload session
pub struct UploadOrchestrator {
    client: Arc<RegistryClient>,
    poller: StatusPoller,
    session: Mutex<UploadSession>,
}

impl UploadOrchestrator {
    /// Orchestrator that watches anchoring through `client` with default
    /// poll settings
    pub fn new(client: Arc<RegistryClient>) -> Self {
        let poller = StatusPoller::new(client.clone(), Default::default());
        Self {
            client,
            poller,
            session: Mutex::new(UploadSession::default()),
        }
    }

    pub fn with_poller(mut self, poller: StatusPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn client(&self) -> &Arc<RegistryClient> {
        &self.client
    }

    /// Copy of the current session state
    pub fn snapshot(&self) -> UploadSession {
        self.state().clone()
    }

    /// Select a new file. Discards the previous fingerprint and record id
    /// and invalidates any registration still in flight.
    pub fn select(&self, file: SelectedFile) -> u64 {
        let mut state = self.state();
        state.reset_selection(Some(file));
        debug!(generation = state.generation, "File selected");
        state.generation
    }

    /// Drop the current selection
    pub fn clear(&self) {
        self.state().reset_selection(None);
    }

    /// Select `file` and register it
    pub async fn register(&self, file: SelectedFile) -> Result<Registration> {
        self.select(file);
        self.register_selected().await
    }

    /// Register `file`, then watch its anchoring in the background.
    ///
    /// Dropping the returned handle stops the watch.
    pub async fn register_and_watch(
        &self,
        file: SelectedFile,
    ) -> Result<(Registration, PollHandle)> {
        let registration = self.register(file).await?;
        let handle = self
            .poller
            .spawn(registration.record_id.clone(), registration.fingerprint.clone());
        Ok((registration, handle))
    }

    /// Register the currently selected file.
    ///
    /// On success the record id is kept and the selection is reset for the
    /// next file. On failure the selection stays so the caller can retry.
    pub async fn register_selected(&self) -> Result<Registration> {
        self.client.session().require_token()?;

        let (file, generation) = {
            let mut state = self.state();
            if state.uploading {
                return Err(ProvenanceError::RegistrationInProgress);
            }
            let file = state.file.clone().ok_or(ProvenanceError::NoFileSelected)?;
            state.uploading = true;
            state.record_id = None;
            (file, state.generation)
        };

        let result = self.run_phases(&file, generation).await;

        let mut state = self.state();
        if state.generation != generation {
            match &result {
                Ok(r) => warn!(record_id = %r.record_id, "Discarding registration for a replaced selection"),
                Err(e) => debug!(error = %e, "Discarding failure for a replaced selection"),
            }
            return Err(ProvenanceError::StaleSelection);
        }
        state.uploading = false;

        let registration = result?;
        state.file = None;
        state.fingerprint = None;
        state.record_id = Some(registration.record_id.clone());
        Ok(registration)
    }

    async fn run_phases(&self, file: &SelectedFile, generation: u64) -> Result<Registration> {
        let bytes = file.read_bytes().await?;
        let fingerprint = hash::fingerprint_offloaded(bytes.clone()).await?;
        {
            let mut state = self.state();
            if state.generation == generation {
                state.fingerprint = Some(fingerprint.clone());
            }
        }

        let size = bytes.len() as u64;
        let declared = file.declared_content_type();
        let filename = file.filename().to_string();

        let presign = self
            .client
            .presign(&PresignRequest {
                sha256: fingerprint.clone(),
                filename: filename.clone(),
                content_type: declared.clone(),
                size,
            })
            .await?;
        debug!(hash = %fingerprint, key = %presign.key, "Presigned");

        let content_type = presign
            .required_content_type()
            .unwrap_or(&declared)
            .to_string();
        self.client
            .transfer(&presign, &declared, bytes.clone())
            .await?;

        let commit = self
            .client
            .commit(&CommitRequest {
                sha256: fingerprint.clone(),
                key: presign.key.clone(),
                size,
                content_type: content_type.clone(),
                original_filename: filename.clone(),
            })
            .await?;

        info!(
            record_id = %commit.record_id,
            hash = %fingerprint,
            size,
            content_type = %content_type,
            "Registered file"
        );

        Ok(Registration {
            record_id: commit.record_id,
            fingerprint,
            storage_key: presign.key,
            filename,
            content_type,
            size,
        })
    }

    /// Single-shot multipart upload; the registry computes the fingerprint.
    ///
    /// Does not touch the upload session.
    pub async fn upload_direct(&self, file: &SelectedFile) -> Result<DirectUploadResponse> {
        let bytes = file.read_bytes().await?;
        let response = self
            .client
            .upload_direct(file.filename(), &file.declared_content_type(), bytes)
            .await?;
        info!(hash = ?response.sha256.as_ref().map(Fingerprint::as_str), "Uploaded file directly");
        Ok(response)
    }

    fn state(&self) -> MutexGuard<'_, UploadSession> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
