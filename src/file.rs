//! File handles selected for registration or verification

use crate::error::Result;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Content type used when none is declared and none can be guessed
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file chosen by the user.
///
/// The handle is cheap to clone; bytes are only read when an operation needs
/// them.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    source: FileSource,
    filename: String,
    content_type: Option<String>,
}

impl SelectedFile {
    /// Select a file on disk
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Self {
            source: FileSource::Path(path),
            filename,
            content_type: None,
        }
    }

    /// Select an in-memory buffer
    pub fn from_bytes(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            source: FileSource::Memory(data.into()),
            filename: filename.into(),
            content_type: None,
        }
    }

    /// Override the declared content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let ct = content_type.into();
        self.content_type = if ct.trim().is_empty() { None } else { Some(ct) };
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Declared content type: explicit, else guessed from the filename,
    /// else `application/octet-stream`.
    pub fn declared_content_type(&self) -> String {
        if let Some(ref ct) = self.content_type {
            return ct.clone();
        }
        mime_guess::from_path(&self.filename)
            .first_raw()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string()
    }

    /// Read the whole file.
    ///
    /// Fails with an IO error if the handle no longer points at readable
    /// content (deleted, permissions changed).
    pub async fn read_bytes(&self) -> Result<Bytes> {
        match &self.source {
            FileSource::Memory(data) => Ok(data.clone()),
            FileSource::Path(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvenanceError;
    use tempfile::TempDir;

    #[test]
    fn test_content_type_resolution() {
        let txt = SelectedFile::from_bytes("hello.txt", b"hello".to_vec());
        assert_eq!(txt.declared_content_type(), "text/plain");

        let unknown = SelectedFile::from_bytes("blob.zzzz", b"x".to_vec());
        assert_eq!(unknown.declared_content_type(), DEFAULT_CONTENT_TYPE);

        let declared = unknown.with_content_type("image/png");
        assert_eq!(declared.declared_content_type(), "image/png");
    }

    #[tokio::test]
    async fn test_read_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"jpegbytes").unwrap();

        let file = SelectedFile::from_path(&path);
        assert_eq!(file.filename(), "photo.jpg");
        assert_eq!(file.declared_content_type(), "image/jpeg");
        assert_eq!(file.read_bytes().await.unwrap(), &b"jpegbytes"[..]);
    }

    #[tokio::test]
    async fn test_in_memory_reads_share_the_buffer() {
        let file = SelectedFile::from_bytes("big.bin", vec![1u8; 4096]);
        let a = file.read_bytes().await.unwrap();
        let b = file.clone().read_bytes().await.unwrap();
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(a.len(), 4096);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let file = SelectedFile::from_path(dir.path().join("gone.bin"));
        let err = file.read_bytes().await.unwrap_err();
        assert!(matches!(err, ProvenanceError::Io(_)));
    }
}
