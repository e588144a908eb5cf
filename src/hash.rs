//! Content fingerprinting
//!
//! SHA-256 over the whole byte buffer, rendered as lowercase hex. Large
//! buffers are hashed on the blocking pool so the async executor keeps
//! serving other tasks.

use crate::error::{ProvenanceError, Result};
use crate::types::Fingerprint;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Buffers at or below this size are hashed inline (1MB)
pub const INLINE_HASH_LIMIT: usize = 1024 * 1024;

/// Compute the fingerprint of a byte buffer
pub fn fingerprint(data: &[u8]) -> Fingerprint {
    let digest: [u8; 32] = Sha256::digest(data).into();
    Fingerprint::from_digest(&digest)
}

/// Compute the fingerprint without blocking the async executor.
///
/// Small buffers are hashed in place; anything larger moves to
/// `spawn_blocking`.
pub async fn fingerprint_offloaded(data: Bytes) -> Result<Fingerprint> {
    if data.len() <= INLINE_HASH_LIMIT {
        return Ok(fingerprint(&data));
    }

    let size = data.len();
    let fp = tokio::task::spawn_blocking(move || fingerprint(&data))
        .await
        .map_err(|e| ProvenanceError::Io(std::io::Error::other(e)))?;

    debug!(hash = %fp, size, "Hashed large buffer off the executor");
    Ok(fp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_vector() {
        assert_eq!(
            fingerprint(b"hello").as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_deterministic_and_distinct() {
        let a = fingerprint(b"provenance");
        let b = fingerprint(b"provenance");
        let c = fingerprint(b"provenancE");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|ch| !ch.is_ascii_uppercase()));
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(
            fingerprint(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_offloaded_matches_inline() {
        let large = Bytes::from(vec![7u8; INLINE_HASH_LIMIT * 2 + 3]);
        let expected = fingerprint(&large);
        let actual = fingerprint_offloaded(large.clone()).await.unwrap();
        assert_eq!(expected, actual);

        let small = Bytes::from_static(b"hello");
        assert_eq!(
            fingerprint_offloaded(small).await.unwrap(),
            fingerprint(b"hello")
        );
    }
}
