//! # Content Digest
//!
//! Content-derived fingerprint of a book file. The digest depends only on the
//! bytes (length, then content), so renaming or moving a file never changes
//! it, and it doubles as the remote's duplicate-detection key.
//!
//! Files are streamed in fixed-size chunks so arbitrarily large books are
//! hashed in bounded memory.

use crate::{Result, SyncError};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Read size for streaming the file through the hasher
pub const DIGEST_CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 fingerprint over `len_be_u64 || 0x00 || content`, rendered as
/// lowercase hex.
#[derive(Debug, Clone)]
pub struct Sha256Digester {
    chunk_size: usize,
}

impl Default for Sha256Digester {
    fn default() -> Self {
        Self {
            chunk_size: DIGEST_CHUNK_SIZE,
        }
    }
}

impl Sha256Digester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the read size (minimum one byte)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Compute the digest of the file at `path`
    ///
    /// # Errors
    ///
    /// [`SyncError::Io`] if the file cannot be opened or read, and
    /// [`SyncError::Cancelled`] if `cancel` fires between chunks.
    #[instrument(skip(self, cancel), fields(path = %path.display()))]
    pub async fn fingerprint(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        let io_error = |e: std::io::Error| SyncError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let len = file.metadata().await.map_err(io_error)?.len();

        let mut hasher = Sha256::new();
        hasher.update(len.to_be_bytes());
        hasher.update([0u8]);

        let mut buffer = vec![0u8; self.chunk_size];
        let mut read_total: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let n = file.read(&mut buffer).await.map_err(io_error)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            read_total += n as u64;
        }

        if read_total != len {
            return Err(SyncError::Io {
                path: path.display().to_string(),
                message: format!("file changed while hashing ({} of {} bytes)", read_total, len),
            });
        }

        let digest = format!("{:x}", hasher.finalize());
        debug!(bytes = len, digest = %digest, "Computed content digest");
        Ok(digest)
    }
}
