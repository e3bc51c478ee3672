//! Remote Reading Service Abstraction
//!
//! [`RemoteUploader`] transfers a book file and, after a confirmed transfer,
//! clears the triggering marker. Failures are a closed set so that the retry
//! decision in `core-sync` is an exhaustive match.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::catalog::{BookId, BookMetadata};

/// Identifier the remote service assigned to an uploaded book
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the remote needs besides the file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub identity: BookId,
    /// Name the file is uploaded under
    pub file_name: String,
    /// Content digest of the file (see `core_sync::digest`)
    pub digest: String,
    pub metadata: BookMetadata,
}

/// Remote failure classes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Credential rejected; every later call will fail the same way
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The service asked us to slow down
    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Transport failure, timeout, or server-side (5xx) error
    #[error("Network error: {0}")]
    Network(String),

    /// Permanent rejection of this request (e.g. unsupported format)
    #[error("Rejected by remote (status {status:?}): {message}")]
    Rejected { status: Option<u16>, message: String },
}

impl RemoteError {
    /// Whether the call may succeed if repeated
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::RateLimited { .. } | RemoteError::Network(_) => true,
            RemoteError::Auth(_) | RemoteError::Rejected { .. } => false,
        }
    }

    /// Server-provided backoff hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after, .. } => *retry_after,
            RemoteError::Auth(_) | RemoteError::Network(_) | RemoteError::Rejected { .. } => None,
        }
    }

    /// Short stable label used in reports and persisted summaries
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Auth(_) => "auth_error",
            RemoteError::RateLimited { .. } => "rate_limited",
            RemoteError::Network(_) => "network_error",
            RemoteError::Rejected { .. } => "remote_rejected",
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Remote transfer capability
///
/// Implementations perform a single attempt per call; retry and timeouts are
/// applied by the caller.
#[async_trait]
pub trait RemoteUploader: Send + Sync {
    /// Transfer `file_path` with `request` metadata
    ///
    /// # Errors
    ///
    /// [`RemoteError::Auth`], [`RemoteError::RateLimited`],
    /// [`RemoteError::Network`] or [`RemoteError::Rejected`].
    async fn upload(&self, file_path: &Path, request: &UploadRequest) -> Result<RemoteId>;

    /// Clear `marker_tag` from `identity` in the external catalog
    ///
    /// # Errors
    ///
    /// [`RemoteError::Network`] for transient failures, otherwise
    /// [`RemoteError::Rejected`].
    async fn remove_marker(&self, identity: BookId, marker_tag: &str) -> Result<()>;
}
