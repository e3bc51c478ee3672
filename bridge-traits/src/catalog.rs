//! External Catalog Abstraction
//!
//! The external library (a Calibre `metadata.db`) is owned by another
//! application. The engine reads it through [`CatalogReader`], which must
//! never write, and clears markers through the separate
//! [`CatalogMarkerWriter`] capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stable identity of a book in the external catalog (its primary key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub i64);

impl BookId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for BookId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Where the book's transferable file lives, as far as the catalog can tell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookFile {
    /// Primary file located on disk
    Located(PathBuf),
    /// The catalog row exists but no file could be located
    Unresolved { reason: String },
}

impl BookFile {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            BookFile::Located(path) => Some(path),
            BookFile::Unresolved { .. } => None,
        }
    }
}

/// Descriptive metadata forwarded to the remote service with the upload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub authors: Vec<String>,
    /// Catalog tags, excluding the marker tag
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
}

impl BookMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// A book currently flagged for sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookCandidate {
    pub identity: BookId,
    pub title: String,
    pub file: BookFile,
    pub metadata: BookMetadata,
    /// Always `true` for records returned by [`CatalogReader::list_candidates`]
    pub marker_present: bool,
}

/// Catalog failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The store could not be opened or read at all
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// The store is locked by its owning application
    #[error("Catalog busy: {0}")]
    Busy(String),

    /// The addressed record does not exist
    #[error("Book {identity} not found in catalog")]
    NotFound { identity: BookId },

    /// A query or statement failed
    #[error("Catalog query failed: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Read-only view of the external catalog
///
/// Implementations must not write to the store, must tolerate concurrent
/// modification by its owner, and must return candidates in a stable order.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// List every record carrying `marker_tag`, as one point-in-time snapshot
    ///
    /// Records whose file cannot be located are still returned, with
    /// [`BookFile::Unresolved`].
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Unavailable`] if the store cannot be opened or read.
    async fn list_candidates(&self, marker_tag: &str) -> Result<Vec<BookCandidate>>;
}

/// The one write the external catalog permits: clearing the marker tag
#[async_trait]
pub trait CatalogMarkerWriter: Send + Sync {
    /// Remove `marker_tag` from the record `identity`
    ///
    /// Removing a marker that is already absent succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Busy`] when the owner holds a lock, otherwise
    /// [`CatalogError::Unavailable`] or [`CatalogError::Query`].
    async fn remove_marker(&self, identity: BookId, marker_tag: &str) -> Result<()>;
}
