//! # Host Bridge Traits
//!
//! Capability traits the sync engine depends on, plus the records that cross
//! those seams.
//!
//! ## Overview
//!
//! The engine in `core-sync` never talks to Calibre, BookFusion, or the
//! network directly. Every external collaborator is reached through one of the
//! traits below so that tests can substitute in-memory fixtures and hosts can
//! swap implementations.
//!
//! ## Traits
//!
//! ### External catalog
//! - [`CatalogReader`](catalog::CatalogReader) - Read-only candidate listing
//! - [`CatalogMarkerWriter`](catalog::CatalogMarkerWriter) - The single write the catalog allows: clearing the marker tag
//!
//! ### Remote service
//! - [`RemoteUploader`](remote::RemoteUploader) - File transfer and post-success marker removal
//! - [`HttpClient`](http::HttpClient) - Async HTTP with multipart bodies
//!
//! ### Storage & utilities
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences storage
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! Host-level operations use [`BridgeError`](error::BridgeError). Catalog and
//! remote operations carry their own closed error enums because the engine
//! makes decisions (abort, retry, skip) based on the variant.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so implementations can be
//! shared between the orchestrator and the scheduler task.

pub mod catalog;
pub mod error;
pub mod http;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{
    BookCandidate, BookFile, BookId, BookMetadata, CatalogError, CatalogMarkerWriter,
    CatalogReader,
};
pub use http::{FormPart, HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm};
pub use remote::{RemoteError, RemoteId, RemoteUploader, UploadRequest};
pub use storage::SettingsStore;
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
