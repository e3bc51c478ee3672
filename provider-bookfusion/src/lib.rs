//! # BookFusion Provider
//!
//! Implements [`RemoteUploader`](bridge_traits::remote::RemoteUploader) for
//! the BookFusion Calibre API.
//!
//! ## Overview
//!
//! This crate provides:
//! - The three-step upload (`init`, presigned storage post, `finalize`)
//! - HTTP Basic (default) or Bearer API key authentication
//! - Status classification into the engine's remote failure classes
//! - Marker removal delegated to the catalog marker writer
//!
//! Transport goes through [`HttpClient`](bridge_traits::http::HttpClient);
//! this crate never retries on its own.

pub mod error;
pub mod types;
pub mod uploader;

pub use error::{BookFusionError, Result, UploadStage};
pub use uploader::{AuthScheme, BookFusionUploader, DEFAULT_API_BASE};
