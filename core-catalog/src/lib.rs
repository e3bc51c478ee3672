//! # Calibre Catalog
//!
//! Reads sync candidates out of a Calibre library and clears the marker tag
//! once a book has been transferred.
//!
//! ## Overview
//!
//! - [`CalibreCatalog`] implements [`CatalogReader`](bridge_traits::CatalogReader).
//!   It opens `metadata.db` read-only for every listing and reads all rows of
//!   a listing inside one transaction, so Calibre can keep writing while we
//!   look.
//! - [`CalibreMarkerWriter`] implements
//!   [`CatalogMarkerWriter`](bridge_traits::CatalogMarkerWriter) over a
//!   separate read-write connection whose only statement removes one
//!   book/tag link.
//! - [`fixture`] builds a minimal Calibre library on disk for tests.

mod calibre;
mod error;
pub mod fixture;
mod marker;

pub use calibre::{resolve_primary_epub, CalibreCatalog};
pub use marker::CalibreMarkerWriter;

/// File name of the Calibre catalog inside a library directory
pub const METADATA_DB_FILE: &str = "metadata.db";
