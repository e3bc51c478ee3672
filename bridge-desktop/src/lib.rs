//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for a long-running host process
//! (container or desktop).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with multipart file parts streamed from disk
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore};
//! use bridge_traits::{HttpClient, SettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let settings = SqliteSettingsStore::with_pool(pool).await?;
//!
//!     // Use in core configuration
//!     Ok(())
//! }
//! ```

mod http;
mod settings;

pub use http::ReqwestHttpClient;
pub use settings::SqliteSettingsStore;
