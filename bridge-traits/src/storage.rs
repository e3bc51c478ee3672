//! Settings Storage Abstraction
//!
//! Key-value preferences that must survive restarts (currently the sync mode).

use async_trait::async_trait;

use crate::error::Result;

/// Settings storage trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_mode(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("sync_mode", "automatic").await
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}
