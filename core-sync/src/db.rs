//! # State Database Pool
//!
//! SQLite connection pool for the sync state database (records, run history,
//! settings).
//!
//! ## Features
//!
//! - **WAL Mode**: readers never block the single writer
//! - **Synchronous NORMAL**: each committed upsert survives a process crash
//! - **Foreign Keys**: enforced
//! - **Automatic Migrations**: embedded with `sqlx::migrate!` and run on open
//! - **Health Check**: `SELECT 1` before the pool is handed out
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::db::{DatabaseConfig, create_pool};
//!
//! let pool = create_pool(DatabaseConfig::new("/app/data/synced_books.db")).await?;
//! ```

use crate::{Result, SyncError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database configuration for the state pool
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file, or `None` for a private in-memory database
    pub path: Option<PathBuf>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Maximum time to wait for a connection from the pool
    pub acquire_timeout: Duration,

    /// How long a statement waits on a lock before failing
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Create a new database configuration with the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Create a configuration for an in-memory database (useful for testing)
    ///
    /// Every SQLite in-memory connection is its own database, so the pool is
    /// limited to one connection.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Create a configured SQLite connection pool
///
/// This function:
/// 1. Creates the parent directory of the database file
/// 2. Configures SQLite connection options (WAL mode, foreign keys, etc.)
/// 3. Creates the pool
/// 4. Runs database migrations
/// 5. Performs a health check
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    let options = match &config.path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| SyncError::Io {
                    path: parent.display().to_string(),
                    message: e.to_string(),
                })?;
            }
            info!(path = %path.display(), "Opening state database");
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        }
        None => {
            debug!("Opening in-memory state database");
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| SyncError::Database(e.to_string()))?
        }
    }
    .synchronous(SqliteSynchronous::Normal)
    .foreign_keys(true)
    .busy_timeout(config.busy_timeout);

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout);
    if config.path.is_none() {
        // Closing the last connection would drop the whole database
        pool_options = pool_options
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await.map_err(|e| {
        warn!(error = %e, "Failed to create connection pool");
        SyncError::Database(e.to_string())
    })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// Create an in-memory pool with migrations applied
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    debug!("Running state database migrations");

    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        SyncError::Migration(e.to_string())
    })?;

    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "Database health check failed");
        SyncError::Database(e.to_string())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_pool() {
        let pool = create_test_pool().await.unwrap();
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'sync_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        assert_eq!(tables, vec!["sync_records", "sync_runs"]);
    }

    #[tokio::test]
    async fn test_creates_parent_directory_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/synced_books.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        pool.close().await;
        assert!(path.exists());

        // Migrations are idempotent on reopen
        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        health_check(&pool).await.unwrap();
    }

    #[test]
    fn test_database_config_builder() {
        let config = DatabaseConfig::new("/tmp/state.db")
            .max_connections(2)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert_eq!(DatabaseConfig::in_memory().max_connections, 1);
    }
}
