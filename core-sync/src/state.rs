//! # Sync State Store
//!
//! Durable mapping from catalog identity to the last transferred digest.
//!
//! ## Overview
//!
//! The store is the idempotence oracle for the orchestrator: a candidate is
//! skipped when its record is `synced` with the same digest. Every write is a
//! single upsert statement issued only after the remote call has returned, so
//! a crash between candidates leaves exactly the completed ones recorded.
//!
//! A failed attempt never clears `last_digest`, which means a book that was
//! once synced and then failed a re-upload is still recognised as synced
//! content on the next run.

use crate::{Result, SyncError};
use async_trait::async_trait;
use bridge_traits::catalog::BookId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Record Types
// ============================================================================

/// Transfer status of a single book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Never,
    Synced,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Never => "never",
            RecordStatus::Synced => "synced",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "never" => Ok(RecordStatus::Never),
            "synced" => Ok(RecordStatus::Synced),
            "failed" => Ok(RecordStatus::Failed),
            other => Err(SyncError::InvalidStatus(other.to_string())),
        }
    }
}

/// Persisted transfer state of one catalog identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRecord {
    pub identity: BookId,
    /// Digest of the content at the last successful transfer
    pub last_digest: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    /// Reason of the latest failure; cleared on success
    pub last_error: Option<String>,
    /// Time of the latest write of either kind
    pub last_attempt_at: DateTime<Utc>,
}

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence for [`SyncRecord`]s
///
/// The store is the only writer of records.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Fetch the record for `identity`, `None` if it was never attempted
    async fn get(&self, identity: BookId) -> Result<Option<SyncRecord>>;

    /// Upsert `identity` as synced with `digest`
    async fn record_success(&self, identity: BookId, digest: &str, at: DateTime<Utc>) -> Result<()>;

    /// Upsert `identity` as failed, keeping any previous `last_digest`
    async fn record_failure(&self, identity: BookId, at: DateTime<Utc>, reason: &str) -> Result<()>;

    /// Whether the candidate's current content is already on the remote
    ///
    /// True iff `!force_resync` and a `synced` record carries `current_digest`.
    async fn should_skip(
        &self,
        identity: BookId,
        current_digest: &str,
        force_resync: bool,
    ) -> Result<bool>;

    /// All records, optionally filtered by status, ordered by identity
    async fn list_records(&self, status: Option<RecordStatus>) -> Result<Vec<SyncRecord>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`SyncStateStore`]
pub struct SqliteSyncStateStore {
    pool: SqlitePool,
}

impl SqliteSyncStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncRecordRow {
    identity: i64,
    last_digest: Option<String>,
    last_synced_at: Option<i64>,
    status: String,
    last_error: Option<String>,
    last_attempt_at: i64,
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SyncError::Database(format!("Invalid timestamp: {}", millis)))
}

impl TryFrom<SyncRecordRow> for SyncRecord {
    type Error = SyncError;

    fn try_from(row: SyncRecordRow) -> Result<Self> {
        Ok(SyncRecord {
            identity: BookId::new(row.identity),
            last_digest: row.last_digest,
            last_synced_at: row.last_synced_at.map(from_millis).transpose()?,
            status: row.status.parse()?,
            last_error: row.last_error,
            last_attempt_at: from_millis(row.last_attempt_at)?,
        })
    }
}

#[async_trait]
impl SyncStateStore for SqliteSyncStateStore {
    async fn get(&self, identity: BookId) -> Result<Option<SyncRecord>> {
        let row = sqlx::query_as::<_, SyncRecordRow>(
            r#"
            SELECT identity, last_digest, last_synced_at, status, last_error, last_attempt_at
            FROM sync_records
            WHERE identity = ?
            "#,
        )
        .bind(identity.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(SyncRecord::try_from).transpose()
    }

    async fn record_success(&self, identity: BookId, digest: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_records (
                identity, last_digest, last_synced_at, status, last_error, last_attempt_at
            ) VALUES (?, ?, ?, 'synced', NULL, ?)
            ON CONFLICT(identity) DO UPDATE SET
                last_digest = excluded.last_digest,
                last_synced_at = excluded.last_synced_at,
                status = 'synced',
                last_error = NULL,
                last_attempt_at = excluded.last_attempt_at
            "#,
        )
        .bind(identity.value())
        .bind(digest)
        .bind(at.timestamp_millis())
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn record_failure(&self, identity: BookId, at: DateTime<Utc>, reason: &str) -> Result<()> {
        // last_digest and last_synced_at keep their previous values
        sqlx::query(
            r#"
            INSERT INTO sync_records (
                identity, last_digest, last_synced_at, status, last_error, last_attempt_at
            ) VALUES (?, NULL, NULL, 'failed', ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                status = 'failed',
                last_error = excluded.last_error,
                last_attempt_at = excluded.last_attempt_at
            "#,
        )
        .bind(identity.value())
        .bind(reason)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn should_skip(
        &self,
        identity: BookId,
        current_digest: &str,
        force_resync: bool,
    ) -> Result<bool> {
        if force_resync {
            return Ok(false);
        }

        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM sync_records
            WHERE identity = ? AND status = 'synced' AND last_digest = ?
            "#,
        )
        .bind(identity.value())
        .bind(current_digest)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(found.is_some())
    }

    async fn list_records(&self, status: Option<RecordStatus>) -> Result<Vec<SyncRecord>> {
        let rows = sqlx::query_as::<_, SyncRecordRow>(
            r#"
            SELECT identity, last_digest, last_synced_at, status, last_error, last_attempt_at
            FROM sync_records
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY identity
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(SyncRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }
}
