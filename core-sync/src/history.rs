//! # Run History
//!
//! Report sink that keeps a [`RunSummary`] per finished run for status pages.

use crate::report::{RunId, RunStatus, RunSummary};
use crate::state::from_millis;
use crate::{Result, SyncError, SyncMode};
use async_trait::async_trait;
use core_runtime::config::DEFAULT_HISTORY_RETENTION;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Sink for finished run summaries
#[async_trait]
pub trait RunHistory: Send + Sync {
    /// Persist the summary of a finished run
    async fn record(&self, summary: &RunSummary) -> Result<()>;

    /// Most recently started run
    async fn latest(&self) -> Result<Option<RunSummary>>;

    /// Up to `limit` runs, newest first
    async fn recent(&self, limit: u32) -> Result<Vec<RunSummary>>;
}

/// SQLite implementation of [`RunHistory`] over the `sync_runs` table
///
/// Only the newest `retention` runs are kept; older rows are pruned on
/// every [`RunHistory::record`].
pub struct SqliteRunHistory {
    pool: SqlitePool,
    retention: u32,
}

impl SqliteRunHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            retention: DEFAULT_HISTORY_RETENTION,
        }
    }

    /// Keep at most `retention` runs (at least one)
    pub fn with_retention(mut self, retention: u32) -> Self {
        self.retention = retention.max(1);
        self
    }
}

#[derive(Debug, FromRow)]
struct RunRow {
    id: String,
    mode: String,
    force_resync: bool,
    status: String,
    started_at: i64,
    finished_at: i64,
    total: i64,
    synced: i64,
    partial: i64,
    skipped: i64,
    failed: i64,
    message: Option<String>,
}

impl TryFrom<RunRow> for RunSummary {
    type Error = SyncError;

    fn try_from(row: RunRow) -> Result<Self> {
        let mode: SyncMode = row
            .mode
            .parse()
            .map_err(|_| SyncError::Database(format!("Invalid mode: {}", row.mode)))?;

        Ok(RunSummary {
            run_id: RunId::from_string(&row.id)?,
            mode,
            force_resync: row.force_resync,
            status: RunStatus::parse(&row.status)?,
            started_at: from_millis(row.started_at)?,
            finished_at: from_millis(row.finished_at)?,
            total: row.total as u32,
            synced: row.synced as u32,
            partial: row.partial as u32,
            skipped: row.skipped as u32,
            failed: row.failed as u32,
            message: row.message,
        })
    }
}

#[async_trait]
impl RunHistory for SqliteRunHistory {
    async fn record(&self, summary: &RunSummary) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sync_runs (
                id, mode, force_resync, status, started_at, finished_at,
                total, synced, partial, skipped, failed, message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(summary.run_id.as_str())
        .bind(summary.mode.as_str())
        .bind(summary.force_resync)
        .bind(summary.status.as_str())
        .bind(summary.started_at.timestamp_millis())
        .bind(summary.finished_at.timestamp_millis())
        .bind(summary.total as i64)
        .bind(summary.synced as i64)
        .bind(summary.partial as i64)
        .bind(summary.skipped as i64)
        .bind(summary.failed as i64)
        .bind(&summary.message)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        let pruned = sqlx::query(
            r#"
            DELETE FROM sync_runs
            WHERE rowid NOT IN (
                SELECT rowid FROM sync_runs
                ORDER BY started_at DESC, rowid DESC
                LIMIT ?
            )
            "#,
        )
        .bind(self.retention as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if pruned > 0 {
            debug!(pruned, retention = self.retention, "Pruned run history");
        }
        Ok(())
    }

    async fn latest(&self) -> Result<Option<RunSummary>> {
        Ok(self.recent(1).await?.into_iter().next())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, mode, force_resync, status, started_at, finished_at,
                   total, synced, partial, skipped, failed, message
            FROM sync_runs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(RunSummary::try_from)
            .collect::<Result<Vec<_>>>()
    }
}
