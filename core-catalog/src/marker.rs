//! Marker tag removal against the Calibre catalog

use async_trait::async_trait;
use bridge_traits::catalog::{BookId, CatalogError, CatalogMarkerWriter, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{map_open_error, map_sqlx_error};
use crate::METADATA_DB_FILE;

/// Removes a tag link from a Calibre book.
///
/// This is the only component that opens `metadata.db` for writing, and the
/// only statement it issues is the link deletion.
#[derive(Debug, Clone)]
pub struct CalibreMarkerWriter {
    db_path: PathBuf,
    busy_timeout: Duration,
}

impl CalibreMarkerWriter {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_path: library_dir.into().join(METADATA_DB_FILE),
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    async fn open(&self) -> Result<SqliteConnection> {
        if !self.db_path.is_file() {
            return Err(CatalogError::Unavailable(format!(
                "Catalog not found at {}",
                self.db_path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .read_only(false)
            .create_if_missing(false)
            .busy_timeout(self.busy_timeout);

        SqliteConnection::connect_with(&options)
            .await
            .map_err(map_open_error)
    }
}

#[async_trait]
impl CatalogMarkerWriter for CalibreMarkerWriter {
    #[instrument(skip(self), fields(book_id = %identity))]
    async fn remove_marker(&self, identity: BookId, marker_tag: &str) -> Result<()> {
        let mut conn = self.open().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM books_tags_link
            WHERE book = ? AND tag = (SELECT id FROM tags WHERE name = ?)
            "#,
        )
        .bind(identity.value())
        .bind(marker_tag)
        .execute(&mut conn)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if removed == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM books WHERE id = ?")
                .bind(identity.value())
                .fetch_optional(&mut conn)
                .await
                .map_err(map_sqlx_error)?;
            if exists.is_none() {
                return Err(CatalogError::NotFound { identity });
            }
            debug!(marker_tag = marker_tag, "Marker already absent");
        } else {
            info!(marker_tag = marker_tag, "Removed marker tag");
        }

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Closing catalog connection failed");
        }
        Ok(())
    }
}
