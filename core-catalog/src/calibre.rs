//! Read-only Calibre catalog reader

use async_trait::async_trait;
use bridge_traits::catalog::{
    BookCandidate, BookFile, BookId, BookMetadata, CatalogError, CatalogReader, Result,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, FromRow};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{map_open_error, map_sqlx_error};
use crate::METADATA_DB_FILE;

#[derive(Debug, FromRow)]
struct BookRow {
    id: i64,
    title: String,
    path: String,
}

/// [`CatalogReader`] over a Calibre library directory
#[derive(Debug, Clone)]
pub struct CalibreCatalog {
    library_dir: PathBuf,
    busy_timeout: Duration,
}

impl CalibreCatalog {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// How long a read waits on a lock held by Calibre before failing
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.library_dir.join(METADATA_DB_FILE)
    }

    async fn open(&self) -> Result<SqliteConnection> {
        let db_path = self.metadata_db_path();
        if !db_path.is_file() {
            return Err(CatalogError::Unavailable(format!(
                "Catalog not found at {}",
                db_path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(self.busy_timeout);

        SqliteConnection::connect_with(&options)
            .await
            .map_err(map_open_error)
    }

    async fn read_metadata(
        conn: &mut SqliteConnection,
        row: &BookRow,
        marker_tag: &str,
    ) -> Result<BookMetadata> {
        let authors: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT authors.name
            FROM authors
            JOIN books_authors_link ON authors.id = books_authors_link.author
            WHERE books_authors_link.book = ?
            ORDER BY authors.name
            "#,
        )
        .bind(row.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let tags: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT tags.name
            FROM tags
            JOIN books_tags_link ON tags.id = books_tags_link.tag
            WHERE books_tags_link.book = ? AND tags.name <> ?
            ORDER BY tags.name
            "#,
        )
        .bind(row.id)
        .bind(marker_tag)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let summary: Option<String> =
            sqlx::query_scalar("SELECT text FROM comments WHERE book = ?")
                .bind(row.id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;

        let isbn: Option<String> = sqlx::query_scalar(
            "SELECT val FROM identifiers WHERE book = ? AND type = 'isbn' LIMIT 1",
        )
        .bind(row.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        let language: Option<String> = sqlx::query_scalar(
            r#"
            SELECT languages.lang_code
            FROM languages
            JOIN books_languages_link ON languages.id = books_languages_link.lang_code
            WHERE books_languages_link.book = ?
            ORDER BY books_languages_link.item_order
            LIMIT 1
            "#,
        )
        .bind(row.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

        Ok(BookMetadata {
            title: row.title.clone(),
            authors,
            tags,
            summary: summary.filter(|s| !s.trim().is_empty()),
            isbn: isbn.filter(|s| !s.trim().is_empty()),
            language,
        })
    }
}

#[async_trait]
impl CatalogReader for CalibreCatalog {
    #[instrument(skip(self), fields(library = %self.library_dir.display()))]
    async fn list_candidates(&self, marker_tag: &str) -> Result<Vec<BookCandidate>> {
        let mut conn = self.open().await?;

        // One read transaction so every row comes from the same snapshot
        let mut tx = conn.begin().await.map_err(map_open_error)?;

        let rows: Vec<BookRow> = sqlx::query_as(
            r#"
            SELECT books.id, books.title, books.path
            FROM books
            JOIN books_tags_link ON books.id = books_tags_link.book
            JOIN tags ON tags.id = books_tags_link.tag
            WHERE tags.name = ?
            ORDER BY books.id
            "#,
        )
        .bind(marker_tag)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let mut tagged = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata = Self::read_metadata(&mut tx, &row, marker_tag)
                .await
                .map_err(|e| match e {
                    CatalogError::Query(message) => CatalogError::Unavailable(message),
                    other => other,
                })?;
            tagged.push((row, metadata));
        }

        tx.rollback().await.map_err(map_sqlx_error)?;
        if let Err(e) = conn.close().await {
            debug!(error = %e, "Closing catalog connection failed");
        }

        let mut candidates = Vec::with_capacity(tagged.len());
        for (row, metadata) in tagged {
            let file = match resolve_primary_epub(&self.library_dir, &row.path).await {
                Ok(path) => BookFile::Located(path),
                Err(reason) => {
                    warn!(book_id = row.id, reason = %reason, "Book file not resolved");
                    BookFile::Unresolved { reason }
                }
            };

            candidates.push(BookCandidate {
                identity: BookId::new(row.id),
                title: row.title,
                file,
                metadata,
                marker_present: true,
            });
        }

        info!(
            marker_tag = marker_tag,
            candidates = candidates.len(),
            "Listed catalog candidates"
        );
        Ok(candidates)
    }
}

/// Locate the file to upload for a book stored at `book_path` (relative to
/// the library root): the first `*.epub` in the folder by file name.
///
/// # Errors
///
/// A human-readable reason: `Book folder missing: <dir>` or `No EPUB found`.
pub async fn resolve_primary_epub(
    library_dir: &Path,
    book_path: &str,
) -> std::result::Result<PathBuf, String> {
    let book_dir = library_dir.join(book_path);
    let missing = || format!("Book folder missing: {}", book_dir.display());

    match tokio::fs::metadata(&book_dir).await {
        Ok(meta) if meta.is_dir() => {}
        _ => return Err(missing()),
    }

    let mut entries = tokio::fs::read_dir(&book_dir)
        .await
        .map_err(|_| missing())?;

    let mut epubs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("Cannot read {}: {}", book_dir.display(), e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.to_lowercase().ends_with(".epub") {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            epubs.push(name);
        }
    }

    epubs.sort();
    epubs
        .into_iter()
        .next()
        .map(|name| book_dir.join(name))
        .ok_or_else(|| "No EPUB found".to_string())
}
