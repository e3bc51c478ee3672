//! Minimal on-disk Calibre library for tests
//!
//! Creates the subset of the Calibre schema the reader touches and lays out
//! book folders the way Calibre does (`Author/Title (id)/Title.epub`).

use bridge_traits::catalog::{BookId, CatalogError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use crate::error::map_sqlx_error;
use crate::METADATA_DB_FILE;

const SCHEMA: &[&str] = &[
    "CREATE TABLE books (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL DEFAULT 'Unknown',
        path TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE books_authors_link (
        id INTEGER PRIMARY KEY,
        book INTEGER NOT NULL,
        author INTEGER NOT NULL,
        UNIQUE(book, author)
    )",
    "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
    "CREATE TABLE books_tags_link (
        id INTEGER PRIMARY KEY,
        book INTEGER NOT NULL,
        tag INTEGER NOT NULL,
        UNIQUE(book, tag)
    )",
    "CREATE TABLE comments (id INTEGER PRIMARY KEY, book INTEGER NOT NULL UNIQUE, text TEXT NOT NULL)",
    "CREATE TABLE identifiers (
        id INTEGER PRIMARY KEY,
        book INTEGER NOT NULL,
        type TEXT NOT NULL DEFAULT 'isbn',
        val TEXT NOT NULL,
        UNIQUE(book, type)
    )",
    "CREATE TABLE languages (id INTEGER PRIMARY KEY, lang_code TEXT NOT NULL UNIQUE)",
    "CREATE TABLE books_languages_link (
        id INTEGER PRIMARY KEY,
        book INTEGER NOT NULL,
        lang_code INTEGER NOT NULL,
        item_order INTEGER NOT NULL DEFAULT 0,
        UNIQUE(book, lang_code)
    )",
];

/// A book to insert into a [`CalibreFixture`]
#[derive(Debug, Clone)]
pub struct FixtureBook {
    pub title: String,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
    /// Content of `<title>.epub`; `None` creates the folder with no EPUB
    pub epub: Option<Vec<u8>>,
}

impl FixtureBook {
    pub fn titled(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            epub: Some(format!("epub:{}", title).into_bytes()),
            title,
            authors: vec!["Unknown".to_string()],
            tags: Vec::new(),
            summary: None,
            isbn: None,
            language: None,
        }
    }

    pub fn tagged(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }
}

/// A throwaway Calibre library rooted at a directory
pub struct CalibreFixture {
    library_dir: PathBuf,
    pool: SqlitePool,
}

impl CalibreFixture {
    /// Create `metadata.db` with the Calibre tables the reader uses
    pub async fn create(library_dir: impl Into<PathBuf>) -> Result<Self> {
        let library_dir = library_dir.into();
        tokio::fs::create_dir_all(&library_dir)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        let options = SqliteConnectOptions::new()
            .filename(library_dir.join(METADATA_DB_FILE))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        Ok(Self { library_dir, pool })
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Add a book by one unknown author with the given tags
    pub async fn add_book(&self, title: &str, tags: &[&str]) -> Result<BookId> {
        self.add_book_with(FixtureBook::titled(title).tagged(tags))
            .await
    }

    pub async fn add_book_with(&self, book: FixtureBook) -> Result<BookId> {
        let id: i64 = sqlx::query_scalar("INSERT INTO books (title) VALUES (?) RETURNING id")
            .bind(&book.title)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let author_dir = book
            .authors
            .first()
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let relative = format!("{}/{} ({})", author_dir, book.title, id);
        sqlx::query("UPDATE books SET path = ? WHERE id = ?")
            .bind(&relative)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        for author in &book.authors {
            let author_id = self.upsert_name("authors", "name", author).await?;
            self.link("books_authors_link", "author", id, author_id).await?;
        }
        for tag in &book.tags {
            self.tag_book(BookId::new(id), tag).await?;
        }
        if let Some(summary) = &book.summary {
            sqlx::query("INSERT INTO comments (book, text) VALUES (?, ?)")
                .bind(id)
                .bind(summary)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        if let Some(isbn) = &book.isbn {
            sqlx::query("INSERT INTO identifiers (book, type, val) VALUES (?, 'isbn', ?)")
                .bind(id)
                .bind(isbn)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        if let Some(language) = &book.language {
            let lang_id = self.upsert_name("languages", "lang_code", language).await?;
            self.link("books_languages_link", "lang_code", id, lang_id)
                .await?;
        }

        let book_dir = self.library_dir.join(&relative);
        tokio::fs::create_dir_all(&book_dir)
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        if let Some(content) = &book.epub {
            tokio::fs::write(book_dir.join(format!("{}.epub", book.title)), content)
                .await
                .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
        }

        Ok(BookId::new(id))
    }

    pub async fn tag_book(&self, book: BookId, tag: &str) -> Result<()> {
        let tag_id = self.upsert_name("tags", "name", tag).await?;
        self.link("books_tags_link", "tag", book.value(), tag_id)
            .await
    }

    pub async fn has_tag(&self, book: BookId, tag: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM books_tags_link
            JOIN tags ON tags.id = books_tags_link.tag
            WHERE books_tags_link.book = ? AND tags.name = ?
            "#,
        )
        .bind(book.value())
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(found.is_some())
    }

    /// Path of the book's EPUB as created by the fixture
    pub async fn epub_path(&self, book: BookId) -> Result<PathBuf> {
        let (title, path): (String, String) =
            sqlx::query_as("SELECT title, path FROM books WHERE id = ?")
                .bind(book.value())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(self.library_dir.join(path).join(format!("{}.epub", title)))
    }

    /// Delete the book's folder while leaving the catalog row
    pub async fn remove_book_folder(&self, book: BookId) -> Result<()> {
        let path: String = sqlx::query_scalar("SELECT path FROM books WHERE id = ?")
            .bind(book.value())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        tokio::fs::remove_dir_all(self.library_dir.join(path))
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))
    }

    /// Drop the fixture's own connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn upsert_name(&self, table: &str, column: &str, value: &str) -> Result<i64> {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {table} ({column}) VALUES (?)"
        ))
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query_scalar(&format!("SELECT id FROM {table} WHERE {column} = ?"))
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn link(&self, table: &str, column: &str, book: i64, other: i64) -> Result<()> {
        sqlx::query(&format!(
            "INSERT OR IGNORE INTO {table} (book, {column}) VALUES (?, ?)"
        ))
        .bind(book)
        .bind(other)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}
