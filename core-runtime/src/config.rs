//! # Core Configuration Module
//!
//! Provides configuration management for the sync service.
//!
//! ## Overview
//!
//! Configuration is assembled through [`AppConfigBuilder`], which enforces
//! fail-fast validation so that a misconfigured process refuses to start
//! instead of failing on its first run. [`AppConfig::from_env`] is the usual
//! entry point: it optionally loads a `KEY=VALUE` env file and then reads the
//! process environment, applying the documented defaults.
//!
//! ## Environment
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SYNC_ENV_FILE_PATH` | `/app/data/runtime.env` |
//! | `CALIBRE_LIBRARY_DIR` | `/calibre-library` |
//! | `BOOKFUSION_API_KEY` | unset |
//! | `BOOKFUSION_API_BASE` | `https://www.bookfusion.com/calibre-api/v1` |
//! | `SYNC_INTERVAL_MINUTES` | `15` |
//! | `SYNC_STATE_DB_PATH` | `/app/data/synced_books.db` |
//! | `DEFAULT_SYNC_MODE` | `manual` |
//! | `SYNC_TAG` | `bf` |
//! | `SYNC_HISTORY_RETENTION` | `500` |
//! | `SYNC_LOG_FORMAT` | `pretty` (debug builds) / `json` (release) |
//! | `SYNC_LOG_LEVEL` | `info` |
//! | `SYNC_LOG_FILTER` | unset |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .library_dir("/calibre-library")
//!     .state_db_path("/app/data/synced_books.db")
//!     .api_key("my-bookfusion-key")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{redact_if_sensitive, LoggingConfig};
use bridge_traits::time::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_FILE_PATH_VAR: &str = "SYNC_ENV_FILE_PATH";
pub const DEFAULT_ENV_FILE_PATH: &str = "/app/data/runtime.env";
pub const DEFAULT_LIBRARY_DIR: &str = "/calibre-library";
pub const DEFAULT_API_BASE: &str = "https://www.bookfusion.com/calibre-api/v1";
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
pub const DEFAULT_STATE_DB_PATH: &str = "/app/data/synced_books.db";
pub const DEFAULT_SYNC_TAG: &str = "bf";
pub const DEFAULT_HISTORY_RETENTION: u32 = 500;

/// Whether runs happen on a timer or only on request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Manual,
    Automatic,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Manual => "manual",
            SyncMode::Automatic => "automatic",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "manual" => Ok(SyncMode::Manual),
            "automatic" => Ok(SyncMode::Automatic),
            other => Err(Error::Config(format!(
                "Invalid sync mode '{}'. Expected manual or automatic.",
                other
            ))),
        }
    }
}

/// Service configuration.
///
/// Use [`AppConfig::builder`] or [`AppConfig::from_env`] to construct.
#[derive(Clone)]
pub struct AppConfig {
    /// Calibre library root (the directory holding `metadata.db`)
    pub library_dir: PathBuf,

    /// BookFusion API key; runs fail with `NotConfigured` while unset
    pub api_key: Option<String>,

    /// BookFusion Calibre API base URL, without trailing slash
    pub api_base: String,

    /// Interval between automatic runs
    pub sync_interval: Duration,

    /// SQLite file holding sync records, run history and settings
    pub state_db_path: PathBuf,

    /// Mode used when no persisted choice exists
    pub default_mode: SyncMode,

    /// Catalog tag that marks a book for transfer
    pub sync_tag: String,

    /// Number of finished runs kept in the run history
    pub history_retention: u32,

    /// Logging output settings
    pub logging: LoggingConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("library_dir", &self.library_dir)
            .field(
                "api_key",
                &self
                    .api_key
                    .as_deref()
                    .map(|key| redact_if_sensitive("api_key", key)),
            )
            .field("api_base", &self.api_base)
            .field("sync_interval", &self.sync_interval)
            .field("state_db_path", &self.state_db_path)
            .field("default_mode", &self.default_mode)
            .field("sync_tag", &self.sync_tag)
            .field("history_retention", &self.history_retention)
            .field("logging", &self.logging)
            .finish()
    }
}

impl AppConfig {
    /// Creates a new builder for constructing an `AppConfig`.
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Read configuration from the process environment, falling back to the
    /// env file named by `SYNC_ENV_FILE_PATH` (if present).
    ///
    /// Variables already set in the environment win over the env file. The
    /// process environment is never modified.
    pub fn from_env() -> Result<Self> {
        let env_file = std::env::var(ENV_FILE_PATH_VAR)
            .unwrap_or_else(|_| DEFAULT_ENV_FILE_PATH.to_string());
        let file_vars = read_env_file(Path::new(&env_file))?;
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_vars.get(key).cloned())
        })
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// Invalid or non-positive intervals and unknown modes fall back to their
    /// defaults; a blank tag falls back to `bf`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let interval_minutes = get("SYNC_INTERVAL_MINUTES")
            .and_then(|raw| raw.parse::<i64>().ok())
            .filter(|minutes| *minutes > 0)
            .map(|minutes| minutes as u64)
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MINUTES);

        let default_mode = get("DEFAULT_SYNC_MODE")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();

        let history_retention = get("SYNC_HISTORY_RETENTION")
            .and_then(|raw| raw.parse::<u32>().ok())
            .filter(|runs| *runs > 0)
            .unwrap_or(DEFAULT_HISTORY_RETENTION);

        let mut logging = LoggingConfig::default();
        if let Some(format) = get("SYNC_LOG_FORMAT") {
            logging = logging.with_format(format.parse()?);
        }
        if let Some(level) = get("SYNC_LOG_LEVEL") {
            let level = level.parse::<LogLevel>().map_err(Error::Config)?;
            logging = logging.with_level(level);
        }
        if let Some(filter) = get("SYNC_LOG_FILTER") {
            logging = logging.with_filter(filter);
        }

        let mut builder = Self::builder()
            .library_dir(get("CALIBRE_LIBRARY_DIR").unwrap_or_else(|| DEFAULT_LIBRARY_DIR.into()))
            .api_base(get("BOOKFUSION_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.into()))
            .sync_interval(Duration::from_secs(interval_minutes * 60))
            .state_db_path(
                get("SYNC_STATE_DB_PATH").unwrap_or_else(|| DEFAULT_STATE_DB_PATH.into()),
            )
            .default_mode(default_mode)
            .sync_tag(get("SYNC_TAG").unwrap_or_else(|| DEFAULT_SYNC_TAG.into()))
            .history_retention(history_retention)
            .logging(logging);

        if let Some(key) = get("BOOKFUSION_API_KEY") {
            builder = builder.api_key(key);
        }

        builder.build()
    }

    /// Path of the Calibre catalog database
    pub fn metadata_db_path(&self) -> PathBuf {
        self.library_dir.join("metadata.db")
    }

    /// Whether an API key is available
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Library directory and state database path are not empty
    /// - API base is an http(s) URL
    /// - Sync interval is positive
    /// - Sync tag is not blank
    pub fn validate(&self) -> Result<()> {
        if self.library_dir.as_os_str().is_empty() {
            return Err(Error::Config("Library directory cannot be empty".to_string()));
        }

        if self.state_db_path.as_os_str().is_empty() {
            return Err(Error::Config(
                "State database path cannot be empty".to_string(),
            ));
        }

        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(Error::Config(format!(
                "API base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }

        if self.sync_interval.is_zero() {
            return Err(Error::Config(
                "Sync interval must be greater than zero".to_string(),
            ));
        }

        if self.sync_tag.trim().is_empty() {
            return Err(Error::Config("Sync tag cannot be blank".to_string()));
        }

        if self.history_retention == 0 {
            return Err(Error::Config(
                "History retention must be at least one run".to_string(),
            ));
        }

        if matches!(&self.api_key, Some(key) if key.trim().is_empty()) {
            return Err(Error::Config(
                "API key cannot be blank; leave it unset instead".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`AppConfig`].
#[derive(Default)]
pub struct AppConfigBuilder {
    library_dir: Option<PathBuf>,
    api_key: Option<String>,
    api_base: Option<String>,
    sync_interval: Option<Duration>,
    state_db_path: Option<PathBuf>,
    default_mode: Option<SyncMode>,
    sync_tag: Option<String>,
    history_retention: Option<u32>,
    logging: Option<LoggingConfig>,
}

impl AppConfigBuilder {
    /// Sets the Calibre library directory.
    pub fn library_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_dir = Some(path.into());
        self
    }

    /// Sets the BookFusion API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL. A trailing slash is removed.
    ///
    /// Default: `https://www.bookfusion.com/calibre-api/v1`
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Sets the automatic sync interval.
    ///
    /// Default: 15 minutes
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the state database path.
    pub fn state_db_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.state_db_path = Some(path.into());
        self
    }

    /// Sets the mode used when none has been persisted.
    pub fn default_mode(mut self, mode: SyncMode) -> Self {
        self.default_mode = Some(mode);
        self
    }

    /// Sets the marker tag.
    ///
    /// Default: `bf`
    pub fn sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.sync_tag = Some(tag.into().trim().to_string());
        self
    }

    /// Sets how many finished runs the history keeps.
    ///
    /// Default: 500
    pub fn history_retention(mut self, runs: u32) -> Self {
        self.history_retention = Some(runs);
        self
    }

    /// Sets the logging configuration.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required field is missing or a value
    /// fails validation.
    pub fn build(self) -> Result<AppConfig> {
        let library_dir = self.library_dir.ok_or_else(|| {
            Error::Config("Library directory is required. Use .library_dir() to set it.".to_string())
        })?;

        let state_db_path = self.state_db_path.ok_or_else(|| {
            Error::Config(
                "State database path is required. Use .state_db_path() to set it.".to_string(),
            )
        })?;

        let config = AppConfig {
            library_dir,
            api_key: self.api_key,
            api_base: self.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            sync_interval: self
                .sync_interval
                .unwrap_or(Duration::from_secs(DEFAULT_SYNC_INTERVAL_MINUTES * 60)),
            state_db_path,
            default_mode: self.default_mode.unwrap_or_default(),
            sync_tag: self.sync_tag.unwrap_or_else(|| DEFAULT_SYNC_TAG.to_string()),
            history_retention: self.history_retention.unwrap_or(DEFAULT_HISTORY_RETENTION),
            logging: self.logging.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

/// Parse `KEY=VALUE` lines.
///
/// Blank lines, `#` comments and lines without `=` are ignored; one pair of
/// matching surrounding quotes is stripped from values.
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && (bytes[0] == b'"' || bytes[0] == b'\'')
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Read an env file into a map; later lines win over earlier ones. A missing
/// file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }

    let contents = std::fs::read_to_string(path)?;
    Ok(parse_env_file(&contents).into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.library_dir, PathBuf::from(DEFAULT_LIBRARY_DIR));
        assert_eq!(config.api_key, None);
        assert!(!config.is_configured());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.sync_interval, Duration::from_secs(15 * 60));
        assert_eq!(config.state_db_path, PathBuf::from(DEFAULT_STATE_DB_PATH));
        assert_eq!(config.default_mode, SyncMode::Manual);
        assert_eq!(config.sync_tag, "bf");
        assert_eq!(config.history_retention, DEFAULT_HISTORY_RETENTION);
        assert_eq!(
            config.metadata_db_path(),
            PathBuf::from("/calibre-library/metadata.db")
        );
    }

    #[test]
    fn test_values_from_environment() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("CALIBRE_LIBRARY_DIR", "/books"),
            ("BOOKFUSION_API_KEY", " secret "),
            ("BOOKFUSION_API_BASE", "http://localhost:9000/api/"),
            ("SYNC_INTERVAL_MINUTES", "5"),
            ("SYNC_STATE_DB_PATH", "/tmp/state.db"),
            ("DEFAULT_SYNC_MODE", "Automatic"),
            ("SYNC_TAG", "to-bookfusion"),
            ("SYNC_HISTORY_RETENTION", "50"),
            ("SYNC_LOG_FORMAT", "compact"),
            ("SYNC_LOG_LEVEL", "debug"),
            ("SYNC_LOG_FILTER", "core_sync=trace,sqlx=info"),
        ]))
        .unwrap();

        assert_eq!(config.library_dir, PathBuf::from("/books"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.api_base, "http://localhost:9000/api");
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.default_mode, SyncMode::Automatic);
        assert_eq!(config.sync_tag, "to-bookfusion");
        assert_eq!(config.history_retention, 50);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.logging.filter.as_deref(),
            Some("core_sync=trace,sqlx=info")
        );
    }

    #[test]
    fn test_invalid_interval_and_mode_fall_back() {
        for raw in ["0", "-3", "soon"] {
            let config =
                AppConfig::from_lookup(lookup_from(&[("SYNC_INTERVAL_MINUTES", raw)])).unwrap();
            assert_eq!(config.sync_interval, Duration::from_secs(15 * 60));
        }

        let config =
            AppConfig::from_lookup(lookup_from(&[("DEFAULT_SYNC_MODE", "hourly")])).unwrap();
        assert_eq!(config.default_mode, SyncMode::Manual);

        let config = AppConfig::from_lookup(lookup_from(&[("SYNC_TAG", "   ")])).unwrap();
        assert_eq!(config.sync_tag, "bf");

        for raw in ["0", "-1", "many"] {
            let config =
                AppConfig::from_lookup(lookup_from(&[("SYNC_HISTORY_RETENTION", raw)])).unwrap();
            assert_eq!(config.history_retention, DEFAULT_HISTORY_RETENTION);
        }
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[("SYNC_LOG_LEVEL", "chatty")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_requires_library_dir() {
        let result = AppConfig::builder().state_db_path("/tmp/state.db").build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Library directory is required"));
    }

    #[test]
    fn test_builder_requires_state_db_path() {
        let result = AppConfig::builder().library_dir("/books").build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("State database path is required"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = || {
            AppConfig::builder()
                .library_dir("/books")
                .state_db_path("/tmp/state.db")
        };

        assert!(base().api_base("ftp://example.com").build().is_err());
        assert!(base().sync_interval(Duration::ZERO).build().is_err());
        assert!(base().sync_tag("  ").build().is_err());
        assert!(base().api_key("").build().is_err());
        assert!(base().history_retention(0).build().is_err());
        assert!(base().api_key("key").build().is_ok());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AppConfig::builder()
            .library_dir("/books")
            .state_db_path("/tmp/state.db")
            .api_key("very-secret")
            .build()
            .unwrap();

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_sync_mode_parse_and_display() {
        assert_eq!("manual".parse::<SyncMode>().unwrap(), SyncMode::Manual);
        assert_eq!(" AUTOMATIC".parse::<SyncMode>().unwrap(), SyncMode::Automatic);
        assert!("sometimes".parse::<SyncMode>().is_err());
        assert_eq!(SyncMode::Automatic.to_string(), "automatic");
    }

    #[test]
    fn test_parse_env_file() {
        let contents = r#"
# managed by settings page
CALIBRE_LIBRARY_DIR="/books"
BOOKFUSION_API_KEY='abc=def'
SYNC_TAG = bf
not a pair
=orphan
"#;
        let pairs = parse_env_file(contents);
        assert_eq!(
            pairs,
            vec![
                ("CALIBRE_LIBRARY_DIR".to_string(), "/books".to_string()),
                ("BOOKFUSION_API_KEY".to_string(), "abc=def".to_string()),
                ("SYNC_TAG".to_string(), "bf".to_string()),
            ]
        );
    }

    #[test]
    fn test_read_env_file_later_lines_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runtime.env");
        std::fs::write(&path, "SYNC_TAG=first\nSYNC_TAG=second\nCORE_RUNTIME_TEST_FRESH=file\n")
            .unwrap();

        let vars = read_env_file(&path).unwrap();

        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("SYNC_TAG").map(String::as_str), Some("second"));
        assert!(std::env::var_os("CORE_RUNTIME_TEST_FRESH").is_none());
    }

    #[test]
    fn test_missing_env_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_env_file(&dir.path().join("absent.env")).unwrap().is_empty());
    }
}
