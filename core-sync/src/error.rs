use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync run {run_id} already in progress")]
    RunAlreadyInProgress { run_id: String },

    #[error("Cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Sync timeout after {0} seconds")]
    Timeout(u64),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid run ID: {0}")]
    InvalidRunId(String),

    #[error("Invalid record status: {0}")]
    InvalidStatus(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
