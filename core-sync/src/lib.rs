//! # Sync Engine
//!
//! Transfers tagged catalog books to the remote reading service exactly once
//! per content version.
//!
//! ## Overview
//!
//! A sync run lists the books carrying the marker tag, fingerprints each
//! file, skips content the state store has already recorded as synced, and
//! uploads the rest. The marker is removed only after a confirmed upload, and
//! every outcome is persisted before the next candidate is touched.
//!
//! ## Components
//!
//! - **Digest Service** (`digest`): Streaming SHA-256 content fingerprint
//! - **State Store** (`state`): Per-book sync records; the idempotence oracle
//! - **Run History** (`history`): Summaries of finished runs for status pages
//! - **Retry** (`retry`): Bounded exponential backoff for transient remote failures
//! - **Sync Orchestrator** (`orchestrator`): One run at a time, per-candidate isolation
//! - **Scheduler** (`scheduler`): Recurring automatic runs
//! - **Database** (`db`): State pool with embedded migrations

pub mod db;
pub mod digest;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use core_runtime::SyncMode;
pub use digest::Sha256Digester;
pub use error::{Result, SyncError};
pub use history::{RunHistory, SqliteRunHistory};
pub use orchestrator::{ActiveRun, SyncConfig, SyncOrchestrator};
pub use report::{
    CandidateOutcome, FailureKind, RunError, RunId, RunOptions, RunStatus, RunSummary,
    SyncOutcome, SyncRunReport,
};
pub use retry::{RetryError, RetryPolicy};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use state::{RecordStatus, SqliteSyncStateStore, SyncRecord, SyncStateStore};
