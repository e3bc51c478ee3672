//! # Run Reports
//!
//! Per-candidate outcomes and the aggregated report of one sync run.
//!
//! ## Overview
//!
//! A [`SyncRunReport`] is built by the orchestrator while the run progresses
//! and returned to the trigger. It serializes to JSON for hosts that render
//! it. Run-level failures (catalog unavailable, credential rejected, state
//! store failure) are carried inside the report together with every outcome
//! recorded before the abort.

use bridge_traits::catalog::BookId;
use bridge_traits::remote::{RemoteError, RemoteId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{Result, SyncError, SyncMode};

/// Unique identifier of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from its string form
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidRunId`] if the string is not a UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidRunId(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Options for a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Re-upload even when the stored digest matches
    pub force_resync: bool,
    /// Catalog tag that flags a book for sync
    pub marker_tag: String,
    /// Who triggered the run; reporting only
    pub mode: SyncMode,
}

impl RunOptions {
    pub fn manual(marker_tag: impl Into<String>) -> Self {
        Self {
            force_resync: false,
            marker_tag: marker_tag.into(),
            mode: SyncMode::Manual,
        }
    }

    pub fn automatic(marker_tag: impl Into<String>) -> Self {
        Self {
            force_resync: false,
            marker_tag: marker_tag.into(),
            mode: SyncMode::Automatic,
        }
    }

    pub fn with_force(mut self, force_resync: bool) -> Self {
        self.force_resync = force_resync;
        self
    }
}

/// Closed classification of a terminal remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthError,
    RateLimited,
    NetworkError,
    RemoteRejected,
}

impl From<&RemoteError> for FailureKind {
    fn from(error: &RemoteError) -> Self {
        match error {
            RemoteError::Auth(_) => FailureKind::AuthError,
            RemoteError::RateLimited { .. } => FailureKind::RateLimited,
            RemoteError::Network(_) => FailureKind::NetworkError,
            RemoteError::Rejected { .. } => FailureKind::RemoteRejected,
        }
    }
}

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Uploaded and marker removed
    Synced { remote_id: RemoteId },
    /// Content already on the remote; no call was made
    Skipped,
    /// Uploaded, but the marker could not be removed
    PartialSuccess { remote_id: RemoteId, reason: String },
    /// The remote refused or kept failing
    Failed { error: FailureKind, reason: String },
    /// File missing or unreadable
    IoError { reason: String },
}

impl SyncOutcome {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Synced { .. } => "synced",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::PartialSuccess { .. } => "partial_success",
            SyncOutcome::Failed { .. } => "failed",
            SyncOutcome::IoError { .. } => "io_error",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SyncOutcome::PartialSuccess { reason, .. }
            | SyncOutcome::Failed { reason, .. }
            | SyncOutcome::IoError { reason } => Some(reason),
            SyncOutcome::Synced { .. } | SyncOutcome::Skipped => None,
        }
    }
}

/// One entry of the report, in catalog order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateOutcome {
    pub identity: BookId,
    pub title: String,
    pub outcome: SyncOutcome,
}

/// Failures that end a run early
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunError {
    #[error("Catalog unavailable: {reason}")]
    CatalogUnavailable { reason: String },

    #[error("Authentication rejected while syncing book {identity}")]
    AuthRejected { identity: BookId },

    #[error("BookFusion API key is not configured")]
    NotConfigured,

    #[error("State store failure: {reason}")]
    StateStore { reason: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run exceeded {after_secs} seconds")]
    TimedOut { after_secs: u64 },
}

/// Overall status of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every candidate synced or skipped
    Completed,
    /// All candidates processed, some did not fully succeed
    CompletedWithErrors,
    /// A run-level error stopped processing
    Aborted,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Aborted => "aborted",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "completed" => Ok(RunStatus::Completed),
            "completed_with_errors" => Ok(RunStatus::CompletedWithErrors),
            "aborted" => Ok(RunStatus::Aborted),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(SyncError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated result of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunReport {
    pub run_id: RunId,
    pub mode: SyncMode,
    pub force_resync: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<CandidateOutcome>,
    pub status: RunStatus,
    pub error: Option<RunError>,
}

impl SyncRunReport {
    pub(crate) fn start(run_id: RunId, options: &RunOptions, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            mode: options.mode,
            force_resync: options.force_resync,
            started_at,
            finished_at: None,
            outcomes: Vec::new(),
            status: RunStatus::Completed,
            error: None,
        }
    }

    pub(crate) fn push(&mut self, identity: BookId, title: &str, outcome: SyncOutcome) {
        self.outcomes.push(CandidateOutcome {
            identity,
            title: title.to_string(),
            outcome,
        });
    }

    /// Seal the report and derive its status
    pub(crate) fn finish(&mut self, error: Option<RunError>, finished_at: DateTime<Utc>) {
        self.status = match &error {
            Some(RunError::Cancelled) => RunStatus::Cancelled,
            Some(_) => RunStatus::Aborted,
            None if self.failed_count() + self.partial_count() > 0 => {
                RunStatus::CompletedWithErrors
            }
            None => RunStatus::Completed,
        };
        self.error = error;
        self.finished_at = Some(finished_at);
    }

    pub fn synced_count(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Synced { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Skipped))
    }

    pub fn partial_count(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::PartialSuccess { .. }))
    }

    /// Remote failures plus I/O errors
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Failed { .. } | SyncOutcome::IoError { .. }))
    }

    fn count(&self, predicate: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|c| predicate(&c.outcome)).count()
    }

    /// Outcome recorded for `identity`, if the run reached it
    pub fn outcome_for(&self, identity: BookId) -> Option<&SyncOutcome> {
        self.outcomes
            .iter()
            .find(|c| c.identity == identity)
            .map(|c| &c.outcome)
    }

    /// Persistable projection of the report
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            mode: self.mode,
            force_resync: self.force_resync,
            status: self.status,
            started_at: self.started_at,
            finished_at: self.finished_at.unwrap_or(self.started_at),
            total: self.outcomes.len() as u32,
            synced: self.synced_count() as u32,
            partial: self.partial_count() as u32,
            skipped: self.skipped_count() as u32,
            failed: self.failed_count() as u32,
            message: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Counters of a finished run, as kept by the run history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub mode: SyncMode,
    pub force_resync: bool,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: u32,
    pub synced: u32,
    pub partial: u32,
    pub skipped: u32,
    pub failed: u32,
    pub message: Option<String>,
}
