//! # Sync Orchestrator
//!
//! Coordinates one sync run from catalog listing to recorded outcomes.
//!
//! ## Overview
//!
//! For each candidate, in catalog order:
//! 1. Resolve the file; an unresolved file is an `IoError` outcome
//! 2. Compute the content digest; a read failure is an `IoError` outcome
//! 3. Ask the state store whether the content is already synced (`Skipped`)
//! 4. Upload with retry; a terminal failure is `Failed` and is persisted
//! 5. Remove the marker with retry; a failure is `PartialSuccess`
//! 6. Persist the success (`Synced` or `PartialSuccess`)
//!
//! Per-candidate failures never stop the run. A rejected credential, a
//! state store failure, cancellation or the run timeout end the run after the
//! current candidate's outcome is recorded, and the partial report is
//! returned with a run-level [`RunError`].
//!
//! ## Exclusivity
//!
//! At most one run is in flight per orchestrator. The run slot is claimed
//! atomically on entry; a second trigger is rejected with
//! [`SyncError::RunAlreadyInProgress`] and never queued. The slot is released
//! by a guard on every exit path, including the run future being dropped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(catalog, Some(uploader), state, clock)
//!     .with_history(history);
//! let report = orchestrator.run_sync(RunOptions::manual("bf")).await?;
//! println!("{} synced", report.synced_count());
//! ```

use crate::digest::Sha256Digester;
use crate::history::RunHistory;
use crate::report::{FailureKind, RunError, RunId, RunOptions, SyncOutcome, SyncRunReport};
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::state::SyncStateStore;
use crate::{Result, SyncError};
use bridge_traits::catalog::{BookCandidate, BookFile, CatalogReader};
use bridge_traits::remote::{RemoteError, RemoteUploader, UploadRequest};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::logging::strip_path;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Orchestrator timeouts and retry policy
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Bound on a single upload attempt
    pub upload_timeout: Duration,

    /// Bound on a single marker removal attempt
    pub marker_timeout: Duration,

    /// Bound on hashing one file
    pub digest_timeout: Duration,

    /// Bound on the entire run
    pub run_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(600),
            marker_timeout: Duration::from_secs(60),
            digest_timeout: Duration::from_secs(300),
            run_timeout: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
        }
    }
}

/// The run currently holding the slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveRun {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
}

enum RunSlot {
    Idle,
    Running {
        run: ActiveRun,
        cancel: CancellationToken,
    },
}

/// Releases the run slot when the run ends or its future is dropped
struct RunSlotGuard<'a> {
    slot: &'a Mutex<RunSlot>,
    run_id: RunId,
}

impl Drop for RunSlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock_slot(self.slot);
        if matches!(&*slot, RunSlot::Running { run, .. } if run.run_id == self.run_id) {
            *slot = RunSlot::Idle;
        }
    }
}

fn lock_slot(slot: &Mutex<RunSlot>) -> MutexGuard<'_, RunSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Coordinates catalog, digest, state store and remote into sync runs
pub struct SyncOrchestrator {
    catalog: Arc<dyn CatalogReader>,
    uploader: Option<Arc<dyn RemoteUploader>>,
    state: Arc<dyn SyncStateStore>,
    history: Option<Arc<dyn RunHistory>>,
    digester: Sha256Digester,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    slot: Mutex<RunSlot>,
}

impl SyncOrchestrator {
    /// Create an orchestrator
    ///
    /// Without an uploader every run ends immediately with
    /// [`RunError::NotConfigured`].
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        uploader: Option<Arc<dyn RemoteUploader>>,
        state: Arc<dyn SyncStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            uploader,
            state,
            history: None,
            digester: Sha256Digester::new(),
            clock,
            config: SyncConfig::default(),
            slot: Mutex::new(RunSlot::Idle),
        }
    }

    /// Persist a summary of every finished, non-cancelled run
    pub fn with_history(mut self, history: Arc<dyn RunHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_running(&self) -> bool {
        matches!(&*lock_slot(&self.slot), RunSlot::Running { .. })
    }

    pub fn current_run(&self) -> Option<ActiveRun> {
        match &*lock_slot(&self.slot) {
            RunSlot::Running { run, .. } => Some(run.clone()),
            RunSlot::Idle => None,
        }
    }

    /// Request cancellation of the in-flight run
    ///
    /// Returns `false` when no run is in flight.
    pub fn cancel_current(&self) -> bool {
        match &*lock_slot(&self.slot) {
            RunSlot::Running { run, cancel } => {
                info!(run_id = %run.run_id, "Cancelling sync run");
                cancel.cancel();
                true
            }
            RunSlot::Idle => false,
        }
    }

    fn claim(&self, run_id: RunId, cancel: CancellationToken) -> Result<RunSlotGuard<'_>> {
        let mut slot = lock_slot(&self.slot);
        if let RunSlot::Running { run, .. } = &*slot {
            return Err(SyncError::RunAlreadyInProgress {
                run_id: run.run_id.to_string(),
            });
        }
        *slot = RunSlot::Running {
            run: ActiveRun {
                run_id,
                started_at: self.clock.now(),
            },
            cancel,
        };
        Ok(RunSlotGuard {
            slot: &self.slot,
            run_id,
        })
    }

    /// Perform one sync run
    ///
    /// Run-level failures are reported inside the returned report.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RunAlreadyInProgress`] if another run holds the
    /// slot; nothing is read or written in that case.
    pub async fn run_sync(&self, options: RunOptions) -> Result<SyncRunReport> {
        let run_id = RunId::new();
        let cancel = CancellationToken::new();
        let _guard = match self.claim(run_id, cancel.clone()) {
            Ok(guard) => guard,
            Err(e) => {
                warn!(mode = %options.mode, error = %e, "Sync trigger rejected");
                return Err(e);
            }
        };

        let span = info_span!("sync_run", run_id = %run_id, mode = %options.mode);
        Ok(self.run_claimed(run_id, options, cancel).instrument(span).await)
    }

    async fn run_claimed(
        &self,
        run_id: RunId,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> SyncRunReport {
        let mut report = SyncRunReport::start(run_id, &options, self.clock.now());
        info!(
            force_resync = options.force_resync,
            marker_tag = %options.marker_tag,
            "Sync run started"
        );

        let run_timeout = self.config.run_timeout;
        let result =
            tokio::time::timeout(run_timeout, self.execute(&options, &cancel, &mut report)).await;
        let run_error = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => {
                cancel.cancel();
                Some(RunError::TimedOut {
                    after_secs: run_timeout.as_secs(),
                })
            }
        };

        report.finish(run_error, self.clock.now());

        match &report.error {
            None => info!(
                status = %report.status,
                total = report.outcomes.len(),
                synced = report.synced_count(),
                skipped = report.skipped_count(),
                partial = report.partial_count(),
                failed = report.failed_count(),
                "Sync run finished"
            ),
            Some(RunError::Cancelled) => {
                warn!(processed = report.outcomes.len(), "Sync run cancelled")
            }
            Some(e) => error!(
                error = %e,
                processed = report.outcomes.len(),
                "Sync run aborted"
            ),
        }

        if !matches!(report.error, Some(RunError::Cancelled)) {
            if let Some(history) = &self.history {
                if let Err(e) = history.record(&report.summary()).await {
                    warn!(error = %e, "Failed to record run summary");
                }
            }
        }

        report
    }

    async fn execute(
        &self,
        options: &RunOptions,
        cancel: &CancellationToken,
        report: &mut SyncRunReport,
    ) -> std::result::Result<(), RunError> {
        let uploader = self.uploader.as_deref().ok_or(RunError::NotConfigured)?;

        let listing = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            listing = self.catalog.list_candidates(&options.marker_tag) => listing,
        };
        let candidates = listing.map_err(|e| RunError::CatalogUnavailable {
            reason: e.to_string(),
        })?;
        info!(candidates = candidates.len(), "Listed candidates");

        for candidate in &candidates {
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled);
            }
            self.process_candidate(uploader, candidate, options, cancel, report)
                .await?;
        }

        Ok(())
    }

    /// Process one candidate and append its outcome to `report`
    ///
    /// `Err` means the run must stop; any outcome for this candidate has
    /// already been recorded.
    async fn process_candidate(
        &self,
        uploader: &dyn RemoteUploader,
        candidate: &BookCandidate,
        options: &RunOptions,
        cancel: &CancellationToken,
        report: &mut SyncRunReport,
    ) -> std::result::Result<(), RunError> {
        let identity = candidate.identity;

        let path = match &candidate.file {
            BookFile::Located(path) => path.as_path(),
            BookFile::Unresolved { reason } => {
                record_outcome(
                    report,
                    candidate,
                    SyncOutcome::IoError {
                        reason: reason.clone(),
                    },
                );
                return Ok(());
            }
        };

        let digest = match tokio::time::timeout(
            self.config.digest_timeout,
            self.digester.fingerprint(path, cancel),
        )
        .await
        {
            Ok(Ok(digest)) => digest,
            Ok(Err(SyncError::Cancelled)) => return Err(RunError::Cancelled),
            Ok(Err(e)) => {
                record_outcome(
                    report,
                    candidate,
                    SyncOutcome::IoError {
                        reason: e.to_string(),
                    },
                );
                return Ok(());
            }
            Err(_) => {
                record_outcome(
                    report,
                    candidate,
                    SyncOutcome::IoError {
                        reason: format!(
                            "Digest timed out after {}s",
                            self.config.digest_timeout.as_secs()
                        ),
                    },
                );
                return Ok(());
            }
        };

        debug!(
            book_id = %identity,
            file = %strip_path(&path.to_string_lossy()),
            digest = %digest,
            "Digest computed"
        );

        if self
            .state
            .should_skip(identity, &digest, options.force_resync)
            .await
            .map_err(state_error)?
        {
            record_outcome(report, candidate, SyncOutcome::Skipped);
            return Ok(());
        }

        let request = UploadRequest {
            identity,
            file_name: file_name(path),
            digest: digest.clone(),
            metadata: candidate.metadata.clone(),
        };
        let upload = {
            let request = &request;
            with_retry(
                &self.config.retry,
                "upload",
                self.config.upload_timeout,
                cancel,
                move || uploader.upload(path, request),
            )
            .await
        };

        let remote_id = match upload {
            Ok(remote_id) => remote_id,
            Err(RetryError::Cancelled) => return Err(RunError::Cancelled),
            Err(RetryError::Remote(remote_error)) => {
                let reason = remote_error.to_string();
                record_outcome(
                    report,
                    candidate,
                    SyncOutcome::Failed {
                        error: FailureKind::from(&remote_error),
                        reason: reason.clone(),
                    },
                );
                self.state
                    .record_failure(identity, self.clock.now(), &reason)
                    .await
                    .map_err(state_error)?;

                return match remote_error {
                    RemoteError::Auth(_) => Err(RunError::AuthRejected { identity }),
                    RemoteError::RateLimited { .. }
                    | RemoteError::Network(_)
                    | RemoteError::Rejected { .. } => Ok(()),
                };
            }
        };

        let marker_tag = options.marker_tag.as_str();
        let removal = with_retry(
            &self.config.retry,
            "remove_marker",
            self.config.marker_timeout,
            cancel,
            move || uploader.remove_marker(identity, marker_tag),
        )
        .await;

        let (outcome, cancelled) = match removal {
            Ok(()) => (SyncOutcome::Synced { remote_id }, false),
            Err(RetryError::Remote(e)) => (
                SyncOutcome::PartialSuccess {
                    remote_id,
                    reason: format!("Marker removal failed: {}", e),
                },
                false,
            ),
            Err(RetryError::Cancelled) => (
                SyncOutcome::PartialSuccess {
                    remote_id,
                    reason: "Marker removal cancelled".to_string(),
                },
                true,
            ),
        };

        // The upload is confirmed either way
        record_outcome(report, candidate, outcome);
        self.state
            .record_success(identity, &digest, self.clock.now())
            .await
            .map_err(state_error)?;

        if cancelled {
            return Err(RunError::Cancelled);
        }
        Ok(())
    }
}

fn record_outcome(report: &mut SyncRunReport, candidate: &BookCandidate, outcome: SyncOutcome) {
    match &outcome {
        SyncOutcome::Synced { remote_id } => info!(
            book_id = %candidate.identity,
            title = %candidate.title,
            remote_id = %remote_id,
            "Book synced"
        ),
        SyncOutcome::Skipped => info!(
            book_id = %candidate.identity,
            title = %candidate.title,
            "Book already synced, skipping"
        ),
        other => warn!(
            book_id = %candidate.identity,
            title = %candidate.title,
            outcome = other.label(),
            reason = other.reason().unwrap_or_default(),
            "Book not fully synced"
        ),
    }
    report.push(candidate.identity, &candidate.title, outcome);
}

fn state_error(e: SyncError) -> RunError {
    RunError::StateStore {
        reason: e.to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book.epub".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::report::RunStatus;
    use crate::state::{RecordStatus, SqliteSyncStateStore};
    use async_trait::async_trait;
    use bridge_traits::catalog::{self, BookId, BookMetadata, CatalogError};
    use bridge_traits::remote::{self, RemoteId};
    use bridge_traits::time::FixedClock;
    use chrono::TimeZone;
    use mockall::mock;
    use std::path::PathBuf;

    mock! {
        Uploader {}

        #[async_trait]
        impl RemoteUploader for Uploader {
            async fn upload(&self, file_path: &Path, request: &UploadRequest) -> remote::Result<RemoteId>;
            async fn remove_marker(&self, identity: BookId, marker_tag: &str) -> remote::Result<()>;
        }
    }

    struct StaticCatalog {
        result: catalog::Result<Vec<BookCandidate>>,
    }

    #[async_trait]
    impl CatalogReader for StaticCatalog {
        async fn list_candidates(&self, _marker_tag: &str) -> catalog::Result<Vec<BookCandidate>> {
            self.result.clone()
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        candidates: Vec<BookCandidate>,
        state: Arc<SqliteSyncStateStore>,
    }

    impl Harness {
        async fn new(titles: &[&str]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut candidates = Vec::new();
            for (i, title) in titles.iter().enumerate() {
                let path = dir.path().join(format!("{}.epub", title));
                tokio::fs::write(&path, format!("content of {}", title))
                    .await
                    .unwrap();
                candidates.push(BookCandidate {
                    identity: BookId::new(i as i64 + 1),
                    title: title.to_string(),
                    file: BookFile::Located(path),
                    metadata: BookMetadata::titled(*title),
                    marker_present: true,
                });
            }
            let state = Arc::new(SqliteSyncStateStore::new(create_test_pool().await.unwrap()));
            Self {
                _dir: dir,
                candidates,
                state,
            }
        }

        fn orchestrator(&self, uploader: MockUploader) -> SyncOrchestrator {
            let clock = FixedClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
            SyncOrchestrator::new(
                Arc::new(StaticCatalog {
                    result: Ok(self.candidates.clone()),
                }),
                Some(Arc::new(uploader)),
                self.state.clone(),
                Arc::new(clock),
            )
            .with_config(SyncConfig {
                retry: RetryPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                },
                ..SyncConfig::default()
            })
        }
    }

    #[tokio::test]
    async fn test_successful_run_uploads_and_removes_marker() {
        let harness = Harness::new(&["Dune", "Emma"]).await;
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .times(2)
            .returning(|_, request| Ok(RemoteId::new(format!("r{}", request.identity))));
        uploader
            .expect_remove_marker()
            .withf(|_, tag| tag.to_string() == "bf")
            .times(2)
            .returning(|_, _| Ok(()));

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.synced_count(), 2);
        assert_eq!(
            report.outcome_for(BookId::new(1)),
            Some(&SyncOutcome::Synced {
                remote_id: RemoteId::new("r1")
            })
        );
        let record = harness.state.get(BookId::new(2)).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Synced);
    }

    #[tokio::test]
    async fn test_upload_request_carries_file_name_and_digest() {
        let harness = Harness::new(&["Dune"]).await;
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .withf(|path, request| {
                path.ends_with("Dune.epub")
                    && request.file_name == "Dune.epub"
                    && request.digest.len() == 64
                    && request.metadata.title == "Dune"
            })
            .times(1)
            .returning(|_, _| Ok(RemoteId::new("r1")));
        uploader.expect_remove_marker().returning(|_, _| Ok(()));

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();
        assert_eq!(report.synced_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_upload_failure_is_retried() {
        let harness = Harness::new(&["Dune"]).await;
        let mut uploader = MockUploader::new();
        let mut seq = mockall::Sequence::new();
        uploader
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(RemoteError::Network("reset".to_string())));
        uploader
            .expect_upload()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(RemoteId::new("r1")));
        uploader.expect_remove_marker().returning(|_, _| Ok(()));

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();
        assert_eq!(report.synced_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_failure_and_continue() {
        let harness = Harness::new(&["Dune", "Emma"]).await;
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .withf(|_, request| request.identity == BookId::new(1))
            .times(3)
            .returning(|_, _| {
                Err(RemoteError::RateLimited {
                    retry_after: None,
                    message: "slow down".to_string(),
                })
            });
        uploader
            .expect_upload()
            .withf(|_, request| request.identity == BookId::new(2))
            .times(1)
            .returning(|_, _| Ok(RemoteId::new("r2")));
        uploader.expect_remove_marker().times(1).returning(|_, _| Ok(()));

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        assert!(matches!(
            report.outcome_for(BookId::new(1)),
            Some(SyncOutcome::Failed {
                error: FailureKind::RateLimited,
                ..
            })
        ));
        let record = harness.state.get(BookId::new(1)).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn test_rejected_upload_is_not_retried() {
        let harness = Harness::new(&["Dune"]).await;
        let mut uploader = MockUploader::new();
        uploader.expect_upload().times(1).returning(|_, _| {
            Err(RemoteError::Rejected {
                status: Some(415),
                message: "unsupported format".to_string(),
            })
        });
        uploader.expect_remove_marker().never();

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();
        assert!(matches!(
            report.outcome_for(BookId::new(1)),
            Some(SyncOutcome::Failed {
                error: FailureKind::RemoteRejected,
                ..
            })
        ));
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn test_marker_failure_is_partial_success() {
        let harness = Harness::new(&["Dune"]).await;
        let mut uploader = MockUploader::new();
        uploader
            .expect_upload()
            .times(1)
            .returning(|_, _| Ok(RemoteId::new("r1")));
        uploader.expect_remove_marker().times(1).returning(|_, _| {
            Err(RemoteError::Rejected {
                status: None,
                message: "no such tag".to_string(),
            })
        });

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();

        assert_eq!(report.partial_count(), 1);
        assert_eq!(report.status, RunStatus::CompletedWithErrors);
        let record = harness.state.get(BookId::new(1)).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Synced);
    }

    #[tokio::test]
    async fn test_missing_uploader_is_not_configured() {
        let harness = Harness::new(&["Dune"]).await;
        let orchestrator = SyncOrchestrator::new(
            Arc::new(StaticCatalog {
                result: Ok(harness.candidates.clone()),
            }),
            None,
            harness.state.clone(),
            Arc::new(bridge_traits::time::SystemClock),
        );

        let report = orchestrator.run_sync(RunOptions::manual("bf")).await.unwrap();
        assert_eq!(report.error, Some(RunError::NotConfigured));
        assert!(report.outcomes.is_empty());
        assert!(!orchestrator.is_running());
    }

    #[tokio::test]
    async fn test_catalog_unavailable_aborts_with_empty_report() {
        let state = Arc::new(SqliteSyncStateStore::new(create_test_pool().await.unwrap()));
        let mut uploader = MockUploader::new();
        uploader.expect_upload().never();
        let orchestrator = SyncOrchestrator::new(
            Arc::new(StaticCatalog {
                result: Err(CatalogError::Unavailable("no metadata.db".to_string())),
            }),
            Some(Arc::new(uploader)),
            state,
            Arc::new(bridge_traits::time::SystemClock),
        );

        let report = orchestrator.run_sync(RunOptions::manual("bf")).await.unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert!(matches!(
            report.error,
            Some(RunError::CatalogUnavailable { .. })
        ));
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_file_is_io_error() {
        let mut harness = Harness::new(&["Dune"]).await;
        harness.candidates[0].file = BookFile::Unresolved {
            reason: "No EPUB found".to_string(),
        };
        let mut uploader = MockUploader::new();
        uploader.expect_upload().never();

        let report = harness
            .orchestrator(uploader)
            .run_sync(RunOptions::manual("bf"))
            .await
            .unwrap();
        assert_eq!(
            report.outcome_for(BookId::new(1)),
            Some(&SyncOutcome::IoError {
                reason: "No EPUB found".to_string()
            })
        );
        // No remote call, no state write
        assert!(harness.state.get(BookId::new(1)).await.unwrap().is_none());
    }

    #[test]
    fn test_file_name_fallback() {
        assert_eq!(file_name(&PathBuf::from("/lib/a/Dune.epub")), "Dune.epub");
        assert_eq!(file_name(&PathBuf::from("/")), "book.epub");
    }

    #[test]
    fn test_slot_guard_releases_on_drop() {
        let slot = Mutex::new(RunSlot::Idle);
        let run_id = RunId::new();
        *lock_slot(&slot) = RunSlot::Running {
            run: ActiveRun {
                run_id,
                started_at: Utc::now(),
            },
            cancel: CancellationToken::new(),
        };

        drop(RunSlotGuard {
            slot: &slot,
            run_id,
        });
        assert!(matches!(&*lock_slot(&slot), RunSlot::Idle));
    }
}
