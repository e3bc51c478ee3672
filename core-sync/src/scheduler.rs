//! # Automatic Sync Scheduler
//!
//! Recurring trigger that starts an automatic run every interval.
//!
//! The scheduler is a spawned task owning its own [`CancellationToken`]. A
//! tick that arrives while a run is in flight is skipped, not queued. Each run
//! is spawned as its own task, so stopping the scheduler only stops future
//! ticks and never interrupts a run that already started.

use crate::orchestrator::SyncOrchestrator;
use crate::report::RunOptions;
use crate::SyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Starts the recurring trigger
pub struct SyncScheduler;

impl SyncScheduler {
    /// Spawn the scheduler task
    ///
    /// The first tick fires one `interval` after start. Must be called from
    /// within a tokio runtime.
    pub fn start(
        orchestrator: Arc<SyncOrchestrator>,
        interval: Duration,
        marker_tag: impl Into<String>,
    ) -> SchedulerHandle {
        let interval = interval.max(Duration::from_secs(1));
        let marker_tag = marker_tag.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        info!(
            interval_secs = interval.as_secs(),
            marker_tag = %marker_tag,
            "Starting sync scheduler"
        );

        let join = tokio::spawn(
            async move {
                let mut ticker = interval_at(Instant::now() + interval, interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }

                    if orchestrator.is_running() {
                        debug!("Sync run in progress, skipping scheduled tick");
                        continue;
                    }

                    let orchestrator = orchestrator.clone();
                    let options = RunOptions::automatic(marker_tag.clone());
                    tokio::spawn(async move {
                        match orchestrator.run_sync(options).await {
                            Ok(report) => debug!(
                                run_id = %report.run_id,
                                status = %report.status,
                                "Scheduled run finished"
                            ),
                            Err(SyncError::RunAlreadyInProgress { run_id }) => {
                                debug!(run_id = %run_id, "Run started concurrently, skipping tick")
                            }
                            Err(e) => warn!(error = %e, "Scheduled run failed to start"),
                        }
                    });
                }

                info!("Sync scheduler stopped");
            }
            .instrument(tracing::info_span!("sync_scheduler")),
        );

        SchedulerHandle {
            cancel,
            join: Some(join),
            interval,
        }
    }
}

/// Handle to a running scheduler; dropping it stops future ticks
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
    interval: Duration,
}

impl SchedulerHandle {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self
                .join
                .as_ref()
                .map(|join| !join.is_finished())
                .unwrap_or(false)
    }

    /// Stop future ticks and wait for the scheduler task to exit
    ///
    /// An in-flight run keeps going.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::state::SqliteSyncStateStore;
    use async_trait::async_trait;
    use bridge_traits::catalog::{self, BookCandidate, CatalogReader};
    use bridge_traits::time::SystemClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCatalog {
        listings: AtomicUsize,
    }

    #[async_trait]
    impl CatalogReader for CountingCatalog {
        async fn list_candidates(&self, _marker_tag: &str) -> catalog::Result<Vec<BookCandidate>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    struct NoopUploader;

    #[async_trait]
    impl bridge_traits::remote::RemoteUploader for NoopUploader {
        async fn upload(
            &self,
            _file_path: &std::path::Path,
            _request: &bridge_traits::remote::UploadRequest,
        ) -> bridge_traits::remote::Result<bridge_traits::remote::RemoteId> {
            Ok(bridge_traits::remote::RemoteId::new("unused"))
        }

        async fn remove_marker(
            &self,
            _identity: bridge_traits::catalog::BookId,
            _marker_tag: &str,
        ) -> bridge_traits::remote::Result<()> {
            Ok(())
        }
    }

    async fn orchestrator(catalog: Arc<CountingCatalog>) -> Arc<SyncOrchestrator> {
        let state = Arc::new(SqliteSyncStateStore::new(create_test_pool().await.unwrap()));
        Arc::new(SyncOrchestrator::new(
            catalog,
            Some(Arc::new(NoopUploader)),
            state,
            Arc::new(SystemClock),
        ))
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    // The state pool is opened before the clock is paused so sqlx timeouts
    // are not auto-advanced.
    #[tokio::test]
    async fn test_first_tick_after_one_interval() {
        let catalog = Arc::new(CountingCatalog::default());
        let orchestrator = orchestrator(catalog.clone()).await;
        tokio::time::pause();
        let handle = SyncScheduler::start(orchestrator, Duration::from_secs(60), "bf");

        settle().await;
        assert_eq!(catalog.listings.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(catalog.listings.load(Ordering::SeqCst), 1);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_prevents_future_ticks() {
        let catalog = Arc::new(CountingCatalog::default());
        let orchestrator = orchestrator(catalog.clone()).await;
        tokio::time::pause();
        let handle = SyncScheduler::start(orchestrator, Duration::from_secs(60), "bf");
        assert!(handle.is_running());

        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(300)).await;
        settle().await;

        assert_eq!(catalog.listings.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interval_has_a_floor() {
        let catalog = Arc::new(CountingCatalog::default());
        let handle = SyncScheduler::start(orchestrator(catalog).await, Duration::ZERO, "bf");
        assert_eq!(handle.interval(), Duration::from_secs(1));
        handle.stop().await;
    }
}
