//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host bridges (HTTP, settings), the Calibre catalog
//! and the BookFusion provider into the sync engine, and owns the mode
//! switch between manual runs and the automatic scheduler. Hosts build a
//! [`SyncService`] with [`bootstrap`] from an [`AppConfig`], or from explicit
//! [`ServiceDependencies`] in tests.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;
use std::time::Duration;

use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore};
use bridge_traits::{
    catalog::{CatalogMarkerWriter, CatalogReader},
    remote::RemoteUploader,
    storage::SettingsStore,
    time::{Clock, SystemClock},
};
use core_catalog::{CalibreCatalog, CalibreMarkerWriter};
use core_runtime::{AppConfig, SyncMode};
use core_sync::db::{create_pool, DatabaseConfig};
use core_sync::{
    ActiveRun, RecordStatus, RunHistory, RunOptions, RunSummary, SchedulerHandle,
    SqliteRunHistory, SqliteSyncStateStore, SyncConfig, SyncOrchestrator, SyncRecord,
    SyncRunReport, SyncScheduler, SyncStateStore,
};
use provider_bookfusion::BookFusionUploader;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Settings key holding the persisted [`SyncMode`]
pub const SYNC_MODE_SETTING: &str = "sync_mode";

/// Aggregated handle to everything the service drives.
pub struct ServiceDependencies {
    pub catalog: Arc<dyn CatalogReader>,
    /// `None` while no API key is configured
    pub uploader: Option<Arc<dyn RemoteUploader>>,
    pub state: Arc<dyn SyncStateStore>,
    pub history: Arc<dyn RunHistory>,
    pub settings: Arc<dyn SettingsStore>,
    pub clock: Arc<dyn Clock>,
}

/// Service tunables, usually derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub marker_tag: String,
    pub interval: Duration,
    /// Mode used when nothing is persisted yet
    pub default_mode: SyncMode,
    pub sync: SyncConfig,
}

impl ServiceOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            marker_tag: config.sync_tag.clone(),
            interval: config.sync_interval,
            default_mode: config.default_mode,
            sync: SyncConfig::default(),
        }
    }
}

/// Point-in-time view for status pages
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub mode: SyncMode,
    pub interval_secs: u64,
    pub configured: bool,
    pub scheduler_active: bool,
    pub current_run: Option<ActiveRun>,
    pub last_run: Option<RunSummary>,
}

struct Control {
    mode: SyncMode,
    interval: Duration,
    scheduler: Option<SchedulerHandle>,
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    orchestrator: Arc<SyncOrchestrator>,
    state: Arc<dyn SyncStateStore>,
    history: Arc<dyn RunHistory>,
    settings: Arc<dyn SettingsStore>,
    marker_tag: String,
    default_mode: SyncMode,
    configured: bool,
    control: Arc<Mutex<Control>>,
}

impl SyncService {
    /// Create a new service from the provided dependencies.
    ///
    /// The service starts in manual mode with no scheduler; call
    /// [`SyncService::start`] to apply the persisted mode.
    pub fn new(deps: ServiceDependencies, options: ServiceOptions) -> Self {
        let configured = deps.uploader.is_some();
        let orchestrator = SyncOrchestrator::new(
            deps.catalog,
            deps.uploader,
            deps.state.clone(),
            deps.clock,
        )
        .with_history(deps.history.clone())
        .with_config(options.sync);

        Self {
            orchestrator: Arc::new(orchestrator),
            state: deps.state,
            history: deps.history,
            settings: deps.settings,
            marker_tag: options.marker_tag,
            default_mode: options.default_mode,
            configured,
            control: Arc::new(Mutex::new(Control {
                mode: SyncMode::Manual,
                interval: options.interval,
                scheduler: None,
            })),
        }
    }

    /// Apply the persisted mode (or the configured default) and return it
    pub async fn start(&self) -> Result<SyncMode> {
        let mode = self.persisted_mode().await?;
        self.apply_mode(mode).await;
        info!(mode = %mode, configured = self.configured, "Sync service started");
        Ok(mode)
    }

    /// Run a manual sync now
    ///
    /// # Errors
    ///
    /// [`CoreError::Sync`] wrapping `RunAlreadyInProgress` when a run is in
    /// flight. Every other failure is reported inside the returned report.
    pub async fn run_now(&self, force_resync: bool) -> Result<SyncRunReport> {
        let options = RunOptions::manual(self.marker_tag.as_str()).with_force(force_resync);
        Ok(self.orchestrator.run_sync(options).await?)
    }

    pub async fn mode(&self) -> SyncMode {
        self.control.lock().await.mode
    }

    /// Persist `mode` and start or stop the scheduler accordingly
    pub async fn set_mode(&self, mode: SyncMode) -> Result<()> {
        self.settings
            .set_string(SYNC_MODE_SETTING, mode.as_str())
            .await?;
        self.apply_mode(mode).await;
        info!(mode = %mode, "Sync mode changed");
        Ok(())
    }

    /// Change the automatic interval, restarting an active scheduler
    pub async fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(CoreError::InvalidArgument(
                "Sync interval must be greater than zero".to_string(),
            ));
        }

        let mut control = self.control.lock().await;
        control.interval = interval;
        if let Some(handle) = control.scheduler.take() {
            handle.stop().await;
            control.scheduler = Some(self.spawn_scheduler(interval));
        }
        info!(interval_secs = interval.as_secs(), "Sync interval changed");
        Ok(())
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let (mode, interval, scheduler_active) = {
            let control = self.control.lock().await;
            (control.mode, control.interval, control.scheduler.is_some())
        };

        Ok(ServiceStatus {
            mode,
            interval_secs: interval.as_secs(),
            configured: self.configured,
            scheduler_active,
            current_run: self.orchestrator.current_run(),
            last_run: self.history.latest().await?,
        })
    }

    /// Up to `limit` finished runs, newest first
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunSummary>> {
        Ok(self.history.recent(limit).await?)
    }

    pub async fn records(&self, status: Option<RecordStatus>) -> Result<Vec<SyncRecord>> {
        Ok(self.state.list_records(status).await?)
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// Cancel the in-flight run; `false` when nothing is running
    pub fn cancel(&self) -> bool {
        self.orchestrator.cancel_current()
    }

    /// Stop the scheduler, cancel any run and wait up to `grace` for it to end
    ///
    /// The persisted mode is left untouched.
    pub async fn shutdown(&self, grace: Duration) {
        if let Some(handle) = self.control.lock().await.scheduler.take() {
            handle.stop().await;
        }
        if !self.orchestrator.cancel_current() {
            return;
        }

        let deadline = tokio::time::Instant::now() + grace;
        while self.orchestrator.is_running() {
            if tokio::time::Instant::now() >= deadline {
                warn!(grace_secs = grace.as_secs(), "Sync run still active at shutdown");
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn persisted_mode(&self) -> Result<SyncMode> {
        let Some(raw) = self.settings.get_string(SYNC_MODE_SETTING).await? else {
            return Ok(self.default_mode);
        };
        match raw.parse() {
            Ok(mode) => Ok(mode),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring persisted sync mode");
                Ok(self.default_mode)
            }
        }
    }

    async fn apply_mode(&self, mode: SyncMode) {
        let mut control = self.control.lock().await;
        control.mode = mode;
        match mode {
            SyncMode::Automatic if control.scheduler.is_none() => {
                let interval = control.interval;
                control.scheduler = Some(self.spawn_scheduler(interval));
            }
            SyncMode::Manual => {
                if let Some(handle) = control.scheduler.take() {
                    handle.stop().await;
                }
            }
            SyncMode::Automatic => {}
        }
    }

    fn spawn_scheduler(&self, interval: Duration) -> SchedulerHandle {
        SyncScheduler::start(self.orchestrator.clone(), interval, self.marker_tag.as_str())
    }
}

/// Build a [`SyncService`] from configuration.
///
/// Opens (and migrates) the state database, which also holds the settings
/// table. Without an API key the service still starts, but every run ends
/// with `NotConfigured`.
///
/// ```ignore
/// let config = AppConfig::from_env()?;
/// let service = core_service::bootstrap(&config).await?;
/// service.start().await?;
/// ```
pub async fn bootstrap(config: &AppConfig) -> Result<SyncService> {
    config.validate()?;

    let pool = create_pool(DatabaseConfig::new(config.state_db_path.clone())).await?;
    let settings = SqliteSettingsStore::with_pool(pool.clone()).await?;

    let markers: Arc<dyn CatalogMarkerWriter> =
        Arc::new(CalibreMarkerWriter::new(config.library_dir.clone()));
    let uploader: Option<Arc<dyn RemoteUploader>> = match &config.api_key {
        Some(api_key) => {
            let http = Arc::new(ReqwestHttpClient::new()?);
            let uploader =
                BookFusionUploader::new(http, markers, config.api_base.as_str(), api_key.as_str())?;
            Some(Arc::new(uploader))
        }
        None => {
            warn!("BOOKFUSION_API_KEY is not configured; sync runs will not upload");
            None
        }
    };

    let deps = ServiceDependencies {
        catalog: Arc::new(CalibreCatalog::new(config.library_dir.clone())),
        uploader,
        state: Arc::new(SqliteSyncStateStore::new(pool.clone())),
        history: Arc::new(
            SqliteRunHistory::new(pool).with_retention(config.history_retention),
        ),
        settings: Arc::new(settings),
        clock: Arc::new(SystemClock),
    };

    Ok(SyncService::new(deps, ServiceOptions::from_config(config)))
}
