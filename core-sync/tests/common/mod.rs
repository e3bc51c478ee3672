//! In-memory fakes shared by the sync integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::catalog::{
    self, BookCandidate, BookFile, BookId, BookMetadata, CatalogError, CatalogReader,
};
use bridge_traits::remote::{self, RemoteError, RemoteId, RemoteUploader, UploadRequest};
use chrono::{DateTime, Utc};
use core_sync::{
    RecordStatus, RetryPolicy, SyncConfig, SyncOrchestrator, SyncRecord, SyncStateStore,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

// ============================================================================
// Catalog
// ============================================================================

/// Catalog returning a fixed list of candidates
#[derive(Default)]
pub struct FakeCatalog {
    candidates: Mutex<Vec<BookCandidate>>,
    unavailable: Mutex<Option<String>>,
    listings: AtomicUsize,
}

impl FakeCatalog {
    pub fn new(candidates: Vec<BookCandidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            ..Default::default()
        }
    }

    pub fn set_candidates(&self, candidates: Vec<BookCandidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.lock().unwrap() = reason.map(str::to_string);
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogReader for FakeCatalog {
    async fn list_candidates(&self, _marker_tag: &str) -> catalog::Result<Vec<BookCandidate>> {
        self.listings.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.unavailable.lock().unwrap().clone() {
            return Err(CatalogError::Unavailable(reason));
        }
        Ok(self.candidates.lock().unwrap().clone())
    }
}

/// Write `content` to `<dir>/<title>.epub` and describe it as a candidate
pub async fn write_candidate(dir: &Path, id: i64, title: &str, content: &str) -> BookCandidate {
    let path = dir.join(format!("{}.epub", title));
    tokio::fs::write(&path, content).await.unwrap();
    candidate_at(id, title, path)
}

pub fn candidate_at(id: i64, title: &str, path: PathBuf) -> BookCandidate {
    BookCandidate {
        identity: BookId::new(id),
        title: title.to_string(),
        file: BookFile::Located(path),
        metadata: BookMetadata::titled(title),
        marker_present: true,
    }
}

/// `count` candidates with distinct content, identities 1..=count
pub async fn library(dir: &Path, count: i64) -> Vec<BookCandidate> {
    let mut candidates = Vec::new();
    for id in 1..=count {
        let title = format!("Book {}", id);
        candidates.push(write_candidate(dir, id, &title, &format!("content {}", id)).await);
    }
    candidates
}

// ============================================================================
// Uploader
// ============================================================================

#[derive(Default)]
struct UploaderState {
    failing_uploads: HashMap<BookId, RemoteError>,
    failing_markers: HashMap<BookId, RemoteError>,
    hanging: HashSet<BookId>,
    uploads: Vec<UploadRequest>,
    removed_markers: Vec<BookId>,
}

/// Scriptable remote that records every call
#[derive(Default)]
pub struct FakeUploader {
    state: Mutex<UploaderState>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload waits for a permit on `gate`
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn fail_upload(&self, id: i64, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(BookId::new(id), error);
    }

    pub fn fail_marker(&self, id: i64, error: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .failing_markers
            .insert(BookId::new(id), error);
    }

    /// Uploads of `id` never complete
    pub fn hang_on(&self, id: i64) {
        self.state.lock().unwrap().hanging.insert(BookId::new(id));
    }

    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    pub fn uploaded_ids(&self) -> Vec<i64> {
        self.uploads().iter().map(|r| r.identity.value()).collect()
    }

    pub fn removed_markers(&self) -> Vec<BookId> {
        self.state.lock().unwrap().removed_markers.clone()
    }
}

#[async_trait]
impl RemoteUploader for FakeUploader {
    async fn upload(&self, _file_path: &Path, request: &UploadRequest) -> remote::Result<RemoteId> {
        let (hang, failure) = {
            let mut state = self.state.lock().unwrap();
            state.uploads.push(request.clone());
            (
                state.hanging.contains(&request.identity),
                state.failing_uploads.get(&request.identity).cloned(),
            )
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if hang {
            std::future::pending::<()>().await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(RemoteId::new(format!("bf-{}", request.identity))),
        }
    }

    async fn remove_marker(&self, identity: BookId, _marker_tag: &str) -> remote::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.failing_markers.get(&identity).cloned() {
            return Err(error);
        }
        state.removed_markers.push(identity);
        Ok(())
    }
}

// ============================================================================
// State store
// ============================================================================

/// Non-SQLite state store for tests that pause the tokio clock
#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<BookId, SyncRecord>>,
}

#[async_trait]
impl SyncStateStore for MemoryStateStore {
    async fn get(&self, identity: BookId) -> core_sync::Result<Option<SyncRecord>> {
        Ok(self.records.lock().unwrap().get(&identity).cloned())
    }

    async fn record_success(
        &self,
        identity: BookId,
        digest: &str,
        at: DateTime<Utc>,
    ) -> core_sync::Result<()> {
        self.records.lock().unwrap().insert(
            identity,
            SyncRecord {
                identity,
                last_digest: Some(digest.to_string()),
                last_synced_at: Some(at),
                status: RecordStatus::Synced,
                last_error: None,
                last_attempt_at: at,
            },
        );
        Ok(())
    }

    async fn record_failure(
        &self,
        identity: BookId,
        at: DateTime<Utc>,
        reason: &str,
    ) -> core_sync::Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records.entry(identity).or_insert(SyncRecord {
            identity,
            last_digest: None,
            last_synced_at: None,
            status: RecordStatus::Never,
            last_error: None,
            last_attempt_at: at,
        });
        record.status = RecordStatus::Failed;
        record.last_error = Some(reason.to_string());
        record.last_attempt_at = at;
        Ok(())
    }

    async fn should_skip(
        &self,
        identity: BookId,
        current_digest: &str,
        force_resync: bool,
    ) -> core_sync::Result<bool> {
        if force_resync {
            return Ok(false);
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&identity)
            .map(|r| r.status == RecordStatus::Synced && r.last_digest.as_deref() == Some(current_digest))
            .unwrap_or(false))
    }

    async fn list_records(
        &self,
        status: Option<RecordStatus>,
    ) -> core_sync::Result<Vec<SyncRecord>> {
        let mut records: Vec<SyncRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.identity);
        Ok(records)
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Retry policy with millisecond delays
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..SyncConfig::default()
    }
}

pub fn orchestrator(
    catalog: Arc<FakeCatalog>,
    uploader: Arc<FakeUploader>,
    state: Arc<dyn SyncStateStore>,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        catalog,
        Some(uploader),
        state,
        Arc::new(bridge_traits::time::SystemClock),
    )
    .with_config(fast_config())
}

/// Poll `condition` every 10ms for up to five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
