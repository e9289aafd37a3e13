// Shared fixtures: an in-process EdgeBackend that records everything it
// receives and fails on demand.

use async_trait::async_trait;
use openpawz_edge::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct RecordingBackend {
    pub fail_sync: AtomicBool,
    pub fail_analytics: AtomicBool,
    pub fail_infer: AtomicBool,
    pub fail_register: AtomicBool,
    /// Sync fails only for operations with these entity ids.
    pub fail_entities: Mutex<Vec<String>>,
    /// Artificial latency per call, in milliseconds.
    pub submit_delay_ms: AtomicU64,
    pub analytics_delay_ms: AtomicU64,
    pub models: Mutex<Vec<EdgeModel>>,
    pub remote_content: Mutex<HashMap<CacheKey, Value>>,

    pub synced: Mutex<Vec<SyncOperation>>,
    pub sync_attempts: AtomicUsize,
    pub batches: Mutex<Vec<AnalyticsBatch>>,
    pub mirrored: Mutex<Vec<CacheEntry>>,
    pub statuses: Mutex<Vec<DeviceStatus>>,
    pub finals: Mutex<Vec<FinalTransmission>>,
    pub infer_calls: AtomicUsize,
    pub registrations: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn synced_count(&self) -> usize {
        self.synced.lock().len()
    }

    pub fn synced_entity_ids(&self) -> Vec<String> {
        self.synced
            .lock()
            .iter()
            .map(|op| op.entity_id.clone().unwrap_or_default())
            .collect()
    }
}

fn refused(endpoint: &str) -> EdgeError {
    EdgeError::remote(endpoint, 503)
}

async fn lag(delay_ms: &AtomicU64) {
    let ms = delay_ms.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl EdgeBackend for RecordingBackend {
    async fn register_device(&self, _registration: &DeviceRegistration) -> EdgeResult<Vec<EdgeModel>> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(refused("/api/edge/devices/register"));
        }
        Ok(self.models.lock().clone())
    }

    async fn submit_operation(&self, _device_id: &str, op: &SyncOperation) -> EdgeResult<()> {
        self.sync_attempts.fetch_add(1, Ordering::SeqCst);
        lag(&self.submit_delay_ms).await;
        let entity_fails = op
            .entity_id
            .as_ref()
            .is_some_and(|id| self.fail_entities.lock().contains(id));
        if self.fail_sync.load(Ordering::SeqCst) || entity_fails {
            return Err(refused("/api/edge/sync"));
        }
        self.synced.lock().push(op.clone());
        Ok(())
    }

    async fn infer(&self, request: &RemoteInferenceRequest) -> EdgeResult<RemoteInferenceResponse> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_infer.load(Ordering::SeqCst) {
            return Err(refused("/api/edge/inference"));
        }
        Ok(RemoteInferenceResponse {
            result: json!({ "remote": request.model_type }),
            confidence: 0.95,
            inference_time: 12.0,
        })
    }

    async fn put_content(&self, entry: &CacheEntry) -> EdgeResult<()> {
        self.mirrored.lock().push(entry.clone());
        Ok(())
    }

    async fn get_content(&self, key: &CacheKey, _device_id: &str) -> EdgeResult<Option<RemoteContent>> {
        Ok(self
            .remote_content
            .lock()
            .get(key)
            .cloned()
            .map(|content| RemoteContent { content, stale: false }))
    }

    async fn send_analytics(&self, batch: &AnalyticsBatch) -> EdgeResult<()> {
        lag(&self.analytics_delay_ms).await;
        if self.fail_analytics.load(Ordering::SeqCst) {
            return Err(refused("/api/edge/analytics"));
        }
        self.batches.lock().push(batch.clone());
        Ok(())
    }

    async fn update_status(&self, _device_id: &str, status: &DeviceStatus) -> EdgeResult<()> {
        self.statuses.lock().push(status.clone());
        Ok(())
    }

    fn dispatch_final(&self, payload: FinalTransmission) {
        self.finals.lock().push(payload);
    }
}

pub struct Harness {
    pub backend: Arc<RecordingBackend>,
    pub source: Arc<ManualConnectivity>,
    pub store: Arc<EdgeStore>,
    pub engine: Arc<EdgeEngine>,
}

/// Defaults, with the capability probe pointed away from the user's data dir.
pub fn test_config() -> EdgeConfig {
    EdgeConfig {
        data_dir: Some(std::env::temp_dir().join("openpawz-edge-tests")),
        ..EdgeConfig::default()
    }
}

pub fn harness(online: bool) -> Harness {
    harness_with(online, test_config(), Arc::new(EdgeStore::open_in_memory().unwrap()))
}

pub fn harness_with(online: bool, config: EdgeConfig, store: Arc<EdgeStore>) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let backend = RecordingBackend::new();
    let source = Arc::new(ManualConnectivity::new(online));
    let engine = EdgeEngine::new(
        config,
        store.clone(),
        backend.clone() as Arc<dyn EdgeBackend>,
        source.clone() as Arc<dyn ConnectivitySource>,
    )
    .unwrap();
    Harness { backend, source, store, engine }
}

pub fn draft(entity_id: &str, priority: u32) -> SyncOperationDraft {
    SyncOperationDraft::new(OperationKind::Update, "note", &json!({ "id": entity_id }))
        .unwrap()
        .entity_id(entity_id)
        .priority(priority)
}
