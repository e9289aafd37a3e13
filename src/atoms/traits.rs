// ── Edge Atoms: Collaborator Traits ────────────────────────────────────────
// The seams between the engine and everything it does not own: the remote
// edge API, host-supplied local models, and the platform's connectivity
// signals. Implementations live in engine/ (HttpBackend, ManualConnectivity)
// or in the host application.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::atoms::error::EdgeResult;
use crate::atoms::types::{
    AnalyticsBatch, CacheEntry, CacheKey, DeviceRegistration, DeviceStatus, EdgeModel,
    FinalTransmission, LocalPrediction, NetworkInfo, PlatformSignal, RemoteContent,
    RemoteInferenceRequest, RemoteInferenceResponse, SyncOperation,
};

/// Remote collaborators of the edge engine. Every method is a suspension
/// point; callers wrap them in the configured timeout. Any `Err` is treated
/// as a transient failure by the component that made the call.
#[async_trait]
pub trait EdgeBackend: Send + Sync {
    /// Submit capabilities, receive the models this device may run.
    async fn register_device(&self, registration: &DeviceRegistration) -> EdgeResult<Vec<EdgeModel>>;

    /// Apply one queued mutation remotely. `Ok` means acknowledged.
    async fn submit_operation(&self, device_id: &str, op: &SyncOperation) -> EdgeResult<()>;

    async fn infer(&self, request: &RemoteInferenceRequest) -> EdgeResult<RemoteInferenceResponse>;

    /// Mirror a local cache write.
    async fn put_content(&self, entry: &CacheEntry) -> EdgeResult<()>;

    /// `Ok(None)` when the server has no copy.
    async fn get_content(&self, key: &CacheKey, device_id: &str) -> EdgeResult<Option<RemoteContent>>;

    async fn send_analytics(&self, batch: &AnalyticsBatch) -> EdgeResult<()>;

    async fn update_status(&self, device_id: &str, status: &DeviceStatus) -> EdgeResult<()>;

    /// Non-blocking, fire-and-forget hand-off used at shutdown. Must return
    /// immediately; no completion or retry is implied.
    fn dispatch_final(&self, payload: FinalTransmission);
}

/// A model the host can run on-device. Formats and runtimes are the host's
/// business; the router only sees task type in, prediction out.
#[async_trait]
pub trait LocalModel: Send + Sync {
    fn id(&self) -> &str;

    /// Task type served, matched against `infer(task_type, …)`.
    fn task_type(&self) -> &str;

    /// `Ok(None)` means "no answer", which moves the router to the next tier.
    async fn predict(&self, input: &Value) -> EdgeResult<Option<LocalPrediction>>;
}

/// Platform connectivity. The engine subscribes once at `start()` and
/// polls `is_online` for visibility-regain checks.
pub trait ConnectivitySource: Send + Sync {
    fn is_online(&self) -> bool;

    fn network_info(&self) -> NetworkInfo;

    /// Stream of platform signals. Called at most once per engine.
    fn subscribe(&self) -> UnboundedReceiver<PlatformSignal>;
}
