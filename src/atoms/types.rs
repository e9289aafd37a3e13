// ── Edge Atoms: Pure Data Types ────────────────────────────────────────────
// All plain struct/enum definitions shared by the engine components and the
// remote collaborators. Wire names are camelCase to match the edge API.
// Atoms layer rule: no I/O, no side effects, no imports from engine/.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::atoms::error::EdgeResult;

// ═══════════════════════════════════════════════════════════════════════════
// Device capabilities
// ═══════════════════════════════════════════════════════════════════════════

/// Probed once at startup, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    pub storage: StorageCapabilities,
    pub compute: ComputeCapabilities,
    pub network: NetworkInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageCapabilities {
    pub quota_bytes: u64,
    pub available_bytes: u64,
    pub persistence_granted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeCapabilities {
    pub cores: usize,
    pub memory_bytes: u64,
    /// GPU usable for compute (render node, Metal, …).
    pub gpu_acceleration: bool,
    /// Dedicated tensor/NPU accelerator present.
    pub tensor_acceleration: bool,
    pub numeric_kernels: NumericKernels,
}

/// CPU vector extensions available to local model runtimes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericKernels {
    pub simd: bool,
    pub avx2: bool,
    pub fma: bool,
    pub neon: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionClass {
    Ethernet,
    Wifi,
    Cellular,
    None,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub connection_class: ConnectionClass,
    /// Estimated downlink in Mbit/s (0 when unknown).
    pub downlink_mbps: f64,
    pub metered: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Sync operations
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// How the remote side reconciles a conflicting value. Carried through
/// unmodified; resolution runs remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    #[default]
    LastWriteWins,
    Merge,
    ClientWins,
    ServerWins,
}

/// A mutation as built by application code, before the queue owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperationDraft {
    pub kind: OperationKind,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload: Value,
    /// `None` → the configured default priority.
    pub priority: Option<u32>,
    /// Id of an operation that must be acknowledged first.
    pub depends_on: Option<String>,
    pub conflict_strategy: ConflictStrategy,
}

impl SyncOperationDraft {
    /// Build a draft from any serializable payload.
    pub fn new<T: Serialize>(
        kind: OperationKind,
        entity_type: impl Into<String>,
        payload: &T,
    ) -> EdgeResult<Self> {
        Ok(SyncOperationDraft {
            kind,
            entity_type: entity_type.into(),
            entity_id: None,
            payload: serde_json::to_value(payload)?,
            priority: None,
            depends_on: None,
            conflict_strategy: ConflictStrategy::default(),
        })
    }

    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, op_id: impl Into<String>) -> Self {
        self.depends_on = Some(op_id.into());
        self
    }

    pub fn strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }
}

/// A queued mutation. Only the queue mutates it (priority demotion,
/// attempt bookkeeping); it leaves the queue on acknowledgment or cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    pub id: String,
    pub kind: OperationKind,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub payload: Value,
    pub priority: u32,
    /// Priority at enqueue time; restored when a dead letter is requeued.
    pub original_priority: u32,
    pub depends_on: Option<String>,
    pub conflict_strategy: ConflictStrategy,
    /// Monotonic insertion number: tie-breaker among equal priorities.
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl SyncOperation {
    /// Decode the payload into a concrete entity type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> EdgeResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deferred: usize,
    pub dead_lettered: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Edge models & inference
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPerformance {
    pub latency_ms: f64,
    pub accuracy: f64,
    pub memory_mb: u64,
}

/// What to do when the local model cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    #[default]
    Remote,
    Heuristic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDeployment {
    pub format: String,
    pub url: Option<String>,
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
}

/// Descriptor of a model the registry says this device can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeModel {
    pub id: String,
    /// Task type this model serves (e.g. "intent", "sentiment").
    pub capability: String,
    pub version: String,
    #[serde(default)]
    pub performance: ModelPerformance,
    #[serde(default)]
    pub deployment: ModelDeployment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceSource {
    Local,
    Remote,
    Heuristic,
}

/// Always well-formed: confidence in [0,1], non-negative time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResult {
    pub task_type: String,
    pub output: Value,
    pub confidence: f64,
    pub inference_time_ms: f64,
    pub source: InferenceSource,
    pub model_id: Option<String>,
}

/// What a local model hands back: output plus its own confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPrediction {
    pub output: Value,
    pub confidence: f64,
}

// ═══════════════════════════════════════════════════════════════════════════
// Content cache
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub content_type: String,
    pub content_id: String,
}

impl CacheKey {
    pub fn new(content_type: impl Into<String>, content_id: impl Into<String>) -> Self {
        CacheKey { content_type: content_type.into(), content_id: content_id.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub priority: u32,
}

impl CacheEntry {
    /// Expired entries are treated as absent, never returned as stale.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Options for `TieredCache::put`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    pub priority: Option<u32>,
    /// Lifetime in milliseconds from the write.
    pub expires_in_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Persisted,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub payload: Value,
    pub tier: CacheTier,
    /// Set when the remote mirror flagged its copy as stale.
    pub stale: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Analytics
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    /// Connectivity at the time the event was recorded.
    pub offline: bool,
}

// ═══════════════════════════════════════════════════════════════════════════
// Connectivity & lifecycle
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Signals the host platform delivers to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSignal {
    Online,
    Offline,
    VisibilityRegained,
}

/// Device status pushed on transitions and heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub is_online: bool,
    pub last_activity: DateTime<Utc>,
    pub network_info: NetworkInfo,
}

/// Point-in-time view of the engine for hosts and health checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: ConnectivityState,
    pub device_id: String,
    pub session_id: String,
    pub queued_operations: usize,
    pub dead_letters: usize,
    pub buffered_events: usize,
    pub dropped_events: u64,
    pub memory_cache_entries: usize,
    pub drain_passes: u64,
    pub flush_passes: u64,
    pub last_transition: Option<DateTime<Utc>>,
    pub registered_models: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Remote request bodies
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRegistration {
    pub device_id: String,
    pub capabilities: DeviceCapabilities,
    pub device_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInferenceRequest {
    pub model_type: String,
    pub input_data: Value,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInferenceResponse {
    pub result: Value,
    pub confidence: f64,
    #[serde(default)]
    pub inference_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContent {
    pub content: Value,
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsBatch {
    pub device_id: String,
    pub session_id: String,
    pub events: Vec<AnalyticsEvent>,
}

/// Best-effort payload handed off at shutdown. Delivery is not awaited and
/// not retried: anything not received by the server is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalTransmission {
    pub device_id: String,
    pub session_id: String,
    pub operations: Vec<SyncOperation>,
    pub events: Vec<AnalyticsEvent>,
}

impl FinalTransmission {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.events.is_empty()
    }
}
