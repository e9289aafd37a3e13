// ── Edge Atoms: Constants ──────────────────────────────────────────────────
// All named constants for the crate live here. Most of them are only the
// DEFAULTS for `EdgeConfig`; the engine reads the configured values.

// ── Sync queue ─────────────────────────────────────────────────────────────
// Lower priority value = drained sooner. Failed operations are demoted by
// one step per failure, saturating at the ceiling.
pub const DEFAULT_SYNC_PRIORITY: u32 = 5;
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 10;
pub const DEFAULT_PRIORITY_CEILING: u32 = 100;

// ── Analytics buffer ───────────────────────────────────────────────────────
pub const DEFAULT_FLUSH_THRESHOLD: usize = 5;
pub const DEFAULT_ANALYTICS_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_BUFFERED_EVENTS: usize = 1000;
// Head of queue + buffer sent on shutdown. Kept small: delivery is not awaited.
pub const DEFAULT_FINAL_TRANSMISSION_SIZE: usize = 20;

// ── Content cache ──────────────────────────────────────────────────────────
pub const DEFAULT_CACHE_PRIORITY: u32 = 5;
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 512;

// ── Timers ─────────────────────────────────────────────────────────────────
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

// ── Timeouts ───────────────────────────────────────────────────────────────
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_LOCAL_INFERENCE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_FINAL_TRANSMISSION_TIMEOUT_MS: u64 = 1_500;

// ── Circuit breaker ────────────────────────────────────────────────────────
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 5;
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 60;

// ── Heuristic inference ────────────────────────────────────────────────────
// Confidence reported by the rule-based tier. A keyword hit is trusted more
// than the no-signal default, but both stay below typical model scores.
pub(crate) const HEURISTIC_MATCH_CONFIDENCE: f64 = 0.8;
pub(crate) const HEURISTIC_WEAK_CONFIDENCE: f64 = 0.5;
pub(crate) const HEURISTIC_DEFAULT_CONFIDENCE: f64 = 0.3;
pub(crate) const HEURISTIC_UNKNOWN_TASK_CONFIDENCE: f64 = 0.1;

// ── Persisted identity ─────────────────────────────────────────────────────
// Key in `edge_config`. Changing it would mint a new device identity on
// every existing install. Treat as a stable identifier.
pub(crate) const DEVICE_ID_KEY: &str = "device_id";

// ── Data directory ─────────────────────────────────────────────────────────
pub(crate) const DATA_DIR_NAME: &str = "openpawz-edge";
pub(crate) const DB_FILE_NAME: &str = "edge.db";
