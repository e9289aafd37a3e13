// Edge Engine — Configuration
//
// Sources, later wins:
//   1. built-in defaults (atoms/constants.rs)
//   2. TOML file            EdgeConfig::load(path)
//   3. environment          EdgeConfig::apply_env_overrides()
//
// Every field has a default so a partial TOML file is always valid.

use crate::atoms::constants::*;
use crate::atoms::error::{EdgeError, EdgeResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// Base URL of the edge API (registry, sync, inference, cache, analytics).
    pub api_base_url: String,
    /// Where the SQLite store lives. `None` → platform data dir.
    pub data_dir: Option<PathBuf>,
    pub sync: SyncConfig,
    pub analytics: AnalyticsConfig,
    pub cache: CacheConfig,
    pub inference: InferenceConfig,
    pub timers: TimerConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub default_priority: u32,
    /// Demotion stops here; the operation stays queued.
    pub priority_ceiling: u32,
    /// Move an operation to the dead-letter list after this many failed
    /// attempts. `None` keeps it in the live queue forever.
    pub dead_letter_after: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Buffered events that trigger an immediate flush while online.
    pub flush_threshold: usize,
    pub batch_size: usize,
    pub max_buffered: usize,
    /// Events and operations (each) included in the shutdown hand-off.
    pub final_transmission_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_capacity: usize,
    pub default_priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub local_timeout_ms: u64,
    /// Skip local models whose declared footprint exceeds probed memory.
    pub respect_memory_budget: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub sync_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub final_transmission_timeout_ms: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        EdgeConfig {
            api_base_url: "http://localhost:5000".into(),
            data_dir: None,
            sync: SyncConfig::default(),
            analytics: AnalyticsConfig::default(),
            cache: CacheConfig::default(),
            inference: InferenceConfig::default(),
            timers: TimerConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            default_priority: DEFAULT_SYNC_PRIORITY,
            priority_ceiling: DEFAULT_PRIORITY_CEILING,
            dead_letter_after: None,
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            batch_size: DEFAULT_ANALYTICS_BATCH_SIZE,
            max_buffered: DEFAULT_MAX_BUFFERED_EVENTS,
            final_transmission_size: DEFAULT_FINAL_TRANSMISSION_SIZE,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            memory_capacity: DEFAULT_MEMORY_CACHE_CAPACITY,
            default_priority: DEFAULT_CACHE_PRIORITY,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            local_timeout_ms: DEFAULT_LOCAL_INFERENCE_TIMEOUT_MS,
            respect_memory_budget: true,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            final_transmission_timeout_ms: DEFAULT_FINAL_TRANSMISSION_TIMEOUT_MS,
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_cooldown_secs: DEFAULT_BREAKER_COOLDOWN_SECS,
        }
    }
}

impl EdgeConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> EdgeResult<Self> {
        let config: EdgeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    /// A missing file is not an error: defaults + env are used.
    pub fn load(path: &Path) -> EdgeResult<Self> {
        let mut config = if path.exists() {
            info!("[config] Loading edge config from {:?}", path);
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            info!("[config] No config at {:?} — using defaults", path);
            EdgeConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Overlay `EDGE_*` environment variables. Unparseable values are
    /// logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get("EDGE_API_URL") {
            self.api_base_url = url;
        }
        if let Some(dir) = get("EDGE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        override_num(&get, "EDGE_SYNC_BATCH_SIZE", &mut self.sync.batch_size);
        override_num(&get, "EDGE_ANALYTICS_BATCH_SIZE", &mut self.analytics.batch_size);
        override_num(&get, "EDGE_FLUSH_THRESHOLD", &mut self.analytics.flush_threshold);
        override_num(&get, "EDGE_SYNC_INTERVAL_SECS", &mut self.timers.sync_interval_secs);
        override_num(&get, "EDGE_HEARTBEAT_INTERVAL_SECS", &mut self.timers.heartbeat_interval_secs);
        override_num(&get, "EDGE_REQUEST_TIMEOUT_MS", &mut self.network.request_timeout_ms);
    }

    pub fn validate(&self) -> EdgeResult<()> {
        let zero = |name: &str| Err(EdgeError::Config(format!("{name} must be greater than zero")));
        if self.sync.batch_size == 0 {
            return zero("sync.batch_size");
        }
        if self.analytics.batch_size == 0 {
            return zero("analytics.batch_size");
        }
        if self.analytics.max_buffered == 0 {
            return zero("analytics.max_buffered");
        }
        if self.timers.sync_interval_secs == 0 {
            return zero("timers.sync_interval_secs");
        }
        if self.timers.heartbeat_interval_secs == 0 {
            return zero("timers.heartbeat_interval_secs");
        }
        if self.network.request_timeout_ms == 0 {
            return zero("network.request_timeout_ms");
        }
        if self.inference.local_timeout_ms == 0 {
            return zero("inference.local_timeout_ms");
        }
        if self.sync.priority_ceiling < self.sync.default_priority {
            return Err(EdgeError::Config(
                "sync.priority_ceiling must not be below sync.default_priority".into(),
            ));
        }
        Ok(())
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(crate::engine::store::default_data_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    pub fn local_inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference.local_timeout_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.timers.sync_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.timers.heartbeat_interval_secs)
    }
}

fn override_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = get(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!("[config] Ignoring {}={:?}: not a number", key, raw),
        }
    }
}
