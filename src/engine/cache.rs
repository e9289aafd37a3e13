// Edge Engine — Tiered Content Cache
//
// Read path:  memory → persisted store → remote mirror (online only)
// Write path: memory (sync) → store (background) → remote mirror (online,
//             fire-and-forget; a failed mirror never rolls back locally)
//
// Expiry is lazy: an entry past `expires_at` is treated as absent on read
// (and dropped from memory then), but nothing sweeps storage proactively.
// The memory tier is bounded; overflow evicts the least important entry
// (largest priority number, then oldest).
//
// Persisted writes run in the background. Each put stamps its key with a
// new generation; a background write lands only if its generation is still
// the latest, and invalidate() clears the stamp under the same lock, so a
// slow write can never resurrect a newer put's value or an invalidated key.
//
// Every failure degrades to "absent". Callers never see an error.

use crate::atoms::traits::EdgeBackend;
use crate::atoms::types::{CacheEntry, CacheHit, CacheKey, CacheOptions, CacheTier};
use crate::engine::config::CacheConfig;
use crate::engine::connectivity::ConnectivityMonitor;
use crate::engine::http::bounded;
use crate::engine::store::EdgeStore;
use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct TieredCache {
    memory: Mutex<HashMap<CacheKey, CacheEntry>>,
    /// Latest unwritten put per key.
    pending_writes: Arc<Mutex<HashMap<CacheKey, u64>>>,
    next_generation: AtomicU64,
    store: Arc<EdgeStore>,
    backend: Arc<dyn EdgeBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    device_id: String,
    config: CacheConfig,
    request_timeout: Duration,
}

impl TieredCache {
    pub fn new(
        store: Arc<EdgeStore>,
        backend: Arc<dyn EdgeBackend>,
        connectivity: Arc<ConnectivityMonitor>,
        device_id: String,
        config: CacheConfig,
        request_timeout: Duration,
    ) -> Self {
        TieredCache {
            memory: Mutex::new(HashMap::new()),
            pending_writes: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            store,
            backend,
            connectivity,
            device_id,
            config,
            request_timeout,
        }
    }

    /// Payload for (type, id), or `None` when no tier can serve it.
    pub async fn get(&self, content_type: &str, content_id: &str) -> Option<Value> {
        self.get_entry(content_type, content_id).await.map(|hit| hit.payload)
    }

    /// Like `get`, but reports which tier answered.
    pub async fn get_entry(&self, content_type: &str, content_id: &str) -> Option<CacheHit> {
        let key = CacheKey::new(content_type, content_id);
        let now = Utc::now();

        // ── Tier 1: memory ──
        {
            let mut memory = self.memory.lock();
            if let Some(entry) = memory.get(&key) {
                if !entry.is_expired(now) {
                    return Some(CacheHit {
                        payload: entry.payload.clone(),
                        tier: CacheTier::Memory,
                        stale: false,
                    });
                }
                debug!("[cache] {}/{} expired in memory", content_type, content_id);
                memory.remove(&key);
            }
        }

        // ── Tier 2: persisted ──
        match self.store.cache_get(&key) {
            Ok(Some(entry)) if !entry.is_expired(now) => {
                let payload = entry.payload.clone();
                self.insert_memory(entry);
                return Some(CacheHit { payload, tier: CacheTier::Persisted, stale: false });
            }
            Ok(Some(_)) => debug!("[cache] {}/{} expired on disk", content_type, content_id),
            Ok(None) => {}
            Err(e) => warn!("[cache] Persisted tier read failed for {}/{}: {}", content_type, content_id, e),
        }

        // ── Tier 3: remote ──
        if !self.connectivity.is_online() {
            return None;
        }
        let fetched = bounded(
            "cache fetch",
            self.request_timeout,
            self.backend.get_content(&key, &self.device_id),
        )
        .await;

        match fetched {
            Ok(Some(remote)) => {
                if remote.stale {
                    debug!("[cache] Remote copy of {}/{} is flagged stale", content_type, content_id);
                }
                let entry = CacheEntry {
                    key,
                    payload: remote.content.clone(),
                    timestamp: Utc::now(),
                    expires_at: None,
                    priority: self.config.default_priority,
                };
                self.insert_memory(entry.clone());
                if let Err(e) = self.store.cache_put(&entry) {
                    warn!("[cache] Could not persist fetched {}/{}: {}", content_type, content_id, e);
                }
                Some(CacheHit { payload: remote.content, tier: CacheTier::Remote, stale: remote.stale })
            }
            Ok(None) => None,
            Err(e) => {
                debug!("[cache] Remote fetch for {}/{} failed: {}", content_type, content_id, e);
                None
            }
        }
    }

    /// Write-through put. Returns once the memory tier holds the entry.
    pub fn put(&self, content_type: &str, content_id: &str, payload: Value, options: CacheOptions) {
        let now = Utc::now();
        let entry = CacheEntry {
            key: CacheKey::new(content_type, content_id),
            payload,
            timestamp: now,
            expires_at: options
                .expires_in_ms
                .and_then(|ms| {
                    now.checked_add_signed(chrono::Duration::milliseconds(ms.min(i64::MAX as u64) as i64))
                }),
            priority: options.priority.unwrap_or(self.config.default_priority),
        };
        self.insert_memory(entry.clone());

        let runtime = tokio::runtime::Handle::try_current().ok();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.pending_writes.lock().insert(entry.key.clone(), generation);

        // Persist in the background when a runtime is available.
        match &runtime {
            Some(handle) => {
                let store = self.store.clone();
                let pending = self.pending_writes.clone();
                let persisted = entry.clone();
                handle.spawn_blocking(move || write_if_current(&store, &pending, &persisted, generation));
            }
            None => write_if_current(&self.store, &self.pending_writes, &entry, generation),
        }

        if !self.connectivity.is_online() {
            return;
        }
        let Some(handle) = runtime else {
            return;
        };
        let backend = self.backend.clone();
        let timeout = self.request_timeout;
        handle.spawn(async move {
            if let Err(e) = bounded("cache mirror", timeout, backend.put_content(&entry)).await {
                debug!(
                    "[cache] Mirror of {}/{} failed (local copy kept): {}",
                    entry.key.content_type, entry.key.content_id, e
                );
            }
        });
    }

    /// Drop an entry from both local tiers.
    pub fn invalidate(&self, content_type: &str, content_id: &str) {
        let key = CacheKey::new(content_type, content_id);
        self.memory.lock().remove(&key);
        let mut pending = self.pending_writes.lock();
        pending.remove(&key);
        if let Err(e) = self.store.cache_remove(&key) {
            warn!("[cache] Invalidate of {}/{} failed on disk: {}", content_type, content_id, e);
        }
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().len()
    }

    pub fn clear_memory(&self) {
        self.memory.lock().clear();
    }

    fn insert_memory(&self, entry: CacheEntry) {
        let mut memory = self.memory.lock();
        if !memory.contains_key(&entry.key) && memory.len() >= self.config.memory_capacity {
            if self.config.memory_capacity == 0 {
                return;
            }
            let now = Utc::now();
            // Expired entries first, then the least important, oldest first.
            let victim = memory
                .values()
                .max_by(|a, b| {
                    (a.is_expired(now), a.priority, std::cmp::Reverse(a.timestamp))
                        .cmp(&(b.is_expired(now), b.priority, std::cmp::Reverse(b.timestamp)))
                })
                .map(|e| e.key.clone());
            if let Some(victim) = victim {
                debug!("[cache] Evicting {}/{} from memory", victim.content_type, victim.content_id);
                memory.remove(&victim);
            }
        }
        memory.insert(entry.key.clone(), entry);
    }
}

/// Write `entry` unless a later put or an invalidate superseded it.
fn write_if_current(
    store: &EdgeStore,
    pending: &Mutex<HashMap<CacheKey, u64>>,
    entry: &CacheEntry,
    generation: u64,
) {
    let mut pending = pending.lock();
    if pending.get(&entry.key) != Some(&generation) {
        debug!(
            "[cache] Skipping superseded write of {}/{}",
            entry.key.content_type, entry.key.content_id
        );
        return;
    }
    pending.remove(&entry.key);
    if let Err(e) = store.cache_put(entry) {
        warn!(
            "[cache] Persist of {}/{} failed: {}",
            entry.key.content_type, entry.key.content_id, e
        );
    }
}
