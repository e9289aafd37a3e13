// ── Edge Engine: Analytics Buffer ───────────────────────────────────────────
//
// A bounded, persisted FIFO of analytics events waiting for the remote
// ingestion collaborator.
//
//   record(type, data)   append → persist → flush if threshold reached & ONLINE
//   flush()              sends a copy of the front batch; the events leave
//                        the buffer only once the send is confirmed
//
// Key properties:
//   - Insertion order is the only order. A failed flush leaves the buffer
//     exactly as it was, plus anything recorded while the request was out.
//   - Bounded by `max_buffered`: overflow drops the OLDEST event and counts it.
//   - Persisted on every change; a failed persist keeps the buffer in memory
//     and marks it dirty for the next attempt.
//   - One flush at a time (`flush_lock`); records never wait on a flush.

use crate::atoms::traits::EdgeBackend;
use crate::atoms::types::{AnalyticsBatch, AnalyticsEvent};
use crate::engine::config::AnalyticsConfig;
use crate::engine::connectivity::ConnectivityMonitor;
use crate::engine::http::bounded;
use crate::engine::store::EdgeStore;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct BufferState {
    events: VecDeque<AnalyticsEvent>,
    dirty: bool,
}

pub struct AnalyticsBuffer {
    store: Arc<EdgeStore>,
    backend: Arc<dyn EdgeBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    device_id: String,
    session_id: String,
    config: AnalyticsConfig,
    request_timeout: Duration,
    state: Mutex<BufferState>,
    flush_lock: tokio::sync::Mutex<()>,
    flush_passes: AtomicU64,
    dropped: AtomicU64,
}

impl AnalyticsBuffer {
    /// Build the buffer and reload events a previous run left behind.
    pub fn new(
        store: Arc<EdgeStore>,
        backend: Arc<dyn EdgeBackend>,
        connectivity: Arc<ConnectivityMonitor>,
        device_id: String,
        session_id: String,
        config: AnalyticsConfig,
        request_timeout: Duration,
    ) -> Self {
        let events: VecDeque<AnalyticsEvent> = store
            .load_analytics()
            .unwrap_or_else(|e| {
                warn!("[analytics] Could not reload persisted buffer, starting empty: {}", e);
                Vec::new()
            })
            .into();
        if !events.is_empty() {
            info!("[analytics] Restored {} buffered event(s)", events.len());
        }

        AnalyticsBuffer {
            store,
            backend,
            connectivity,
            device_id,
            session_id,
            config,
            request_timeout,
            state: Mutex::new(BufferState { events, dirty: false }),
            flush_lock: tokio::sync::Mutex::new(()),
            flush_passes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event. Returns its id.
    pub async fn record(&self, event_type: &str, data: Value) -> String {
        let online = self.connectivity.is_online();
        let event = AnalyticsEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_string(),
            data,
            timestamp: chrono::Utc::now(),
            device_id: self.device_id.clone(),
            offline: !online,
        };
        let id = event.id.clone();

        let buffered = {
            let mut state = self.state.lock();
            state.events.push_back(event);
            while state.events.len() > self.config.max_buffered {
                if let Some(old) = state.events.pop_front() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("[analytics] Buffer full, dropped oldest event {} ({})", old.id, old.event_type);
                }
            }
            self.persist(&mut state);
            state.events.len()
        };
        debug!("[analytics] Recorded {} '{}' ({} buffered)", id, event_type, buffered);

        if online && buffered >= self.config.flush_threshold {
            self.flush().await;
        }
        id
    }

    /// Send one batch from the front. Returns the number of events the
    /// remote side accepted (0 when offline, empty, or on failure).
    pub async fn flush(&self) -> usize {
        if !self.connectivity.is_online() {
            return 0;
        }
        let _guard = self.flush_lock.lock().await;

        let batch: Vec<AnalyticsEvent> = {
            let state = self.state.lock();
            state.events.iter().take(self.config.batch_size).cloned().collect()
        };
        if batch.is_empty() {
            return 0;
        }
        self.flush_passes.fetch_add(1, Ordering::Relaxed);

        let sent = batch.len();
        let payload = AnalyticsBatch {
            device_id: self.device_id.clone(),
            session_id: self.session_id.clone(),
            events: batch,
        };
        let result = bounded(
            "analytics flush",
            self.request_timeout,
            self.backend.send_analytics(&payload),
        )
        .await;

        match result {
            Ok(()) => {
                let sent_ids: HashSet<&str> = payload.events.iter().map(|e| e.id.as_str()).collect();
                let mut state = self.state.lock();
                // Overflow may already have dropped some of them.
                state.events.retain(|e| !sent_ids.contains(e.id.as_str()));
                self.persist(&mut state);
                info!("[analytics] Flushed {} event(s), {} still buffered", sent, state.events.len());
                sent
            }
            Err(e) if e.is_transient() => {
                warn!("[analytics] Flush of {} event(s) failed, keeping them buffered: {}", sent, e);
                0
            }
            Err(e) => {
                error!("[analytics] Flush of {} event(s) rejected, keeping them buffered: {}", sent, e);
                0
            }
        }
    }

    fn persist(&self, state: &mut BufferState) {
        match self.store.save_analytics(state.events.iter()) {
            Ok(()) => state.dirty = false,
            Err(e) => {
                warn!("[analytics] Persisting buffer failed, continuing in memory: {}", e);
                state.dirty = true;
            }
        }
    }

    /// Retry a failed persist, if any. Called from the periodic tick.
    pub fn persist_if_dirty(&self) {
        let mut state = self.state.lock();
        if state.dirty {
            self.persist(&mut state);
        }
    }

    /// First `n` buffered events, oldest first.
    pub fn head(&self, n: usize) -> Vec<AnalyticsEvent> {
        self.state.lock().events.iter().take(n).cloned().collect()
    }

    pub fn snapshot(&self) -> Vec<AnalyticsEvent> {
        self.state.lock().events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn flush_passes(&self) -> u64 {
        self.flush_passes.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::HttpBackend;
    use crate::engine::config::EdgeConfig;
    use serde_json::json;

    #[tokio::test]
    async fn failed_persist_falls_back_to_memory_then_rewrites() {
        let config = EdgeConfig::default();
        let store = Arc::new(EdgeStore::open_in_memory().unwrap());
        let buffer = AnalyticsBuffer::new(
            store.clone(),
            Arc::new(HttpBackend::new(&config).unwrap()),
            Arc::new(ConnectivityMonitor::new(false)),
            "device-1".into(),
            "session-1".into(),
            config.analytics.clone(),
            config.request_timeout(),
        );
        buffer.record("open", json!({})).await;

        store.break_table("analytics_buffer");
        buffer.record("tap", json!({ "n": 1 })).await;
        buffer.record("tap", json!({ "n": 2 })).await;
        assert_eq!(buffer.len(), 3);
        assert!(buffer.state.lock().dirty);

        store.repair();
        buffer.persist_if_dirty();
        assert!(!buffer.state.lock().dirty);
        let stored: Vec<_> = store.load_analytics().unwrap().into_iter().map(|e| e.event_type).collect();
        assert_eq!(stored, vec!["open", "tap", "tap"]);
    }
}
