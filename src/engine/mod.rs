// ── Edge Engine ─────────────────────────────────────────────────────────────
//
// Composition root. The host builds one `EdgeEngine` per process and owns it;
// there is no global instance.
//
//   EdgeEngine::new(config, store, backend, connectivity)
//     .initialize()   probe capabilities, register device, load model catalog
//     .start()        spawn: signal listener, periodic sync tick, heartbeat
//     .shutdown()     best-effort final transmission, stop background loops
//
// Connectivity transitions (OFFLINE → ONLINE, or a visibility regain while
// ONLINE) run exactly one queue drain and one analytics flush. The periodic
// tick repeats both while ONLINE so recovery never depends on signal delivery.

pub mod analytics;
pub mod backend;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod connectivity;
pub mod http;
pub mod inference;
pub mod store;
pub mod sync_queue;

use crate::atoms::error::EdgeResult;
use crate::atoms::traits::{ConnectivitySource, EdgeBackend};
use crate::atoms::types::{
    DeviceCapabilities, DeviceRegistration, DeviceStatus, EngineStatus, FinalTransmission,
    PlatformSignal,
};
use analytics::AnalyticsBuffer;
use backend::HttpBackend;
use cache::TieredCache;
use config::EdgeConfig;
use connectivity::{ConnectivityMonitor, Transition};
use http::bounded;
use inference::{InferenceRouter, ModelCatalog};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use store::EdgeStore;
use sync_queue::SyncQueue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub struct EdgeEngine {
    config: EdgeConfig,
    store: Arc<EdgeStore>,
    backend: Arc<dyn EdgeBackend>,
    source: Arc<dyn ConnectivitySource>,
    monitor: Arc<ConnectivityMonitor>,
    device_id: String,
    session_id: String,
    catalog: Arc<ModelCatalog>,
    capabilities: RwLock<Option<DeviceCapabilities>>,
    queue: SyncQueue,
    cache: TieredCache,
    inference: InferenceRouter,
    analytics: AnalyticsBuffer,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl EdgeEngine {
    pub fn new(
        config: EdgeConfig,
        store: Arc<EdgeStore>,
        backend: Arc<dyn EdgeBackend>,
        source: Arc<dyn ConnectivitySource>,
    ) -> EdgeResult<Arc<Self>> {
        config.validate()?;
        let device_id = store.device_id()?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let monitor = Arc::new(ConnectivityMonitor::new(source.is_online()));
        let timeout = config.request_timeout();

        let catalog = Arc::new(ModelCatalog::new(store.load_models().unwrap_or_else(|e| {
            warn!("[edge] Could not load cached model catalog: {}", e);
            Vec::new()
        })));

        let queue = SyncQueue::new(
            store.clone(),
            backend.clone(),
            monitor.clone(),
            device_id.clone(),
            config.sync.clone(),
            timeout,
        );
        let cache = TieredCache::new(
            store.clone(),
            backend.clone(),
            monitor.clone(),
            device_id.clone(),
            config.cache.clone(),
            timeout,
        );
        let inference = InferenceRouter::new(
            catalog.clone(),
            backend.clone(),
            monitor.clone(),
            device_id.clone(),
            config.inference.clone(),
            config.local_inference_timeout(),
            timeout,
        );
        let analytics = AnalyticsBuffer::new(
            store.clone(),
            backend.clone(),
            monitor.clone(),
            device_id.clone(),
            session_id.clone(),
            config.analytics.clone(),
            timeout,
        );

        info!(
            "[edge] Engine for device {} (session {}), {}",
            device_id,
            session_id,
            if monitor.is_online() { "online" } else { "offline" }
        );

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Arc::new(EdgeEngine {
            config,
            store,
            backend,
            source,
            monitor,
            device_id,
            session_id,
            catalog,
            capabilities: RwLock::new(None),
            queue,
            cache,
            inference,
            analytics,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Convenience constructor: on-disk store in the configured data dir and
    /// the HTTP backend for `config.api_base_url`.
    pub fn open(config: EdgeConfig, source: Arc<dyn ConnectivitySource>) -> EdgeResult<Arc<Self>> {
        let store = Arc::new(EdgeStore::open(&config.data_dir())?);
        let backend: Arc<dyn EdgeBackend> = Arc::new(HttpBackend::new(&config)?);
        Self::new(config, store, backend, source)
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn inference(&self) -> &InferenceRouter {
        &self.inference
    }

    pub fn analytics(&self) -> &AnalyticsBuffer {
        &self.analytics
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn capabilities(&self) -> Option<DeviceCapabilities> {
        self.capabilities.read().clone()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Probe the device and register it. Registration failure (or being
    /// offline) keeps the catalog cached by an earlier run.
    pub async fn initialize(&self) -> DeviceCapabilities {
        let data_dir = self.config.data_dir();
        let caps = capabilities::probe(&data_dir, self.source.as_ref());
        *self.capabilities.write() = Some(caps.clone());
        self.inference.set_capabilities(caps.clone());

        if !self.monitor.is_online() {
            info!("[edge] Offline at startup; using {} cached model(s)", self.catalog.len());
            return caps;
        }

        let registration = DeviceRegistration {
            device_id: self.device_id.clone(),
            capabilities: caps.clone(),
            device_fingerprint: capabilities::device_fingerprint(&caps),
        };
        let registered = bounded(
            "device registration",
            self.config.request_timeout(),
            self.backend.register_device(&registration),
        )
        .await;

        match registered {
            Ok(models) => {
                info!("[edge] Registered; {} compatible model(s)", models.len());
                if let Err(e) = self.store.save_models(&models) {
                    warn!("[edge] Could not cache model catalog: {}", e);
                }
                self.catalog.replace(models);
            }
            Err(e) => warn!(
                "[edge] Registration failed, keeping {} cached model(s): {}",
                self.catalog.len(),
                e
            ),
        }
        caps
    }

    /// Spawn the background loops. Must be called inside a tokio runtime.
    /// A second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut tasks = self.tasks.lock();

        // ── Platform signals ──
        let engine = self.clone();
        let mut signals = self.source.subscribe();
        let mut stop = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    signal = signals.recv() => match signal {
                        Some(signal) => {
                            // State flips now; status push and catch-up run
                            // on their own task.
                            if let Some(transition) = engine.apply_signal(signal) {
                                let engine = engine.clone();
                                tokio::spawn(async move { engine.react(transition).await });
                            }
                        }
                        None => {
                            debug!("[edge] Connectivity source closed");
                            break;
                        }
                    },
                    _ = stop.changed() => break,
                }
            }
        }));

        // ── Periodic sync tick ──
        let engine = self.clone();
        let mut stop = self.shutdown_tx.subscribe();
        let period = self.config.sync_interval();
        tasks.push(tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => engine.sync_tick().await,
                    _ = stop.changed() => break,
                }
            }
        }));

        // ── Heartbeat ──
        let engine = self.clone();
        let mut stop = self.shutdown_tx.subscribe();
        let period = self.config.heartbeat_interval();
        tasks.push(tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => engine.push_status().await,
                    _ = stop.changed() => break,
                }
            }
        }));

        info!("[edge] Background loops started");
    }

    /// Apply one platform signal and wait for the status push and catch-up
    /// it triggers. Returns the transition it caused, if any.
    pub async fn handle_signal(&self, signal: PlatformSignal) -> Option<Transition> {
        let transition = self.apply_signal(signal)?;
        self.react(transition).await;
        Some(transition)
    }

    /// Update the connectivity state only.
    fn apply_signal(&self, signal: PlatformSignal) -> Option<Transition> {
        self.monitor.apply(signal, self.source.is_online())
    }

    async fn react(&self, transition: Transition) {
        match transition {
            Transition::CameOnline => {
                self.push_status().await;
                self.catch_up().await;
            }
            Transition::Resumed => self.catch_up().await,
            Transition::WentOffline => self.push_status().await,
        }
    }

    /// Host activity marker reported in heartbeats.
    pub fn touch(&self) {
        self.monitor.touch();
    }

    async fn catch_up(&self) {
        let report = self.queue.drain().await;
        let flushed = self.analytics.flush().await;
        debug!(
            "[edge] Catch-up: {} op(s) synced, {} event(s) flushed",
            report.succeeded, flushed
        );
    }

    async fn sync_tick(&self) {
        if self.monitor.is_online() {
            self.catch_up().await;
        }
        self.queue.persist_if_dirty();
        self.analytics.persist_if_dirty();
    }

    /// Best-effort status push; the next heartbeat corrects a missed one.
    async fn push_status(&self) {
        let status = DeviceStatus {
            is_online: self.monitor.is_online(),
            last_activity: self.monitor.last_activity(),
            network_info: self.source.network_info(),
        };
        let pushed = bounded(
            "status update",
            self.config.request_timeout(),
            self.backend.update_status(&self.device_id, &status),
        )
        .await;
        if let Err(e) = pushed {
            debug!("[edge] Status update failed: {}", e);
        }
    }

    /// Hand the head of the queue and buffer to the backend without waiting,
    /// then stop the background loops. Anything the server does not receive
    /// stays persisted locally for the next run. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let n = self.config.analytics.final_transmission_size;
        let payload = FinalTransmission {
            device_id: self.device_id.clone(),
            session_id: self.session_id.clone(),
            operations: self.queue.head(n),
            events: self.analytics.head(n),
        };
        if payload.is_empty() {
            debug!("[edge] Nothing pending at shutdown");
        } else {
            info!(
                "[edge] Final transmission: {} op(s), {} event(s)",
                payload.operations.len(),
                payload.events.len()
            );
            self.backend.dispatch_final(payload);
        }

        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        info!("[edge] Stopped");
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.monitor.state(),
            device_id: self.device_id.clone(),
            session_id: self.session_id.clone(),
            queued_operations: self.queue.len(),
            dead_letters: self.queue.dead_letter_count(),
            buffered_events: self.analytics.len(),
            dropped_events: self.analytics.dropped(),
            memory_cache_entries: self.cache.memory_len(),
            drain_passes: self.queue.drain_passes(),
            flush_passes: self.analytics.flush_passes(),
            last_transition: self.monitor.last_transition(),
            registered_models: self.catalog.len(),
        }
    }
}
