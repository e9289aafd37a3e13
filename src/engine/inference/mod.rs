// Edge Engine — Inference Router
//
// infer(task_type, input, allow_remote) walks three tiers and returns the
// first usable answer:
//
//   1. local model registered for the task (bounded, panic-isolated)
//   2. remote inference, if allowed, ONLINE, and the catalog does not pin
//      the task to heuristic fallback
//   3. rule-based heuristic: unconditional
//
// Every failure moves to the next tier. The result always carries a
// confidence in [0,1] and the measured wall time of the whole call.
//
// Capability-aware routing: when the probe reported device memory, a local
// model whose catalog footprint exceeds it is skipped.

pub mod catalog;
pub mod heuristics;

pub use catalog::ModelCatalog;

use crate::atoms::traits::{EdgeBackend, LocalModel};
use crate::atoms::types::{
    DeviceCapabilities, FallbackStrategy, InferenceResult, InferenceSource, LocalPrediction,
    RemoteInferenceRequest,
};
use crate::engine::config::InferenceConfig;
use crate::engine::connectivity::ConnectivityMonitor;
use crate::engine::http::bounded;
use futures::FutureExt;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BYTES_PER_MB: u64 = 1024 * 1024;

pub struct InferenceRouter {
    local: RwLock<HashMap<String, Arc<dyn LocalModel>>>,
    catalog: Arc<ModelCatalog>,
    capabilities: RwLock<Option<DeviceCapabilities>>,
    backend: Arc<dyn EdgeBackend>,
    connectivity: Arc<ConnectivityMonitor>,
    device_id: String,
    config: InferenceConfig,
    local_timeout: Duration,
    request_timeout: Duration,
}

impl InferenceRouter {
    pub fn new(
        catalog: Arc<ModelCatalog>,
        backend: Arc<dyn EdgeBackend>,
        connectivity: Arc<ConnectivityMonitor>,
        device_id: String,
        config: InferenceConfig,
        local_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        InferenceRouter {
            local: RwLock::new(HashMap::new()),
            catalog,
            capabilities: RwLock::new(None),
            backend,
            connectivity,
            device_id,
            config,
            local_timeout,
            request_timeout,
        }
    }

    /// Register (or replace) the local model for its task type.
    pub fn register_local(&self, model: Arc<dyn LocalModel>) {
        info!("[inference] Local model {} serves '{}'", model.id(), model.task_type());
        self.local.write().insert(model.task_type().to_string(), model);
    }

    pub fn unregister_local(&self, task_type: &str) -> bool {
        self.local.write().remove(task_type).is_some()
    }

    pub fn set_capabilities(&self, capabilities: DeviceCapabilities) {
        *self.capabilities.write() = Some(capabilities);
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Never fails. See module header for tier order.
    pub async fn infer(&self, task_type: &str, input: &Value, allow_remote: bool) -> InferenceResult {
        let started = Instant::now();

        // ── Tier 1: local model ──
        let local = self.local.read().get(task_type).cloned();
        if let Some(model) = local {
            if let Some(pred) = self.run_local(model.as_ref(), input).await {
                return finish(task_type, pred.output, pred.confidence, InferenceSource::Local,
                              Some(model.id().to_string()), started);
            }
        }

        // ── Tier 2: remote ──
        let pinned_to_heuristic =
            self.catalog.fallback_for(task_type) == FallbackStrategy::Heuristic;
        if allow_remote && !pinned_to_heuristic && self.connectivity.is_online() {
            let request = RemoteInferenceRequest {
                model_type: task_type.to_string(),
                input_data: input.clone(),
                device_id: self.device_id.clone(),
            };
            match bounded("remote inference", self.request_timeout, self.backend.infer(&request)).await {
                Ok(resp) if !resp.result.is_null() => {
                    return finish(task_type, resp.result, resp.confidence, InferenceSource::Remote,
                                  None, started);
                }
                Ok(_) => debug!("[inference] Remote returned no result for '{}'", task_type),
                Err(e) => debug!("[inference] Remote '{}' failed: {}", task_type, e),
            }
        }

        // ── Tier 3: heuristic ──
        let (output, confidence) = heuristics::heuristic(task_type, input);
        finish(task_type, output, confidence, InferenceSource::Heuristic, None, started)
    }

    /// Invoke a local model. `None` on skip, timeout, error, panic, or a
    /// null answer.
    async fn run_local(&self, model: &dyn LocalModel, input: &Value) -> Option<LocalPrediction> {
        if !self.fits_memory_budget(model.id()) {
            debug!("[inference] Skipping {}: footprint exceeds device memory", model.id());
            return None;
        }

        let guarded = AssertUnwindSafe(model.predict(input)).catch_unwind();
        match tokio::time::timeout(self.local_timeout, guarded).await {
            Ok(Ok(Ok(Some(pred)))) if !pred.output.is_null() => Some(pred),
            Ok(Ok(Ok(_))) => {
                debug!("[inference] {} had no answer", model.id());
                None
            }
            Ok(Ok(Err(e))) => {
                warn!("[inference] {} failed: {}", model.id(), e);
                None
            }
            Ok(Err(_)) => {
                warn!("[inference] {} panicked; falling through", model.id());
                None
            }
            Err(_) => {
                warn!("[inference] {} timed out after {}ms", model.id(), self.local_timeout.as_millis());
                None
            }
        }
    }

    fn fits_memory_budget(&self, model_id: &str) -> bool {
        if !self.config.respect_memory_budget {
            return true;
        }
        let memory = self
            .capabilities
            .read()
            .as_ref()
            .map(|c| c.compute.memory_bytes)
            .unwrap_or(0);
        let Some(descriptor) = self.catalog.get(model_id) else {
            return true;
        };
        // Unknown memory (0) never blocks a model.
        memory == 0 || descriptor.performance.memory_mb.saturating_mul(BYTES_PER_MB) <= memory
    }
}

fn finish(
    task_type: &str,
    output: Value,
    confidence: f64,
    source: InferenceSource,
    model_id: Option<String>,
    started: Instant,
) -> InferenceResult {
    let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
    let result = InferenceResult {
        task_type: task_type.to_string(),
        output,
        confidence,
        inference_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        source,
        model_id,
    };
    debug!(
        "[inference] '{}' answered by {:?} (confidence {:.2}, {:.1}ms)",
        task_type, result.source, result.confidence, result.inference_time_ms
    );
    result
}
