use crate::support::{harness, harness_with};
use async_trait::async_trait;
use openpawz_edge::*;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

enum Behaviour {
    Answer(f64),
    Nothing,
    Panic,
    Hang,
}

struct StubModel {
    id: &'static str,
    task: &'static str,
    behaviour: Behaviour,
}

#[async_trait]
impl LocalModel for StubModel {
    fn id(&self) -> &str {
        self.id
    }

    fn task_type(&self) -> &str {
        self.task
    }

    async fn predict(&self, _input: &Value) -> EdgeResult<Option<LocalPrediction>> {
        match self.behaviour {
            Behaviour::Answer(confidence) => Ok(Some(LocalPrediction {
                output: json!({ "intent": "local" }),
                confidence,
            })),
            Behaviour::Nothing => Ok(None),
            Behaviour::Panic => panic!("model runtime crashed"),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(None)
            }
        }
    }
}

fn model(task: &'static str, behaviour: Behaviour) -> Arc<dyn LocalModel> {
    Arc::new(StubModel { id: "stub-model", task, behaviour })
}

fn well_formed(result: &InferenceResult) {
    assert!((0.0..=1.0).contains(&result.confidence));
    assert!(result.inference_time_ms >= 0.0);
}

#[tokio::test]
async fn offline_intent_falls_back_to_keywords() {
    let h = harness(false);
    let result = h
        .engine
        .inference()
        .infer("intent", &json!({"text": "I want to buy this now"}), true)
        .await;
    assert_eq!(result.source, InferenceSource::Heuristic);
    assert_eq!(result.output["intent"], "purchase");
    assert!(result.confidence >= 0.8);
    well_formed(&result);
    assert_eq!(h.backend.infer_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn local_model_answers_first_with_clamped_confidence() {
    let h = harness(true);
    h.engine.inference().register_local(model("intent", Behaviour::Answer(1.7)));
    let result = h.engine.inference().infer("intent", &json!("hi"), true).await;
    assert_eq!(result.source, InferenceSource::Local);
    assert_eq!(result.model_id.as_deref(), Some("stub-model"));
    assert_eq!(result.confidence, 1.0);
    assert_eq!(h.backend.infer_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_local_tiers_fall_through() {
    let mut config = EdgeConfig::default();
    config.inference.local_timeout_ms = 50;
    let h = harness_with(false, config, Arc::new(EdgeStore::open_in_memory().unwrap()));
    let router = h.engine.inference();

    for behaviour in [Behaviour::Nothing, Behaviour::Panic, Behaviour::Hang] {
        router.register_local(model("sentiment", behaviour));
        let result = router.infer("sentiment", &json!({"text": "great stuff"}), true).await;
        assert_eq!(result.source, InferenceSource::Heuristic);
        assert_eq!(result.output["sentiment"], "positive");
        well_formed(&result);
    }
}

#[tokio::test]
async fn remote_used_when_online_and_allowed() {
    let h = harness(true);
    let router = h.engine.inference();

    let result = router.infer("recommendation", &json!({}), true).await;
    assert_eq!(result.source, InferenceSource::Remote);
    assert_eq!(result.output["remote"], "recommendation");
    assert_eq!(result.confidence, 0.95);

    let result = router.infer("recommendation", &json!({}), false).await;
    assert_eq!(result.source, InferenceSource::Heuristic);
    assert_eq!(h.backend.infer_calls.load(Ordering::SeqCst), 1);

    h.backend.fail_infer.store(true, Ordering::SeqCst);
    let result = router.infer("intent", &json!({"text": "please help"}), true).await;
    assert_eq!(result.source, InferenceSource::Heuristic);
    assert_eq!(result.output["intent"], "support");
}

#[tokio::test]
async fn catalog_can_pin_a_task_to_heuristics() {
    let h = harness(true);
    h.backend.models.lock().push(EdgeModel {
        id: "intent-lite".into(),
        capability: "intent".into(),
        version: "2.1.0".into(),
        performance: ModelPerformance::default(),
        deployment: ModelDeployment {
            format: "onnx".into(),
            url: None,
            fallback_strategy: FallbackStrategy::Heuristic,
        },
    });
    h.engine.initialize().await;
    assert_eq!(h.engine.status().registered_models, 1);

    let result = h.engine.inference().infer("intent", &json!("buy"), true).await;
    assert_eq!(result.source, InferenceSource::Heuristic);
    assert_eq!(h.backend.infer_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_local_model_is_skipped() {
    let h = harness(false);
    h.engine.inference().catalog().replace(vec![EdgeModel {
        id: "stub-model".into(),
        capability: "intent".into(),
        version: "1.0.0".into(),
        performance: ModelPerformance { latency_ms: 5.0, accuracy: 0.9, memory_mb: 64 * 1024 },
        deployment: ModelDeployment::default(),
    }]);
    let mut caps = DeviceCapabilities::default();
    caps.compute.memory_bytes = 512 * 1024 * 1024;
    h.engine.inference().set_capabilities(caps);
    h.engine.inference().register_local(model("intent", Behaviour::Answer(0.9)));

    let result = h.engine.inference().infer("intent", &json!("buy it"), true).await;
    assert_eq!(result.source, InferenceSource::Heuristic);
}

#[tokio::test]
async fn unknown_task_still_answers() {
    let h = harness(false);
    let result = h.engine.inference().infer("translation", &json!({"text": "hola"}), true).await;
    assert_eq!(result.source, InferenceSource::Heuristic);
    assert!(result.output["prediction"].is_null());
    well_formed(&result);
}
