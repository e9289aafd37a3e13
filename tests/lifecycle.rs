use crate::support::{draft, harness, harness_with, test_config};
use openpawz_edge::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn reconnect_runs_one_drain_and_one_flush() {
    let h = harness(true);
    h.engine.handle_signal(PlatformSignal::Offline).await;

    h.engine.queue().enqueue(draft("a", 5)).await;
    h.engine.queue().enqueue(draft("b", 5)).await;
    for i in 0..6 {
        h.engine.analytics().record("view", json!(i)).await;
    }

    h.source.set_online_silently(true);
    h.engine.handle_signal(PlatformSignal::Online).await;
    // Duplicate platform event: no second pass.
    h.engine.handle_signal(PlatformSignal::Online).await;

    let status = h.engine.status();
    assert_eq!(status.drain_passes, 1);
    assert_eq!(status.flush_passes, 1);
    assert_eq!(h.backend.synced_entity_ids(), vec!["a", "b"]);
    let batches = h.backend.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].events.len(), 6);
}

#[tokio::test]
async fn platform_signals_reach_the_engine_after_start() {
    let h = harness(false);
    h.engine.queue().enqueue(draft("queued", 5)).await;
    h.engine.start();

    h.source.set_online(true);
    for _ in 0..100 {
        if !h.backend.synced.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.backend.synced_entity_ids(), vec!["queued"]);
    assert_eq!(h.engine.status().state, ConnectivityState::Online);
    assert!(h.backend.statuses.lock().iter().any(|s| s.is_online));
    h.engine.shutdown();
}

#[tokio::test]
async fn offline_signal_cuts_a_running_drain_short() {
    let h = harness(false);
    for i in 0..10 {
        h.engine.queue().enqueue(draft(&format!("op-{i}"), 5)).await;
    }
    h.backend.submit_delay_ms.store(100, Ordering::SeqCst);
    h.engine.start();

    h.source.set_online(true);
    tokio::time::sleep(Duration::from_millis(150)).await;
    h.source.set_online(false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.engine.status().state, ConnectivityState::Offline);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let synced = h.backend.synced_count();
    assert!(synced >= 1 && synced < 10, "synced {synced}");
    assert_eq!(h.engine.queue().len(), 10 - synced);
    h.engine.shutdown();
}

#[tokio::test]
async fn visibility_regain_rechecks_platform() {
    let h = harness(true);
    h.source.set_online_silently(false);
    assert_eq!(
        h.engine.handle_signal(PlatformSignal::VisibilityRegained).await,
        Some(Transition::WentOffline)
    );

    h.engine.queue().enqueue(draft("later", 5)).await;
    h.source.set_online_silently(true);
    assert_eq!(
        h.engine.handle_signal(PlatformSignal::VisibilityRegained).await,
        Some(Transition::CameOnline)
    );
    assert_eq!(h.backend.synced_entity_ids(), vec!["later"]);
    assert_eq!(
        h.engine.handle_signal(PlatformSignal::VisibilityRegained).await,
        Some(Transition::Resumed)
    );
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EdgeConfig { data_dir: Some(dir.path().to_path_buf()), ..EdgeConfig::default() };

    let (device_id, op_ids) = {
        let h = harness_with(false, config.clone(), Arc::new(EdgeStore::open(dir.path()).unwrap()));
        let a = h.engine.queue().enqueue(draft("a", 5)).await;
        let b = h.engine.queue().enqueue(draft("b", 1)).await;
        h.engine.analytics().record("view", json!({"page": 1})).await;
        h.engine.analytics().record("view", json!({"page": 2})).await;
        (h.engine.device_id().to_string(), vec![b, a])
    };

    let h = harness_with(true, config, Arc::new(EdgeStore::open(dir.path()).unwrap()));
    assert_eq!(h.engine.device_id(), device_id);
    let restored: Vec<_> = h.engine.queue().pending().into_iter().map(|op| op.id).collect();
    assert_eq!(restored, op_ids);
    let pages: Vec<_> = h.engine.analytics().snapshot().into_iter().map(|e| e.data["page"].clone()).collect();
    assert_eq!(pages, vec![json!(1), json!(2)]);

    // Sequence numbers continue after a restart.
    h.engine.queue().enqueue(draft("c", 1)).await;
    assert_eq!(h.backend.synced_entity_ids(), vec!["b", "c", "a"]);
}

#[tokio::test]
async fn shutdown_hands_off_head_of_queue_and_buffer() {
    let mut config = EdgeConfig::default();
    config.analytics.final_transmission_size = 2;
    let h = harness_with(false, config, Arc::new(EdgeStore::open_in_memory().unwrap()));
    for id in ["x", "y", "z"] {
        h.engine.queue().enqueue(draft(id, 5)).await;
    }
    h.engine.analytics().record("exit", json!({})).await;

    h.engine.shutdown();
    h.engine.shutdown();

    let finals = h.backend.finals.lock();
    assert_eq!(finals.len(), 1);
    let ops: Vec<_> = finals[0].operations.iter().map(|op| op.entity_id.clone().unwrap()).collect();
    assert_eq!(ops, vec!["x", "y"]);
    assert_eq!(finals[0].events.len(), 1);
    assert_eq!(finals[0].device_id, h.engine.device_id());
    // Nothing is removed locally: delivery is not confirmed.
    assert_eq!(h.engine.queue().len(), 3);
}

#[tokio::test]
async fn registration_failure_keeps_cached_catalog() {
    let store = Arc::new(EdgeStore::open_in_memory().unwrap());
    let model = EdgeModel {
        id: "sentiment-v1".into(),
        capability: "sentiment".into(),
        version: "1.0.0".into(),
        performance: ModelPerformance::default(),
        deployment: ModelDeployment::default(),
    };

    let first = harness_with(true, test_config(), store.clone());
    first.backend.models.lock().push(model.clone());
    let caps = first.engine.initialize().await;
    assert!(caps.compute.cores >= 1);
    assert_eq!(store.load_models().unwrap(), vec![model.clone()]);

    let second = harness_with(true, test_config(), store);
    second.backend.fail_register.store(true, Ordering::SeqCst);
    second.engine.initialize().await;
    assert_eq!(second.backend.registrations.load(Ordering::SeqCst), 1);
    assert_eq!(second.engine.inference().catalog().all(), vec![model]);
}
