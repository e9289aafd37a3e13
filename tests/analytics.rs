use crate::support::{harness, harness_with};
use openpawz_edge::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn ids(events: &[AnalyticsEvent]) -> Vec<String> {
    events.iter().map(|e| e.id.clone()).collect()
}

#[tokio::test]
async fn threshold_triggers_flush_while_online() {
    let h = harness(true);
    let analytics = h.engine.analytics();
    for i in 0..4 {
        analytics.record("click", json!({ "n": i })).await;
    }
    assert!(h.backend.batches.lock().is_empty());

    analytics.record("click", json!({ "n": 4 })).await;
    let batches = h.backend.batches.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].events.len(), 5);
    assert_eq!(batches[0].session_id, analytics.session_id());
    assert!(analytics.is_empty());
}

#[tokio::test]
async fn failed_flush_keeps_original_order() {
    let h = harness(true);
    let analytics = h.engine.analytics();
    h.backend.fail_analytics.store(true, Ordering::SeqCst);

    for i in 0..5 {
        analytics.record("view", json!({ "n": i })).await;
    }
    let before = analytics.snapshot();
    assert_eq!(before.len(), 5);

    assert_eq!(analytics.flush().await, 0);
    assert_eq!(analytics.snapshot(), before);

    let late = analytics.record("view", json!({ "n": 5 })).await;
    let mut expected = ids(&before);
    expected.push(late);
    assert_eq!(ids(&analytics.snapshot()), expected);
    assert_eq!(ids(&h.store.load_analytics().unwrap()), expected);

    h.backend.fail_analytics.store(false, Ordering::SeqCst);
    assert_eq!(analytics.flush().await, 6);
    assert_eq!(ids(&h.backend.batches.lock()[0].events), expected);
}

#[tokio::test]
async fn events_stay_buffered_until_the_send_is_confirmed() {
    let mut config = EdgeConfig::default();
    config.analytics.flush_threshold = 100;
    let h = harness_with(true, config, Arc::new(EdgeStore::open_in_memory().unwrap()));
    let analytics = h.engine.analytics();
    h.backend.fail_analytics.store(true, Ordering::SeqCst);
    h.backend.analytics_delay_ms.store(300, Ordering::SeqCst);

    for i in 0..5 {
        analytics.record("view", json!({ "n": i })).await;
    }
    let mut expected = ids(&analytics.snapshot());

    let (sent, (late, persisted, in_memory)) = tokio::join!(analytics.flush(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let late = analytics.record("late", json!({})).await;
        (late, h.store.load_analytics().unwrap(), analytics.len())
    });
    assert_eq!(sent, 0);
    expected.push(late);
    // While the request was out, the in-flight batch was still on disk.
    assert_eq!(ids(&persisted), expected);
    assert_eq!(in_memory, 6);
    assert_eq!(h.engine.status().buffered_events, 6);
    assert_eq!(ids(&analytics.snapshot()), expected);

    // A confirmed send removes exactly the events it carried.
    h.backend.fail_analytics.store(false, Ordering::SeqCst);
    let (sent, newer) = tokio::join!(analytics.flush(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        analytics.record("newer", json!({})).await
    });
    assert_eq!(sent, 6);
    assert_eq!(ids(&analytics.snapshot()), vec![newer.clone()]);
    assert_eq!(ids(&h.store.load_analytics().unwrap()), vec![newer]);
}

#[tokio::test]
async fn batches_are_capped() {
    let mut config = EdgeConfig::default();
    config.analytics.batch_size = 4;
    config.analytics.flush_threshold = 100;
    let h = harness_with(true, config, Arc::new(EdgeStore::open_in_memory().unwrap()));
    for i in 0..10 {
        h.engine.analytics().record("tick", json!(i)).await;
    }
    assert_eq!(h.engine.analytics().flush().await, 4);
    assert_eq!(h.engine.analytics().flush().await, 4);
    assert_eq!(h.engine.analytics().flush().await, 2);
    assert_eq!(h.engine.analytics().flush().await, 0);
    assert_eq!(h.engine.analytics().flush_passes(), 3);

    let data: Vec<_> = h
        .backend
        .batches
        .lock()
        .iter()
        .flat_map(|b| b.events.iter().map(|e| e.data.clone()))
        .collect();
    assert_eq!(data, (0..10).map(|i| json!(i)).collect::<Vec<_>>());
}

#[tokio::test]
async fn overflow_drops_oldest() {
    let mut config = EdgeConfig::default();
    config.analytics.max_buffered = 3;
    let h = harness_with(false, config, Arc::new(EdgeStore::open_in_memory().unwrap()));
    for i in 0..5 {
        h.engine.analytics().record("tick", json!(i)).await;
    }
    let kept: Vec<_> = h.engine.analytics().snapshot().into_iter().map(|e| e.data).collect();
    assert_eq!(kept, vec![json!(2), json!(3), json!(4)]);
    assert_eq!(h.engine.analytics().dropped(), 2);
    assert_eq!(h.engine.status().dropped_events, 2);
}

#[tokio::test]
async fn offline_events_are_flagged_and_not_sent() {
    let h = harness(false);
    for i in 0..7 {
        h.engine.analytics().record("offline_tick", json!(i)).await;
    }
    assert_eq!(h.engine.analytics().flush().await, 0);
    assert!(h.backend.batches.lock().is_empty());
    assert!(h.engine.analytics().snapshot().iter().all(|e| e.offline));
}
