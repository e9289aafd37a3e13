use super::queue::{load_ordered, rewrite_ordered};
use super::EdgeStore;
use crate::atoms::error::EdgeResult;
use crate::atoms::types::AnalyticsEvent;

const ANALYTICS_TABLE: &str = "analytics_buffer";

impl EdgeStore {
    // ── Analytics buffer ───────────────────────────────────────────────

    /// Rewrite the persisted buffer in insertion order.
    pub fn save_analytics<'a>(
        &self,
        events: impl IntoIterator<Item = &'a AnalyticsEvent>,
    ) -> EdgeResult<()> {
        let rows = events
            .into_iter()
            .map(|e| Ok((e.id.clone(), serde_json::to_string(e)?)))
            .collect::<EdgeResult<Vec<_>>>()?;
        let mut conn = self.conn.lock();
        rewrite_ordered(&mut conn, ANALYTICS_TABLE, &rows)
    }

    pub fn load_analytics(&self) -> EdgeResult<Vec<AnalyticsEvent>> {
        let conn = self.conn.lock();
        load_ordered(&conn, ANALYTICS_TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(n: u32) -> AnalyticsEvent {
        AnalyticsEvent {
            id: format!("evt-{n}"),
            event_type: "page_view".into(),
            data: json!({"n": n}),
            timestamp: chrono::Utc::now(),
            device_id: "edge-test".into(),
            offline: n % 2 == 0,
        }
    }

    #[test]
    fn buffer_roundtrip_keeps_order() {
        let store = EdgeStore::open_in_memory().unwrap();
        let events: Vec<_> = (0..4).map(event).collect();
        store.save_analytics(&events).unwrap();
        assert_eq!(store.load_analytics().unwrap(), events);

        store.save_analytics(&events[2..]).unwrap();
        let ids: Vec<_> = store.load_analytics().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["evt-2", "evt-3"]);
    }
}
