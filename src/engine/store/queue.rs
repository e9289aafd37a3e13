use super::EdgeStore;
use crate::atoms::error::EdgeResult;
use crate::atoms::types::SyncOperation;
use log::warn;
use rusqlite::{params, Connection};

const QUEUE_TABLE: &str = "sync_queue";
const DEAD_LETTER_TABLE: &str = "sync_dead_letters";

/// Replace the full contents of an ordered table in one transaction.
/// `table` is always one of this module's constants.
pub(super) fn rewrite_ordered(
    conn: &mut Connection,
    table: &str,
    rows: &[(String, String)],
) -> EdgeResult<()> {
    let tx = conn.transaction()?;
    tx.execute(&format!("DELETE FROM {table}"), [])?;
    {
        let mut stmt =
            tx.prepare(&format!("INSERT INTO {table} (id, position, body) VALUES (?1, ?2, ?3)"))?;
        for (position, (id, body)) in rows.iter().enumerate() {
            stmt.execute(params![id, position as i64, body])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load bodies of an ordered table; rows that no longer decode are skipped.
pub(super) fn load_ordered<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    table: &str,
) -> EdgeResult<Vec<T>> {
    let mut stmt = conn.prepare(&format!("SELECT id, body FROM {table} ORDER BY position"))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut items = Vec::new();
    for row in rows {
        let (id, body) = row?;
        match serde_json::from_str(&body) {
            Ok(item) => items.push(item),
            Err(e) => warn!("[store] Skipping undecodable row {} in {}: {}", id, table, e),
        }
    }
    Ok(items)
}

fn encode(ops: &[SyncOperation]) -> EdgeResult<Vec<(String, String)>> {
    ops.iter()
        .map(|op| Ok((op.id.clone(), serde_json::to_string(op)?)))
        .collect()
}

impl EdgeStore {
    // ── Sync queue ─────────────────────────────────────────────────────

    pub fn save_queue(&self, ops: &[SyncOperation]) -> EdgeResult<()> {
        let rows = encode(ops)?;
        let mut conn = self.conn.lock();
        rewrite_ordered(&mut conn, QUEUE_TABLE, &rows)
    }

    pub fn load_queue(&self) -> EdgeResult<Vec<SyncOperation>> {
        let conn = self.conn.lock();
        load_ordered(&conn, QUEUE_TABLE)
    }

    // ── Dead letters ───────────────────────────────────────────────────

    pub fn save_dead_letters(&self, ops: &[SyncOperation]) -> EdgeResult<()> {
        let rows = encode(ops)?;
        let mut conn = self.conn.lock();
        rewrite_ordered(&mut conn, DEAD_LETTER_TABLE, &rows)
    }

    pub fn load_dead_letters(&self) -> EdgeResult<Vec<SyncOperation>> {
        let conn = self.conn.lock();
        load_ordered(&conn, DEAD_LETTER_TABLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{ConflictStrategy, OperationKind};
    use serde_json::json;

    fn op(id: &str, seq: u64, priority: u32) -> SyncOperation {
        SyncOperation {
            id: id.into(),
            kind: OperationKind::Update,
            entity_type: "note".into(),
            entity_id: Some(format!("n-{seq}")),
            payload: json!({"seq": seq}),
            priority,
            original_priority: priority,
            depends_on: None,
            conflict_strategy: ConflictStrategy::Merge,
            seq,
            created_at: chrono::Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    #[test]
    fn queue_order_survives_reload() {
        let store = EdgeStore::open_in_memory().unwrap();
        let ops = vec![op("c", 3, 1), op("a", 1, 5), op("b", 2, 5)];
        store.save_queue(&ops).unwrap();
        let loaded = store.load_queue().unwrap();
        assert_eq!(loaded, ops);
    }

    #[test]
    fn save_replaces_previous_contents() {
        let store = EdgeStore::open_in_memory().unwrap();
        store.save_queue(&[op("a", 1, 5), op("b", 2, 5)]).unwrap();
        store.save_queue(&[op("b", 2, 6)]).unwrap();
        let loaded = store.load_queue().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].priority, 6);
    }

    #[test]
    fn dead_letters_are_separate() {
        let store = EdgeStore::open_in_memory().unwrap();
        store.save_queue(&[op("a", 1, 5)]).unwrap();
        store.save_dead_letters(&[op("z", 9, 100)]).unwrap();
        assert_eq!(store.load_queue().unwrap().len(), 1);
        assert_eq!(store.load_dead_letters().unwrap()[0].id, "z");
    }
}
