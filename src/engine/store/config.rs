use super::EdgeStore;
use crate::atoms::constants::DEVICE_ID_KEY;
use crate::atoms::error::EdgeResult;
use log::info;
use rusqlite::{params, OptionalExtension};

impl EdgeStore {
    // ── Key/value storage ──────────────────────────────────────────────

    pub fn get_config(&self, key: &str) -> EdgeResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM edge_config WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_config(&self, key: &str, value: &str) -> EdgeResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO edge_config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Device identity ────────────────────────────────────────────────

    /// The device id, generated on first call and reused across restarts.
    pub fn device_id(&self) -> EdgeResult<String> {
        if let Some(id) = self.get_config(DEVICE_ID_KEY)? {
            return Ok(id);
        }
        let id = format!("edge-{}", uuid::Uuid::new_v4());
        self.set_config(DEVICE_ID_KEY, &id)?;
        info!("[store] Generated new device identity {}", id);
        Ok(id)
    }
}
