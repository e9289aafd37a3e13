use super::EdgeStore;
use crate::atoms::error::EdgeResult;
use crate::atoms::types::EdgeModel;
use log::warn;
use rusqlite::params;

impl EdgeStore {
    // ── Edge model catalog ─────────────────────────────────────────────

    /// Replace the catalog with the latest registration response.
    pub fn save_models(&self, models: &[EdgeModel]) -> EdgeResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM edge_models", [])?;
        for model in models {
            tx.execute(
                "INSERT OR REPLACE INTO edge_models (id, capability, body) VALUES (?1, ?2, ?3)",
                params![model.id, model.capability, serde_json::to_string(model)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_models(&self) -> EdgeResult<Vec<EdgeModel>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, body FROM edge_models ORDER BY capability, id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut models = Vec::new();
        for row in rows {
            let (id, body) = row?;
            match serde_json::from_str(&body) {
                Ok(m) => models.push(m),
                Err(e) => warn!("[store] Skipping undecodable model {}: {}", id, e),
            }
        }
        Ok(models)
    }
}
