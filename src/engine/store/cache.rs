use super::EdgeStore;
use crate::atoms::error::EdgeResult;
use crate::atoms::types::{CacheEntry, CacheKey};
use log::warn;
use rusqlite::{params, OptionalExtension};

impl EdgeStore {
    // ── Persisted cache tier ───────────────────────────────────────────
    // Expiry is NOT checked here. Expired rows stay on disk until they are
    // overwritten or invalidated; the cache layer decides what is absent.

    pub fn cache_get(&self, key: &CacheKey) -> EdgeResult<Option<CacheEntry>> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM content_cache WHERE content_type = ?1 AND content_id = ?2",
                params![key.content_type, key.content_id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => match serde_json::from_str(&body) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    warn!(
                        "[store] Dropping undecodable cache row {}/{}: {}",
                        key.content_type, key.content_id, e
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn cache_put(&self, entry: &CacheEntry) -> EdgeResult<()> {
        let body = serde_json::to_string(entry)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO content_cache (content_type, content_id, body, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
            params![
                entry.key.content_type,
                entry.key.content_id,
                body,
                entry.expires_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn cache_remove(&self, key: &CacheKey) -> EdgeResult<bool> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM content_cache WHERE content_type = ?1 AND content_id = ?2",
            params![key.content_type, key.content_id],
        )?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn expired_rows_are_still_physically_present() {
        let store = EdgeStore::open_in_memory().unwrap();
        let key = CacheKey::new("article", "42");
        let entry = CacheEntry {
            key: key.clone(),
            payload: json!({"title": "hello"}),
            timestamp: Utc::now() - Duration::hours(2),
            expires_at: Some(Utc::now() - Duration::hours(1)),
            priority: 5,
        };
        store.cache_put(&entry).unwrap();
        let loaded = store.cache_get(&key).unwrap().unwrap();
        assert!(loaded.is_expired(Utc::now()));
        assert!(store.cache_remove(&key).unwrap());
        assert!(store.cache_get(&key).unwrap().is_none());
    }
}
