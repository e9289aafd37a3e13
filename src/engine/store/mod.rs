// Edge Engine — Local Store
// Persists engine state in SQLite via rusqlite so queued work, buffered
// events and cached content survive restarts.
//
// Module layout:
//   schema     — idempotent table creation
//   config     — key/value store + the device identity
//   queue      — sync queue and dead-letter lists (ordered rewrite)
//   cache      — persisted content-cache tier
//   analytics  — analytics buffer (ordered rewrite)
//   models     — edge model catalog from device registration

use crate::atoms::constants::{DATA_DIR_NAME, DB_FILE_NAME};
use crate::atoms::error::EdgeResult;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

mod analytics;
mod cache;
mod config;
mod models;
mod queue;
mod schema;

/// Default location of the engine database when no data dir is configured.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(DATA_DIR_NAME)
}

/// Thread-safe database wrapper.
pub struct EdgeStore {
    conn: Mutex<Connection>,
}

impl EdgeStore {
    /// Open (or create) the engine database inside `data_dir`.
    pub fn open(data_dir: &Path) -> EdgeResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(DB_FILE_NAME);
        info!("[store] Opening edge store at {:?}", path);

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA synchronous=NORMAL;").ok();

        schema::run_migrations(&conn)?;
        Ok(EdgeStore { conn: Mutex::new(conn) })
    }

    /// Private in-memory database, used by tests and by hosts that want a
    /// purely volatile engine.
    pub fn open_in_memory() -> EdgeResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(EdgeStore { conn: Mutex::new(conn) })
    }
}

#[cfg(test)]
impl EdgeStore {
    /// Drop `table` so every write to it fails until `repair()`.
    pub(crate) fn break_table(&self, table: &str) {
        self.conn.lock().execute_batch(&format!("DROP TABLE {table};")).unwrap();
    }

    pub(crate) fn repair(&self) {
        schema::run_migrations(&self.conn.lock()).unwrap();
    }
}
