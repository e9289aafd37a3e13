// Database schema for the edge store.
// Called once by EdgeStore::open(). Adding a table or column: append an
// idempotent CREATE TABLE IF NOT EXISTS (or ALTER TABLE … ADD COLUMN with the
// error swallowed) at the end. Never modify existing SQL.
//
// Ordered lists (sync queue, dead letters, analytics buffer) carry an explicit
// `position` so reloads restore insertion order exactly.

use crate::atoms::error::EdgeResult;
use rusqlite::Connection;

pub(crate) fn run_migrations(conn: &Connection) -> EdgeResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS edge_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_dead_letters (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            body TEXT NOT NULL,
            dead_lettered_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS content_cache (
            content_type TEXT NOT NULL,
            content_id TEXT NOT NULL,
            body TEXT NOT NULL,
            expires_at TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (content_type, content_id)
        );

        CREATE TABLE IF NOT EXISTS analytics_buffer (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            body TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS edge_models (
            id TEXT PRIMARY KEY,
            capability TEXT NOT NULL,
            body TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sync_queue_position ON sync_queue(position);
        CREATE INDEX IF NOT EXISTS idx_analytics_position ON analytics_buffer(position);
        ",
    )?;
    Ok(())
}
