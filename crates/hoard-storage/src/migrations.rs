//! Database schema migrations.
//!
//! Creates the generic key-value table and the FTS5 message index. Every
//! statement is create-if-absent, so opening an existing file is safe.

use rusqlite::Connection;
use tracing::info;

use hoard_core::error::HoardError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), HoardError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| HoardError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| HoardError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: kv_store_and_message_index");
    }

    Ok(())
}

/// Version 1: key-value documents plus the message index.
fn apply_v1(conn: &Connection) -> Result<(), HoardError> {
    conn.execute_batch(
        "
        -- One row per (collection, key); value is JSON text.
        CREATE TABLE IF NOT EXISTS kv_store (
            collection  TEXT NOT NULL,
            key         TEXT NOT NULL,
            value       TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        );

        -- Only the message text is tokenized; identity and metadata
        -- columns are stored for retrieval and the delete-then-insert upsert.
        CREATE VIRTUAL TABLE IF NOT EXISTS fts_messages USING fts5(
            message_id UNINDEXED,
            chat_id UNINDEXED,
            text,
            timestamp UNINDEXED,
            sender_id UNINDEXED,
            tokenize = 'porter'
        );

        INSERT OR IGNORE INTO schema_migrations (version, name)
            VALUES (1, 'kv_store_and_message_index');
        ",
    )
    .map_err(|e| HoardError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
