//! Full-text message index using SQLite FTS5.
//!
//! Lives in the same database file as the key-value store and shares its
//! connection gate. FTS5 has no primary-key upsert, so re-ingesting a
//! `(message_id, chat_id)` pair deletes the old row and inserts the new
//! one inside a single transaction.

use std::sync::Arc;

use tracing::info;

use hoard_core::error::HoardError;
use hoard_core::types::{MessageRecord, SearchHit};

use crate::db::Database;

/// Turn free text into an FTS5 query that cannot trip the query parser.
///
/// Each whitespace-separated term becomes a quoted string (embedded
/// quotes doubled), which FTS5 combines with implicit AND. Returns an
/// empty string when there are no terms.
pub fn sanitize_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Relevance-ranked index over observed conversation messages.
pub struct MessageIndex {
    db: Arc<Database>,
}

impl MessageIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Index a message, replacing any earlier text for the same
    /// `(message_id, chat_id)`. Messages with blank text are ignored and
    /// return `false`.
    pub fn ingest(&self, record: &MessageRecord) -> Result<bool, HoardError> {
        if record.text.trim().is_empty() {
            return Ok(false);
        }

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| HoardError::Search(format!("Failed to begin index upsert: {}", e)))?;
            tx.execute(
                "DELETE FROM fts_messages WHERE message_id = ?1 AND chat_id = ?2",
                rusqlite::params![record.message_id, record.chat_id],
            )
            .map_err(|e| HoardError::Search(format!("Failed to remove previous entry: {}", e)))?;
            tx.execute(
                "INSERT INTO fts_messages (message_id, chat_id, text, timestamp, sender_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    record.message_id,
                    record.chat_id,
                    record.text,
                    record.timestamp,
                    record.sender_id,
                ],
            )
            .map_err(|e| HoardError::Search(format!("Failed to index message: {}", e)))?;
            tx.commit()
                .map_err(|e| HoardError::Search(format!("Failed to commit index upsert: {}", e)))?;
            Ok(true)
        })
    }

    /// Search with free text. Punctuation is neutralised, every term must
    /// match, and hits come back most relevant first.
    pub fn search(&self, query: &str, limit: u64) -> Result<Vec<SearchHit>, HoardError> {
        let fts_query = sanitize_fts5_query(query);
        self.search_raw(&fts_query, limit)
    }

    /// Search with native FTS5 query syntax (phrases, AND/OR/NOT, prefix `*`).
    ///
    /// Results are ordered by BM25 rank; the returned score is the negated
    /// rank so that higher means more relevant.
    pub fn search_raw(&self, query: &str, limit: u64) -> Result<Vec<SearchHit>, HoardError> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT message_id, chat_id, text, timestamp, sender_id, rank
                     FROM fts_messages
                     WHERE fts_messages MATCH ?1
                     ORDER BY rank
                     LIMIT ?2",
                )
                .map_err(|e| HoardError::Search(format!("FTS5 query prepare failed: {}", e)))?;

            let rows = stmt
                .query_map(rusqlite::params![query, limit as i64], |row| {
                    let rank: f64 = row.get(5)?;
                    Ok(SearchHit {
                        record: MessageRecord {
                            message_id: row.get(0)?,
                            chat_id: row.get(1)?,
                            text: row.get(2)?,
                            timestamp: row.get(3)?,
                            sender_id: row.get(4)?,
                        },
                        score: -rank,
                    })
                })
                .map_err(|e| HoardError::Search(format!("FTS5 query failed: {}", e)))?;

            let mut hits = Vec::new();
            for row in rows {
                hits.push(row.map_err(|e| HoardError::Search(e.to_string()))?);
            }
            Ok(hits)
        })
    }

    /// Count messages matching a free-text query.
    pub fn count_matches(&self, query: &str) -> Result<u64, HoardError> {
        let fts_query = sanitize_fts5_query(query);
        if fts_query.is_empty() {
            return Ok(0);
        }

        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM fts_messages WHERE fts_messages MATCH ?1",
                    rusqlite::params![fts_query],
                    |row| row.get(0),
                )
                .map_err(|e| HoardError::Search(format!("FTS5 count failed: {}", e)))?;
            Ok(count as u64)
        })
    }

    /// Number of indexed messages.
    pub fn len(&self) -> Result<u64, HoardError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM fts_messages", [], |row| row.get(0))
                .map_err(|e| HoardError::Search(format!("FTS5 count failed: {}", e)))?;
            Ok(count as u64)
        })
    }

    pub fn is_empty(&self) -> Result<bool, HoardError> {
        Ok(self.len()? == 0)
    }

    /// Remove every indexed message.
    pub fn wipe(&self) -> Result<u64, HoardError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM fts_messages", [])
                .map_err(|e| HoardError::Search(format!("Failed to wipe index: {}", e)))
        })?;
        info!(removed, "Message index wiped");
        Ok(removed as u64)
    }
}
