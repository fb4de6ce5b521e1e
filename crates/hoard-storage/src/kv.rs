//! Key-value document store over the embedded `kv_store` table.
//!
//! Values are JSON documents keyed by `(collection, key)`. Besides the
//! point operations used by the tier manager, the store offers a small
//! document API (`add_document`, `find_document`, `update_document`,
//! `delete_document`) that scans a collection and filters client-side,
//! which is fine for the low-cardinality collections it serves.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use serde_json::{Map, Value};
use tracing::{error, warn};
use uuid::Uuid;

use hoard_core::error::HoardError;

use crate::db::Database;

/// Field holding a document's key inside document-style values.
pub const ID_FIELD: &str = "_id";

/// Key-value access to the embedded database.
pub struct LocalStore {
    db: Arc<Database>,
}

impl LocalStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Insert a new row. Returns `false` when the key already exists.
    pub fn insert(&self, collection: &str, key: &str, value: &Value) -> Result<bool, HoardError> {
        let text = serde_json::to_string(value)?;
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO kv_store (collection, key, value) VALUES (?1, ?2, ?3)",
                    rusqlite::params![collection, key, text],
                )
                .map_err(|e| HoardError::Storage(format!("Failed to insert document: {}", e)))?;
            Ok(inserted == 1)
        })
    }

    /// Insert or replace the row for `(collection, key)`.
    pub fn upsert(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError> {
        let text = serde_json::to_string(value)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (collection, key, value) VALUES (?1, ?2, ?3)",
                rusqlite::params![collection, key, text],
            )
            .map_err(|e| HoardError::Storage(format!("Failed to upsert document: {}", e)))?;
            Ok(())
        })
    }

    /// Replace an existing row. Returns `false` when there was nothing to update.
    pub fn update(&self, collection: &str, key: &str, value: &Value) -> Result<bool, HoardError> {
        let text = serde_json::to_string(value)?;
        self.db.with_conn(|conn| {
            let updated = conn
                .execute(
                    "UPDATE kv_store SET value = ?1 WHERE collection = ?2 AND key = ?3",
                    rusqlite::params![text, collection, key],
                )
                .map_err(|e| HoardError::Storage(format!("Failed to update document: {}", e)))?;
            Ok(updated > 0)
        })
    }

    /// Point lookup.
    ///
    /// A stored JSON `null` comes back as `Some(Value::Null)`; only a
    /// missing row is `None`.
    pub fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError> {
        let text: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_store WHERE collection = ?1 AND key = ?2",
                rusqlite::params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HoardError::Storage(format!("Failed to read document: {}", e)))
        })?;

        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Delete a row. Returns `false` when the key did not exist.
    pub fn delete(&self, collection: &str, key: &str) -> Result<bool, HoardError> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM kv_store WHERE collection = ?1 AND key = ?2",
                    rusqlite::params![collection, key],
                )
                .map_err(|e| HoardError::Storage(format!("Failed to delete document: {}", e)))?;
            Ok(deleted > 0)
        })
    }

    /// Number of rows in a collection.
    pub fn count(&self, collection: &str) -> Result<u64, HoardError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM kv_store WHERE collection = ?1",
                    rusqlite::params![collection],
                    |row| row.get(0),
                )
                .map_err(|e| HoardError::Storage(format!("Failed to count documents: {}", e)))?;
            Ok(count as u64)
        })
    }

    /// Scan a collection and return the first `(key, value)` accepted by
    /// `predicate`. Rows whose JSON does not parse are skipped.
    pub fn find<P>(&self, collection: &str, predicate: P) -> Result<Option<(String, Value)>, HoardError>
    where
        P: Fn(&Value) -> bool,
    {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value FROM kv_store WHERE collection = ?1")
                .map_err(|e| HoardError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![collection], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| HoardError::Storage(format!("Failed to scan collection: {}", e)))?;

            for row in rows {
                let (key, text) = row.map_err(|e| HoardError::Storage(e.to_string()))?;
                match serde_json::from_str::<Value>(&text) {
                    Ok(value) if predicate(&value) => return Ok(Some((key, value))),
                    Ok(_) => {}
                    Err(e) => warn!(collection = %collection, key = %key, error = %e, "Skipping unreadable document"),
                }
            }
            Ok(None)
        })
    }

    // -------------------------------------------------------------------------
    // Document API
    // -------------------------------------------------------------------------

    /// Insert a document, generating a UUID `_id` when it has none.
    ///
    /// Returns the key, or `None` if a document with that `_id` exists.
    pub fn add_document(
        &self,
        collection: &str,
        mut document: Map<String, Value>,
    ) -> Result<Option<String>, HoardError> {
        let key = match document.get(ID_FIELD) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        if self.insert(collection, &key, &Value::Object(document))? {
            Ok(Some(key))
        } else {
            error!(collection = %collection, key = %key, "Document already exists");
            Ok(None)
        }
    }

    /// First document whose fields equal every field of `query`.
    pub fn find_document(
        &self,
        collection: &str,
        query: &Map<String, Value>,
    ) -> Result<Option<Map<String, Value>>, HoardError> {
        let found = self.find(collection, |value| matches_query(value, query))?;
        Ok(found.and_then(|(_, value)| match value {
            Value::Object(doc) => Some(doc),
            _ => None,
        }))
    }

    /// Merge `update` into the first document matching `query`.
    ///
    /// A top-level `$set` object is unwrapped, so both `{"a": 1}` and
    /// `{"$set": {"a": 1}}` set field `a`. Returns the merged document.
    pub fn update_document(
        &self,
        collection: &str,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Result<Option<Map<String, Value>>, HoardError> {
        let found = self.find(collection, |value| matches_query(value, query))?;
        let Some((key, Value::Object(mut document))) = found else {
            return Ok(None);
        };

        let changes = match update.get("$set") {
            Some(Value::Object(set)) => set,
            _ => update,
        };
        for (field, value) in changes {
            document.insert(field.clone(), value.clone());
        }

        let merged = Value::Object(document);
        self.update(collection, &key, &merged)?;
        match merged {
            Value::Object(document) => Ok(Some(document)),
            _ => Ok(None),
        }
    }

    /// Delete the first document matching `query`. Returns how many were removed.
    pub fn delete_document(
        &self,
        collection: &str,
        query: &Map<String, Value>,
    ) -> Result<u64, HoardError> {
        let found = self.find(collection, |value| matches_query(value, query))?;
        match found {
            Some((key, _)) => Ok(self.delete(collection, &key)? as u64),
            None => Ok(0),
        }
    }
}

/// Every field of `query` must be present in `value` with an equal value.
fn matches_query(value: &Value, query: &Map<String, Value>) -> bool {
    match value {
        Value::Object(doc) => query.iter().all(|(k, v)| doc.get(k) == Some(v)),
        _ => false,
    }
}
