//! Storage tier abstraction.
//!
//! Every tier (cache, cloud, local) implements [`StorageTier`]. The tier
//! manager holds the active tiers in fallback order and never branches on
//! which concrete backend sits behind a role.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use hoard_core::error::HoardError;
use hoard_core::types::TierRole;

use crate::db::Database;
use crate::kv::LocalStore;

/// A key-value tier addressed by `(collection, key)`.
#[async_trait]
pub trait StorageTier: Send + Sync {
    /// Which position this tier takes in the fallback order.
    fn role(&self) -> TierRole;

    /// Write `value`, replacing whatever the tier held for the key.
    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError>;

    /// Read a value. `Ok(Some(Value::Null))` is a stored null, `Ok(None)`
    /// is a miss.
    async fn fetch(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, collection: &str, key: &str) -> Result<(), HoardError>;
}

/// The embedded tier, backed by the `kv_store` table.
pub struct LocalTier {
    store: LocalStore,
}

impl LocalTier {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: LocalStore::new(db),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

#[async_trait]
impl StorageTier for LocalTier {
    fn role(&self) -> TierRole {
        TierRole::Local
    }

    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError> {
        self.store.upsert(collection, key, value)
    }

    async fn fetch(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError> {
        self.store.get(collection, key)
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<(), HoardError> {
        self.store.delete(collection, key).map(|_| ())
    }
}

/// Cache key layout shared by key-value caches: `collection:key`.
pub fn cache_key(collection: &str, key: &str) -> String {
    format!("{}:{}", collection, key)
}
