//! Tiered store manager.
//!
//! Presents one `set` / `get` / `delete` contract over the active tiers,
//! visited in the fixed order cache, cloud, local:
//!
//! - **set** writes through to every tier independently. The local tier is
//!   written when no cloud write succeeded (no cloud tier, or it failed).
//!   Cache failures never trigger a fallback.
//! - **get** returns the first hit. A cloud hit is copied back into the
//!   cache by a detached task whose failure only shows up in logs.
//! - **delete** removes the key from every tier, best-effort.
//!
//! Remote tier errors are logged and absorbed. Only a local tier failure
//! reaches the caller, as [`HoardError::StorageUnavailable`].
//!
//! Tier health is decided once by [`TierManager::bootstrap`]; a remote tier
//! that fails its probe is left out for the rest of the process.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use hoard_core::config::{non_empty, StorageConfig};
use hoard_core::error::HoardError;
use hoard_core::types::{TierHealth, TierRole};

use crate::db::Database;
use crate::kv::LocalStore;
use crate::search::MessageIndex;
use crate::tier::{LocalTier, StorageTier};

/// Orchestrates reads and writes across the storage tiers.
pub struct TierManager {
    /// Active tiers sorted by role; the local tier is always last.
    tiers: Vec<Arc<dyn StorageTier>>,
    local: Arc<LocalTier>,
    db: Arc<Database>,
    health: TierHealth,
}

impl TierManager {
    /// Build a manager from an open database and already-connected remote tiers.
    pub fn new(db: Arc<Database>, remotes: Vec<Arc<dyn StorageTier>>) -> Self {
        let local = Arc::new(LocalTier::new(Arc::clone(&db)));

        let mut tiers: Vec<Arc<dyn StorageTier>> = remotes
            .into_iter()
            .filter(|tier| tier.role() != TierRole::Local)
            .collect();
        tiers.sort_by_key(|tier| tier.role());
        tiers.push(Arc::clone(&local) as Arc<dyn StorageTier>);

        let health = TierHealth::new(
            tiers.iter().any(|t| t.role() == TierRole::Cache),
            tiers.iter().any(|t| t.role() == TierRole::Cloud),
        );

        Self {
            tiers,
            local,
            db,
            health,
        }
    }

    /// Open the local tier and probe the configured remote tiers.
    ///
    /// Remote tiers that are unconfigured, unreachable or slower than the
    /// probe timeout are logged and skipped. Only a local tier that cannot
    /// be opened fails startup.
    pub async fn bootstrap(config: &StorageConfig) -> Result<Self, HoardError> {
        info!("Initializing tiered store");

        let db = match Database::new(Path::new(&config.db_path)) {
            Ok(db) => Arc::new(db),
            Err(e) => {
                error!(path = %config.db_path, error = %e, "Failed to open local tier");
                return Err(e);
            }
        };
        info!(path = %config.db_path, "Local tier (SQLite) ready");

        let timeout = Duration::from_millis(config.probe_timeout_ms);
        let mut remotes: Vec<Arc<dyn StorageTier>> = Vec::new();

        match non_empty(config.cloud_uri.clone()) {
            Some(uri) => match connect_cloud(&uri, &config.cloud_database, timeout).await {
                Ok(tier) => remotes.push(tier),
                Err(e) => warn!(error = %e, "Cloud tier unavailable, falling back to local"),
            },
            None => warn!("No cloud URI configured, switching to local mode"),
        }

        if let Some(url) = non_empty(config.cache_url.clone()) {
            let password = non_empty(config.cache_password.clone());
            match connect_cache(&url, password.as_deref(), timeout).await {
                Ok(tier) => remotes.push(tier),
                Err(e) => warn!(error = %e, "Cache tier unavailable"),
            }
        }

        let manager = Self::new(db, remotes);
        let health = manager.health();
        if health.local_only && !health.has_remote_cache {
            warn!(
                path = %config.db_path,
                "Running in pure local mode (no cloud, no cache)"
            );
        } else {
            info!(mode = health.mode(), "Tiered store ready");
        }
        Ok(manager)
    }

    /// Which tiers survived startup.
    pub fn health(&self) -> TierHealth {
        self.health
    }

    /// The shared embedded database (key-value and full-text).
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Direct access to the embedded key-value store.
    pub fn local(&self) -> &LocalStore {
        self.local.store()
    }

    /// A full-text index over the same embedded database.
    pub fn message_index(&self) -> MessageIndex {
        MessageIndex::new(Arc::clone(&self.db))
    }

    /// Write `value` through to every active tier.
    pub async fn set(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError> {
        let mut durable = false;

        for tier in &self.tiers {
            let role = tier.role();
            match role {
                TierRole::Cache => {
                    if let Err(e) = tier.put(collection, key, value).await {
                        warn!(tier = %role, collection = %collection, key = %key, error = %e, "Cache write failed");
                    }
                }
                TierRole::Cloud => match tier.put(collection, key, value).await {
                    Ok(()) => durable = true,
                    Err(e) => warn!(
                        tier = %role, collection = %collection, key = %key, error = %e,
                        "Cloud write failed, writing to local tier"
                    ),
                },
                TierRole::Local => {
                    if !durable {
                        tier.put(collection, key, value)
                            .await
                            .map_err(|e| unavailable("write", collection, key, e))?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Read a value, returning `default` only when no tier holds the key.
    ///
    /// A stored `null` is a hit and is returned as `Value::Null`.
    pub async fn get(&self, collection: &str, key: &str, default: Value) -> Result<Value, HoardError> {
        Ok(self.fetch(collection, key).await?.unwrap_or(default))
    }

    /// Cascading lookup: `None` means no tier holds the key.
    pub async fn fetch(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError> {
        for tier in &self.tiers {
            let role = tier.role();
            match tier.fetch(collection, key).await {
                Ok(Some(value)) => {
                    if role == TierRole::Cloud {
                        self.repopulate_cache(collection, key, &value);
                    }
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(e) if role == TierRole::Local => {
                    return Err(unavailable("read", collection, key, e));
                }
                Err(e) => {
                    warn!(tier = %role, collection = %collection, key = %key, error = %e, "Read failed, trying next tier");
                }
            }
        }
        Ok(None)
    }

    /// Remove the key from every active tier.
    ///
    /// Missing keys are not an error; remote failures are logged and do
    /// not stop the remaining tiers.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<(), HoardError> {
        for tier in &self.tiers {
            let role = tier.role();
            match tier.remove(collection, key).await {
                Ok(()) => {}
                Err(e) if role == TierRole::Local => {
                    return Err(unavailable("delete", collection, key, e));
                }
                Err(e) => {
                    warn!(tier = %role, collection = %collection, key = %key, error = %e, "Delete failed");
                }
            }
        }
        Ok(())
    }

    /// Copy a cloud hit into every cache tier without blocking the read.
    fn repopulate_cache(&self, collection: &str, key: &str, value: &Value) {
        for tier in self.tiers.iter().filter(|t| t.role() == TierRole::Cache) {
            let tier = Arc::clone(tier);
            let collection = collection.to_string();
            let key = key.to_string();
            let value = value.clone();
            tokio::spawn(async move {
                if let Err(e) = tier.put(&collection, &key, &value).await {
                    debug!(collection = %collection, key = %key, error = %e, "Cache repopulation failed");
                }
            });
        }
    }
}

fn unavailable(op: &str, collection: &str, key: &str, e: HoardError) -> HoardError {
    error!(collection = %collection, key = %key, error = %e, "Local tier {} failed", op);
    HoardError::StorageUnavailable(format!("{} {}/{}: {}", op, collection, key, e))
}

#[cfg(feature = "mongo-cloud")]
async fn connect_cloud(
    uri: &str,
    database: &str,
    timeout: Duration,
) -> Result<Arc<dyn StorageTier>, HoardError> {
    let tier = crate::cloud::MongoCloud::connect(uri, database, timeout).await?;
    Ok(Arc::new(tier))
}

#[cfg(not(feature = "mongo-cloud"))]
async fn connect_cloud(
    _uri: &str,
    _database: &str,
    _timeout: Duration,
) -> Result<Arc<dyn StorageTier>, HoardError> {
    Err(HoardError::Config(
        "cloud URI set but built without the mongo-cloud feature".to_string(),
    ))
}

#[cfg(feature = "redis-cache")]
async fn connect_cache(
    url: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn StorageTier>, HoardError> {
    let tier = crate::cache::RedisCache::connect(url, password, timeout).await?;
    Ok(Arc::new(tier))
}

#[cfg(not(feature = "redis-cache"))]
async fn connect_cache(
    _url: &str,
    _password: Option<&str>,
    _timeout: Duration,
) -> Result<Arc<dyn StorageTier>, HoardError> {
    Err(HoardError::Config(
        "cache URL set but built without the redis-cache feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    type CallLog = Arc<Mutex<Vec<(TierRole, &'static str)>>>;

    /// In-process tier with switchable failures and a shared call log.
    struct FakeTier {
        role: TierRole,
        data: Mutex<HashMap<(String, String), Value>>,
        fail: AtomicBool,
        log: CallLog,
    }

    impl FakeTier {
        fn new(role: TierRole, log: &CallLog) -> Arc<Self> {
            Arc::new(Self {
                role,
                data: Mutex::new(HashMap::new()),
                fail: AtomicBool::new(false),
                log: Arc::clone(log),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn peek(&self, collection: &str, key: &str) -> Option<Value> {
            self.data
                .lock()
                .unwrap()
                .get(&(collection.to_string(), key.to_string()))
                .cloned()
        }

        fn seed(&self, collection: &str, key: &str, value: Value) {
            self.data
                .lock()
                .unwrap()
                .insert((collection.to_string(), key.to_string()), value);
        }

        fn record(&self, op: &'static str) -> Result<(), HoardError> {
            self.log.lock().unwrap().push((self.role, op));
            if self.fail.load(Ordering::SeqCst) {
                Err(HoardError::tier(self.role.as_str(), "simulated outage"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl StorageTier for FakeTier {
        fn role(&self) -> TierRole {
            self.role
        }

        async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError> {
            self.record("put")?;
            self.seed(collection, key, value.clone());
            Ok(())
        }

        async fn fetch(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError> {
            self.record("fetch")?;
            Ok(self.peek(collection, key))
        }

        async fn remove(&self, collection: &str, key: &str) -> Result<(), HoardError> {
            self.record("remove")?;
            self.data
                .lock()
                .unwrap()
                .remove(&(collection.to_string(), key.to_string()));
            Ok(())
        }
    }

    fn local_only() -> TierManager {
        TierManager::new(Arc::new(Database::in_memory().unwrap()), Vec::new())
    }

    fn full_stack() -> (TierManager, Arc<FakeTier>, Arc<FakeTier>, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let cache = FakeTier::new(TierRole::Cache, &log);
        let cloud = FakeTier::new(TierRole::Cloud, &log);
        // Deliberately passed out of order; the manager sorts by role.
        let manager = TierManager::new(
            Arc::new(Database::in_memory().unwrap()),
            vec![
                Arc::clone(&cloud) as Arc<dyn StorageTier>,
                Arc::clone(&cache) as Arc<dyn StorageTier>,
            ],
        );
        (manager, cache, cloud, log)
    }

    async fn wait_for(tier: &FakeTier, collection: &str, key: &str) -> Option<Value> {
        for _ in 0..100 {
            if let Some(v) = tier.peek(collection, key) {
                return Some(v);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_local_only_health() {
        let manager = local_only();
        let health = manager.health();
        assert!(!health.has_cloud);
        assert!(!health.has_remote_cache);
        assert!(health.local_only);
    }

    #[tokio::test]
    async fn test_set_then_get_boolean_flags() {
        let manager = local_only();
        manager.set("flags", "ghost", &json!(true)).await.unwrap();
        assert_eq!(
            manager.get("flags", "ghost", json!(false)).await.unwrap(),
            json!(true)
        );

        manager.set("flags", "ghost", &json!(false)).await.unwrap();
        // Stored false, not the default.
        assert_eq!(
            manager.get("flags", "ghost", json!("default")).await.unwrap(),
            json!(false)
        );
    }

    #[tokio::test]
    async fn test_stored_null_is_a_hit() {
        let manager = local_only();
        manager.set("settings", "nick", &Value::Null).await.unwrap();
        assert_eq!(
            manager.get("settings", "nick", json!("fallback")).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_absent_key_returns_default_verbatim() {
        let manager = local_only();
        let default = json!({"nested": [1, 2, {"x": null}]});
        assert_eq!(
            manager.get("users", "404", default.clone()).await.unwrap(),
            default
        );
    }

    #[tokio::test]
    async fn test_delete_then_get_returns_default_and_is_idempotent() {
        let manager = local_only();
        manager.set("users", "42", &json!({"banned": true})).await.unwrap();
        manager.delete("users", "42").await.unwrap();
        manager.delete("users", "42").await.unwrap();
        assert_eq!(
            manager.get("users", "42", Value::Null).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_write_order_cache_then_cloud_and_local_skipped() {
        let (manager, cache, cloud, log) = full_stack();
        manager.set("flags", "ghost", &json!(true)).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![(TierRole::Cache, "put"), (TierRole::Cloud, "put")]
        );
        assert_eq!(cache.peek("flags", "ghost"), Some(json!(true)));
        assert_eq!(cloud.peek("flags", "ghost"), Some(json!(true)));
        // Cloud succeeded, so the local tier was not written.
        assert_eq!(manager.local().get("flags", "ghost").unwrap(), None);
    }

    #[tokio::test]
    async fn test_cloud_write_failure_falls_back_to_local() {
        let (manager, cache, cloud, _log) = full_stack();
        cloud.set_failing(true);

        manager.set("users", "7", &json!({"afk": true})).await.unwrap();

        assert_eq!(cache.peek("users", "7"), Some(json!({"afk": true})));
        assert_eq!(
            manager.local().get("users", "7").unwrap(),
            Some(json!({"afk": true}))
        );
    }

    #[tokio::test]
    async fn test_cache_failure_is_not_fatal_and_not_a_fallback() {
        let (manager, cache, cloud, _log) = full_stack();
        cache.set_failing(true);

        manager.set("flags", "x", &json!(1)).await.unwrap();
        assert_eq!(cloud.peek("flags", "x"), Some(json!(1)));
        assert_eq!(manager.local().get("flags", "x").unwrap(), None);

        // Reads skip the broken cache and still find the cloud copy.
        assert_eq!(manager.get("flags", "x", json!(0)).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_read_cascade_stops_at_first_hit() {
        let (manager, cache, cloud, log) = full_stack();
        cache.seed("c", "k", json!("from-cache"));
        cloud.seed("c", "k", json!("from-cloud"));

        assert_eq!(manager.get("c", "k", Value::Null).await.unwrap(), json!("from-cache"));
        assert_eq!(*log.lock().unwrap(), vec![(TierRole::Cache, "fetch")]);
    }

    #[tokio::test]
    async fn test_cloud_hit_repopulates_cache() {
        let (manager, cache, cloud, _log) = full_stack();
        cloud.seed("users", "1", json!({"name": "a"}));

        let value = manager.get("users", "1", Value::Null).await.unwrap();
        assert_eq!(value, json!({"name": "a"}));
        assert_eq!(wait_for(&cache, "users", "1").await, Some(json!({"name": "a"})));
    }

    #[tokio::test]
    async fn test_cache_repopulation_failure_is_swallowed() {
        let (manager, cache, cloud, _log) = full_stack();
        cloud.seed("users", "1", json!(5));
        cache.set_failing(true);

        assert_eq!(manager.get("users", "1", Value::Null).await.unwrap(), json!(5));
    }

    #[tokio::test]
    async fn test_cloud_read_failure_falls_back_to_local() {
        let (manager, _cache, cloud, _log) = full_stack();
        manager.local().upsert("flags", "ghost", &json!(true)).unwrap();
        cloud.set_failing(true);

        assert_eq!(
            manager.get("flags", "ghost", json!(false)).await.unwrap(),
            json!(true)
        );
    }

    #[tokio::test]
    async fn test_cloud_miss_falls_through_to_local() {
        let (manager, _cache, _cloud, _log) = full_stack();
        manager.local().upsert("flags", "old", &json!("written during outage")).unwrap();
        assert_eq!(
            manager.get("flags", "old", Value::Null).await.unwrap(),
            json!("written during outage")
        );
    }

    #[tokio::test]
    async fn test_delete_reaches_every_tier_despite_failures() {
        let (manager, cache, cloud, log) = full_stack();
        cache.seed("c", "k", json!(1));
        cloud.seed("c", "k", json!(1));
        manager.local().upsert("c", "k", &json!(1)).unwrap();
        cache.set_failing(true);

        manager.delete("c", "k").await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![(TierRole::Cache, "remove"), (TierRole::Cloud, "remove")]
        );
        assert_eq!(cloud.peek("c", "k"), None);
        assert_eq!(manager.local().get("c", "k").unwrap(), None);
    }

    #[tokio::test]
    async fn test_all_remote_tiers_down_still_serves_local() {
        let (manager, cache, cloud, _log) = full_stack();
        cache.set_failing(true);
        cloud.set_failing(true);

        manager.set("users", "42", &json!({"banned": true})).await.unwrap();
        assert_eq!(
            manager.get("users", "42", Value::Null).await.unwrap(),
            json!({"banned": true})
        );
        manager.delete("users", "42").await.unwrap();
        assert_eq!(manager.get("users", "42", json!("gone")).await.unwrap(), json!("gone"));
    }

    #[tokio::test]
    async fn test_local_failure_surfaces_as_storage_unavailable() {
        let manager = local_only();
        manager
            .database()
            .with_conn(|conn| {
                conn.execute_batch("DROP TABLE kv_store;")
                    .map_err(|e| HoardError::Storage(e.to_string()))
            })
            .unwrap();

        let err = manager.set("flags", "ghost", &json!(true)).await.unwrap_err();
        assert!(matches!(err, HoardError::StorageUnavailable(_)));
        let err = manager.get("flags", "ghost", json!(false)).await.unwrap_err();
        assert!(matches!(err, HoardError::StorageUnavailable(_)));
        let err = manager.delete("flags", "ghost").await.unwrap_err();
        assert!(matches!(err, HoardError::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn test_health_reflects_remote_tiers() {
        let (manager, _cache, _cloud, _log) = full_stack();
        let health = manager.health();
        assert!(health.has_cloud);
        assert!(health.has_remote_cache);
        assert!(!health.local_only);
    }

    #[tokio::test]
    async fn test_bootstrap_without_remote_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("boot.db").to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        let manager = TierManager::bootstrap(&config).await.unwrap();
        assert_eq!(manager.health(), TierHealth::new(false, false));
    }

    #[tokio::test]
    async fn test_bootstrap_unreachable_remote_tiers_degrade() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("boot.db").to_string_lossy().to_string(),
            cloud_uri: Some("not-a-mongo-uri".to_string()),
            cache_url: Some("not a redis url".to_string()),
            probe_timeout_ms: 200,
            ..StorageConfig::default()
        };
        let manager = TierManager::bootstrap(&config).await.unwrap();
        assert!(manager.health().local_only);
        assert!(!manager.health().has_remote_cache);

        manager.set("flags", "ghost", &json!(true)).await.unwrap();
        assert_eq!(manager.get("flags", "ghost", json!(false)).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn test_bootstrap_fails_when_local_cannot_open() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the database file should be.
        let config = StorageConfig {
            db_path: dir.path().to_string_lossy().to_string(),
            ..StorageConfig::default()
        };
        assert!(TierManager::bootstrap(&config).await.is_err());
    }
}
