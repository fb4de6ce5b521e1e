//! Redis-backed remote cache tier.
//!
//! Values are stored as JSON text under `collection:key`. The cache is an
//! accelerator only: the tier manager never treats its failures as data
//! loss.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo};
use serde_json::Value;
use tracing::info;

use hoard_core::error::HoardError;
use hoard_core::types::TierRole;

use crate::tier::{cache_key, StorageTier};

const TIER: &str = "cache";

/// Remote cache tier over a multiplexed Redis connection.
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connect and PING, giving up after `timeout`.
    ///
    /// `password`, when set, overrides any password embedded in the URL.
    pub async fn connect(
        url: &str,
        password: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, HoardError> {
        let mut info = url
            .into_connection_info()
            .map_err(|e| HoardError::tier(TIER, format!("invalid URL: {}", e)))?;
        if let Some(password) = password {
            info.redis.password = Some(password.to_string());
        }
        let client = redis::Client::open(info).map_err(|e| HoardError::tier(TIER, e))?;

        let probe = async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(conn)
        };

        let conn = tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| HoardError::tier(TIER, format!("probe timed out after {:?}", timeout)))?
            .map_err(|e| HoardError::tier(TIER, e))?;

        info!("Cache tier (Redis) connected");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageTier for RedisCache {
    fn role(&self) -> TierRole {
        TierRole::Cache
    }

    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError> {
        let text = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(cache_key(collection, key), text)
            .await
            .map_err(|e| HoardError::tier(TIER, e))?;
        Ok(())
    }

    async fn fetch(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError> {
        let mut conn = self.conn.clone();
        let text: Option<String> = conn
            .get(cache_key(collection, key))
            .await
            .map_err(|e| HoardError::tier(TIER, e))?;
        match text {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<(), HoardError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(cache_key(collection, key))
            .await
            .map_err(|e| HoardError::tier(TIER, e))?;
        Ok(())
    }
}
