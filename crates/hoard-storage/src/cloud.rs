//! MongoDB-backed cloud document tier.
//!
//! Each store collection maps to a Mongo collection of the same name;
//! each key is one document `{ _id: key, data: value }`.

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde_json::Value;
use tracing::info;

use hoard_core::error::HoardError;
use hoard_core::types::TierRole;

use crate::tier::StorageTier;

const TIER: &str = "cloud";
const DATA_FIELD: &str = "data";

/// Cloud document tier.
pub struct MongoCloud {
    db: mongodb::Database,
}

impl MongoCloud {
    /// Connect and ping the deployment, giving up after `timeout`.
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self, HoardError> {
        let probe = async {
            let mut options = ClientOptions::parse(uri).await?;
            options.server_selection_timeout = Some(timeout);
            options.connect_timeout = Some(timeout);
            let client = Client::with_options(options)?;
            client.database("admin").run_command(doc! { "ping": 1 }).await?;
            Ok::<_, mongodb::error::Error>(client)
        };

        let client = tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| HoardError::tier(TIER, format!("probe timed out after {:?}", timeout)))?
            .map_err(|e| HoardError::tier(TIER, e))?;

        info!(database = %database, "Cloud tier (MongoDB) connected");
        Ok(Self {
            db: client.database(database),
        })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl StorageTier for MongoCloud {
    fn role(&self) -> TierRole {
        TierRole::Cloud
    }

    async fn put(&self, collection: &str, key: &str, value: &Value) -> Result<(), HoardError> {
        let data = mongodb::bson::to_bson(value)
            .map_err(|e| HoardError::Serialization(e.to_string()))?;
        self.collection(collection)
            .update_one(doc! { "_id": key }, doc! { "$set": { "data": data } })
            .upsert(true)
            .await
            .map_err(|e| HoardError::tier(TIER, e))?;
        Ok(())
    }

    async fn fetch(&self, collection: &str, key: &str) -> Result<Option<Value>, HoardError> {
        let found = self
            .collection(collection)
            .find_one(doc! { "_id": key })
            .await
            .map_err(|e| HoardError::tier(TIER, e))?;

        // A document without a data field was not written by this tier; treat it as a miss.
        Ok(found
            .and_then(|document| document.get(DATA_FIELD).cloned())
            .map(|data| data.into_relaxed_extjson()))
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<(), HoardError> {
        self.collection(collection)
            .delete_one(doc! { "_id": key })
            .await
            .map_err(|e| HoardError::tier(TIER, e))?;
        Ok(())
    }
}
