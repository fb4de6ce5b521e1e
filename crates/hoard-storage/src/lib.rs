//! hoard storage crate: embedded SQLite tier, full-text message index,
//! remote cache and cloud tiers, and the tier manager that ties them
//! together behind one `set` / `get` / `delete` API.

#[cfg(feature = "redis-cache")]
pub mod cache;
#[cfg(feature = "mongo-cloud")]
pub mod cloud;
pub mod db;
pub mod ingest;
pub mod kv;
pub mod manager;
pub mod migrations;
pub mod search;
pub mod tier;

#[cfg(feature = "redis-cache")]
pub use cache::RedisCache;
#[cfg(feature = "mongo-cloud")]
pub use cloud::MongoCloud;
pub use db::Database;
pub use ingest::IngestHook;
pub use kv::LocalStore;
pub use manager::TierManager;
pub use search::{sanitize_fts5_query, MessageIndex};
pub use tier::{LocalTier, StorageTier};
