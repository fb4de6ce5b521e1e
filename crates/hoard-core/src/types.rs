use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Storage tiers
// =============================================================================

/// Role a storage tier plays in the fallback order.
///
/// The derived ordering is the fixed visiting order for every read,
/// write and delete: cache first, then cloud, then local.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierRole {
    /// Networked key-value cache. Accelerator only, never authoritative.
    Cache,
    /// Networked document store. Authoritative when reachable.
    Cloud,
    /// Embedded on-disk store. Always present, last resort.
    Local,
}

impl TierRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierRole::Cache => "cache",
            TierRole::Cloud => "cloud",
            TierRole::Local => "local",
        }
    }
}

impl fmt::Display for TierRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier availability decided once at startup.
///
/// Produced by the tier manager's bootstrap and never mutated afterwards;
/// a tier that failed its probe stays out for the process lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierHealth {
    pub has_remote_cache: bool,
    pub has_cloud: bool,
    pub local_only: bool,
}

impl TierHealth {
    pub fn new(has_remote_cache: bool, has_cloud: bool) -> Self {
        Self {
            has_remote_cache,
            has_cloud,
            local_only: !has_cloud,
        }
    }

    /// Human-readable operating mode for the startup summary log line.
    pub fn mode(&self) -> &'static str {
        match (self.has_cloud, self.has_remote_cache) {
            (true, true) => "cloud + cache + local fallback",
            (true, false) => "cloud + local fallback",
            (false, true) => "cache + local",
            (false, false) => "pure local",
        }
    }
}

// =============================================================================
// Message index
// =============================================================================

/// One observed conversation message as stored in the full-text index.
///
/// `(message_id, chat_id)` is the identity; re-ingesting the same pair
/// replaces the previous text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub message_id: i64,
    pub chat_id: i64,
    pub text: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Zero when the sender is unknown.
    #[serde(default)]
    pub sender_id: i64,
}

/// A full-text search hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub record: MessageRecord,
    /// Relevance score, higher is more relevant.
    pub score: f64,
}
