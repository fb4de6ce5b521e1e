use thiserror::Error;

/// Top-level error type for the hoard storage engine.
///
/// Storage API callers only ever see `StorageUnavailable` (every tier
/// failed on the final fallback path). `Tier` errors describe a remote
/// tier that is degraded for one call; the tier manager logs and absorbs
/// them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HoardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("{tier} tier error: {message}")]
    Tier { tier: &'static str, message: String },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HoardError {
    /// Shorthand for a remote tier failure.
    pub fn tier(tier: &'static str, message: impl std::fmt::Display) -> Self {
        HoardError::Tier {
            tier,
            message: message.to_string(),
        }
    }
}

impl From<toml::de::Error> for HoardError {
    fn from(err: toml::de::Error) -> Self {
        HoardError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for HoardError {
    fn from(err: toml::ser::Error) -> Self {
        HoardError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for HoardError {
    fn from(err: serde_json::Error) -> Self {
        HoardError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for hoard operations.
pub type Result<T> = std::result::Result<T, HoardError>;
