use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HoardError, Result};

/// Top-level configuration for hoard.
///
/// Every section is optional; a missing file or section falls back to
/// defaults, and only the local database path has a meaningful default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoardConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

impl HoardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HoardConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HoardError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Storage tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the embedded SQLite file.
    pub db_path: String,
    /// MongoDB connection string. Unset means no cloud tier.
    pub cloud_uri: Option<String>,
    /// Database name used on the cloud tier.
    pub cloud_database: String,
    /// Redis URL. Unset means no cache tier.
    pub cache_url: Option<String>,
    /// Redis password, applied on top of the URL.
    pub cache_password: Option<String>,
    /// Timeout for the one-shot startup probe of each remote tier.
    pub probe_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "hoard.db".to_string(),
            cloud_uri: None,
            cloud_database: "hoard".to_string(),
            cache_url: None,
            cache_password: None,
            probe_timeout_ms: 2000,
        }
    }
}

/// Full-text search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result limit when the caller does not pass one.
    pub default_limit: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

/// Off-site backup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Whether the periodic backup loop runs.
    pub enabled: bool,
    /// Tag embedded in every snapshot caption and used to find them again.
    pub tag: String,
    /// Seconds between snapshots.
    pub interval_secs: u64,
    /// A local file at or below this size is treated as an empty stub.
    pub min_valid_size_bytes: u64,
    /// How many tagged documents to inspect when restoring.
    pub search_limit: usize,
    /// Directory used by the directory-backed backup channel.
    pub channel_dir: Option<String>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tag: "#BACKUP_HOARD".to_string(),
            interval_secs: 3600,
            min_valid_size_bytes: 16 * 1024,
            search_limit: 5,
            channel_dir: None,
        }
    }
}

/// Treat empty and whitespace-only strings as unset.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
