//! CLI argument definitions for the hoard binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hoard_core::config::{non_empty, HoardConfig};

/// hoard: tiered key-value persistence and message search for a chat agent.
#[derive(Parser, Debug)]
#[command(name = "hoard", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Path of the embedded database file.
    #[arg(short = 'd', long = "db-path")]
    pub db_path: Option<PathBuf>,

    /// MongoDB connection string for the cloud tier.
    #[arg(long = "cloud-uri")]
    pub cloud_uri: Option<String>,

    /// Redis URL for the cache tier.
    #[arg(long = "cache-url")]
    pub cache_url: Option<String>,

    /// Directory used as the off-site backup channel.
    #[arg(long = "backup-dir")]
    pub backup_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Restore if needed, start the backup loop and index messages read
    /// from stdin as newline-delimited JSON.
    Run,
    /// Print the value stored under a key.
    Get { collection: String, key: String },
    /// Store a value. Input that is not valid JSON is stored as a string.
    Set {
        collection: String,
        key: String,
        value: String,
    },
    /// Remove a key from every tier.
    Delete { collection: String, key: String },
    /// Full-text search over indexed messages.
    Search {
        query: String,
        #[arg(short = 'n', long = "limit")]
        limit: Option<u64>,
        /// Pass the query to FTS5 unmodified.
        #[arg(long = "raw")]
        raw: bool,
    },
    /// Delete every indexed message.
    WipeIndex,
    /// Upload a snapshot now.
    Backup,
    /// Restore the newest snapshot if no valid local database exists.
    Restore,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HOARD_CONFIG env var > ~/.hoard/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = non_empty(std::env::var("HOARD_CONFIG").ok()) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Layer CLI flags and `HOARD_*` environment variables over the file config.
    pub fn apply_overrides(&self, config: &mut HoardConfig) {
        self.apply_overrides_from(config, |name| std::env::var(name).ok());
    }

    fn apply_overrides_from<F>(&self, config: &mut HoardConfig, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| non_empty(env(name));
        let path_flag = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().to_string());

        if let Some(path) = path_flag(&self.db_path).or_else(|| env("HOARD_DB_PATH")) {
            config.storage.db_path = path;
        }
        if let Some(uri) = non_empty(self.cloud_uri.clone()).or_else(|| env("HOARD_CLOUD_URI")) {
            config.storage.cloud_uri = Some(uri);
        }
        if let Some(url) = non_empty(self.cache_url.clone()).or_else(|| env("HOARD_CACHE_URL")) {
            config.storage.cache_url = Some(url);
        }
        // Credentials come from the environment only, never argv.
        if let Some(password) = env("HOARD_CACHE_PASSWORD") {
            config.storage.cache_password = Some(password);
        }
        if let Some(dir) = path_flag(&self.backup_dir).or_else(|| env("HOARD_BACKUP_DIR")) {
            config.backup.channel_dir = Some(dir);
        }
        if let Some(level) = non_empty(self.log_level.clone()) {
            config.general.log_level = level;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".hoard").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".hoard").join("config.toml");
    }
    PathBuf::from("config.toml")
}
