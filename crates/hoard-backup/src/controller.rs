//! Off-site backup controller.
//!
//! Two independent flows over the local database file:
//! - restore, run once before the store opens the file, pulls the newest
//!   tagged snapshot when no valid local file exists;
//! - the backup loop uploads a snapshot every interval until shut down.
//!
//! Neither flow is ever fatal to the process.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hoard_core::config::BackupConfig;
use hoard_core::error::HoardError;
use hoard_storage::Database;

use crate::channel::{BackupChannel, ChannelDocument};

/// What a restore attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// A valid local file was already present; the channel was not queried.
    LocalValid,
    /// A snapshot was downloaded into place.
    Restored {
        document_id: String,
        posted_at: DateTime<Utc>,
    },
    /// No matching snapshot exists; the store starts empty.
    NoBackup,
    /// Search or download failed; treated like `NoBackup`.
    Failed(String),
}

pub struct BackupController {
    channel: Arc<dyn BackupChannel>,
    db_path: PathBuf,
    config: BackupConfig,
    database: Option<Arc<Database>>,
    shutdown: Notify,
}

impl BackupController {
    pub fn new(channel: Arc<dyn BackupChannel>, db_path: impl Into<PathBuf>, config: BackupConfig) -> Self {
        Self {
            channel,
            db_path: db_path.into(),
            config,
            database: None,
            shutdown: Notify::new(),
        }
    }

    /// Snapshot through the open database instead of copying the raw file.
    ///
    /// Needed once the store is live, since the raw file alone misses
    /// anything still sitting in the WAL.
    pub fn with_database(mut self, database: Arc<Database>) -> Self {
        self.database = Some(database);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// True when the local file exists and is larger than an empty stub.
    ///
    /// Committed pages still in the `-wal` file count toward the size: after
    /// an unclean stop the main file can be a bare header while the WAL
    /// holds every write since the last checkpoint.
    pub fn has_valid_local_file(&self) -> bool {
        let Some(main) = file_len(&self.db_path) else {
            return false;
        };
        let wal = file_len(&sibling(&self.db_path, "-wal")).unwrap_or(0);
        main + wal > self.config.min_valid_size_bytes
    }

    /// Restore the newest tagged snapshot if the local file is missing or a stub.
    ///
    /// Must run before the local tier opens the file.
    pub async fn restore(&self) -> RestoreOutcome {
        if self.has_valid_local_file() {
            info!(path = %self.db_path.display(), "Local database found and valid, skipping restore");
            return RestoreOutcome::LocalValid;
        }

        info!(tag = %self.config.tag, "Checking backup channel for a snapshot");
        match self.try_restore().await {
            Ok(Some(document)) => {
                info!(id = %document.id, posted_at = %document.posted_at, "Database restored");
                RestoreOutcome::Restored {
                    document_id: document.id,
                    posted_at: document.posted_at,
                }
            }
            Ok(None) => {
                info!("No backup found, starting fresh");
                RestoreOutcome::NoBackup
            }
            Err(e) => {
                error!(error = %e, "Restore failed, starting fresh");
                RestoreOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_restore(&self) -> Result<Option<ChannelDocument>, HoardError> {
        let file_name = self.file_name()?;
        let documents = self
            .channel
            .search_documents(&self.config.tag, self.config.search_limit)
            .await?;

        let Some(document) = documents.into_iter().find(|d| d.file_name == file_name) else {
            return Ok(None);
        };
        debug!(id = %document.id, posted_at = %document.posted_at, "Found snapshot, downloading");

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let staging = sibling(&self.db_path, ".restore");
        if let Err(e) = self.channel.download(&document, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }

        // A leftover WAL from the stub would be replayed over the snapshot.
        for suffix in ["-wal", "-shm"] {
            remove_if_exists(&sibling(&self.db_path, suffix)).await?;
        }
        tokio::fs::rename(&staging, &self.db_path).await?;

        Ok(Some(document))
    }

    /// Upload one snapshot now.
    ///
    /// Returns `Ok(None)` when there is no local file yet.
    pub async fn backup_now(&self) -> Result<Option<ChannelDocument>, HoardError> {
        if !self.db_path.exists() {
            debug!(path = %self.db_path.display(), "No local database, nothing to back up");
            return Ok(None);
        }

        let caption = self.caption(Utc::now().timestamp());
        let document = match &self.database {
            Some(database) => self.upload_snapshot(Arc::clone(database), &caption).await?,
            None => self.channel.upload(&self.db_path, &caption).await?,
        };

        info!(id = %document.id, size_bytes = document.size_bytes, "Backup uploaded");
        Ok(Some(document))
    }

    async fn upload_snapshot(
        &self,
        database: Arc<Database>,
        caption: &str,
    ) -> Result<ChannelDocument, HoardError> {
        let scratch = sibling(&self.db_path, &format!(".snapshot-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&scratch).await?;
        // Same file name as the live database so restore can match on it.
        let copy = scratch.join(self.file_name()?);

        let target = copy.clone();
        let snapshot = tokio::task::spawn_blocking(move || database.snapshot_to(&target))
            .await
            .map_err(|e| HoardError::Backup(format!("snapshot task failed: {}", e)));

        let result = match snapshot {
            Ok(Ok(())) => self.channel.upload(&copy, caption).await,
            Ok(Err(e)) | Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!(path = %scratch.display(), error = %e, "Failed to clean up snapshot directory");
        }
        result
    }

    /// Back up every interval until [`shutdown`](Self::shutdown) is called.
    ///
    /// Failures are logged and the loop waits for the next interval.
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        info!(interval_secs = interval.as_secs(), "Backup loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.notified() => break,
            }
            if let Err(e) = self.backup_now().await {
                error!(error = %e, "Backup failed");
            }
        }

        info!("Backup loop stopped");
    }

    /// Stop the backup loop. Safe to call before the loop starts.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn caption(&self, unix_secs: i64) -> String {
        format!("{}\nTimestamp: {}\nAuto-Backup", self.config.tag, unix_secs)
    }

    fn file_name(&self) -> Result<String, HoardError> {
        self.db_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                HoardError::Backup(format!("no file name in {}", self.db_path.display()))
            })
    }
}

/// `path` with `suffix` appended to its final component.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

async fn remove_if_exists(path: &Path) -> Result<(), HoardError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
