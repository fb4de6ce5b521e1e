//! Off-site backup channel boundary.
//!
//! A channel is any durable place the agent controls that can hold
//! captioned file attachments and search them by caption text, such as the
//! agent's own saved-messages history on a messaging service. The
//! transport that talks to such a service lives outside this crate and
//! plugs in through [`BackupChannel`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use hoard_core::error::HoardError;

/// A captioned attachment held by a backup channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDocument {
    /// Channel-assigned identifier.
    pub id: String,
    /// Attachment file name.
    pub file_name: String,
    pub caption: String,
    pub posted_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Captioned-attachment storage used for snapshots.
#[async_trait]
pub trait BackupChannel: Send + Sync {
    /// Documents whose caption contains `tag`, newest first, at most `limit`.
    async fn search_documents(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<ChannelDocument>, HoardError>;

    /// Fetch an attachment into `dest`.
    async fn download(&self, document: &ChannelDocument, dest: &Path) -> Result<(), HoardError>;

    /// Post a local file as a captioned attachment.
    async fn upload(&self, source: &Path, caption: &str) -> Result<ChannelDocument, HoardError>;
}

/// Channel backed by a plain directory (a mounted or synced off-site volume).
///
/// Each upload becomes `<id>.blob` plus a `<id>.json` sidecar holding the
/// [`ChannelDocument`].
pub struct DirectoryChannel {
    dir: PathBuf,
}

impl DirectoryChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn blob_path(&self, id: &str) -> Result<PathBuf, HoardError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(HoardError::Backup(format!("invalid document id: {:?}", id)));
        }
        Ok(self.dir.join(format!("{}.blob", id)))
    }
}

#[async_trait]
impl BackupChannel for DirectoryChannel {
    async fn search_documents(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<ChannelDocument>, HoardError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable sidecar");
                    continue;
                }
            };
            match serde_json::from_slice::<ChannelDocument>(&raw) {
                Ok(doc) if doc.caption.contains(tag) => documents.push(doc),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable sidecar"),
            }
        }

        documents.sort_by(|a, b| b.posted_at.cmp(&a.posted_at).then_with(|| b.id.cmp(&a.id)));
        documents.truncate(limit);
        Ok(documents)
    }

    async fn download(&self, document: &ChannelDocument, dest: &Path) -> Result<(), HoardError> {
        let blob = self.blob_path(&document.id)?;
        tokio::fs::copy(&blob, dest).await.map_err(|e| {
            HoardError::Backup(format!("download of {} failed: {}", document.id, e))
        })?;
        debug!(id = %document.id, dest = %dest.display(), "Document downloaded");
        Ok(())
    }

    async fn upload(&self, source: &Path, caption: &str) -> Result<ChannelDocument, HoardError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| HoardError::Backup(format!("no file name in {}", source.display())))?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let posted_at = Utc::now();
        let id = format!(
            "{}-{}",
            posted_at.format("%Y%m%dT%H%M%S%.6fZ"),
            Uuid::new_v4().simple()
        );
        let size_bytes = tokio::fs::copy(source, self.blob_path(&id)?).await?;

        let document = ChannelDocument {
            id: id.clone(),
            file_name,
            caption: caption.to_string(),
            posted_at,
            size_bytes,
        };
        let sidecar = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(self.dir.join(format!("{}.json", id)), sidecar).await?;

        debug!(id = %id, size_bytes, "Document uploaded");
        Ok(document)
    }
}
