//! Embedded database connection management.
//!
//! Wraps the single process-wide rusqlite Connection in a Mutex. Key-value
//! and full-text statements share this one gate, so no two statements ever
//! interleave on the connection.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use hoard_core::error::HoardError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
///
/// Uses WAL mode so file-level readers and writers do not block each
/// other. The connection is wrapped in a Mutex since rusqlite Connection
/// is not Sync.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode and synchronous=NORMAL, then ensures the schema
    /// exists.
    pub fn new(path: &Path) -> Result<Self, HoardError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| HoardError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| HoardError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, HoardError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| HoardError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// On-disk location, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, HoardError>
    where
        F: FnOnce(&Connection) -> Result<T, HoardError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| HoardError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Write a consistent copy of the whole database to `dest`.
    ///
    /// Runs `VACUUM INTO` under the connection gate, so the copy contains
    /// every committed write (including those still in the WAL) and no
    /// half-applied statement. An existing file at `dest` is replaced.
    pub fn snapshot_to(&self, dest: &Path) -> Result<(), HoardError> {
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        let target = dest.to_string_lossy().to_string();
        self.with_conn(|conn| {
            conn.execute("VACUUM INTO ?1", rusqlite::params![target])
                .map_err(|e| HoardError::Storage(format!("Snapshot failed: {}", e)))?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
