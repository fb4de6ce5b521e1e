//! Message ingestion hook.
//!
//! The transport calls [`IngestHook::observe`] for every message it sees.
//! `observe` never waits: records go onto a bounded queue drained by one
//! background worker, and anything that goes wrong (full queue, index
//! error) is logged at debug level and dropped.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;

use hoard_core::types::MessageRecord;

use crate::search::MessageIndex;

/// Default queue depth between the transport and the index worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Non-blocking entry point into the full-text index.
#[derive(Clone)]
pub struct IngestHook {
    tx: mpsc::Sender<MessageRecord>,
}

impl IngestHook {
    /// Start the index worker.
    ///
    /// The worker exits once every clone of the hook is dropped; its join
    /// handle yields the number of messages it indexed.
    pub fn spawn(index: Arc<MessageIndex>, capacity: usize) -> (Self, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::channel::<MessageRecord>(capacity.max(1));

        let worker = tokio::spawn(async move {
            let mut indexed = 0u64;
            while let Some(record) = rx.recv().await {
                match index.ingest(&record) {
                    Ok(true) => indexed += 1,
                    Ok(false) => {}
                    Err(e) => debug!(
                        message_id = record.message_id,
                        chat_id = record.chat_id,
                        error = %e,
                        "Message indexing failed"
                    ),
                }
            }
            debug!(indexed, "Ingest worker stopped");
            indexed
        });

        (Self { tx }, worker)
    }

    /// Hand a message to the index. Returns whether it was queued.
    pub fn observe(&self, record: MessageRecord) -> bool {
        if record.text.trim().is_empty() {
            return false;
        }
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                debug!(message_id = record.message_id, "Ingest queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Ingest worker gone, dropping message");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn msg(message_id: i64, text: &str) -> MessageRecord {
        MessageRecord {
            message_id,
            chat_id: 100,
            text: text.to_string(),
            timestamp: 1_700_000_000.0,
            sender_id: 7,
        }
    }

    #[tokio::test]
    async fn test_observed_messages_are_indexed() {
        let index = Arc::new(MessageIndex::new(Arc::new(Database::in_memory().unwrap())));
        let (hook, worker) = IngestHook::spawn(Arc::clone(&index), 16);

        assert!(hook.observe(msg(1, "the secret key is 42")));
        assert!(hook.observe(msg(1, "the secret key is 99")));
        assert!(!hook.observe(msg(2, "")));
        drop(hook);

        assert_eq!(worker.await.unwrap(), 2);
        assert!(index.search("42", 10).unwrap().is_empty());
        assert_eq!(index.search("99", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_index_errors_are_swallowed() {
        let db = Arc::new(Database::in_memory().unwrap());
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE fts_messages;")
                .map_err(|e| hoard_core::HoardError::Storage(e.to_string()))
        })
        .unwrap();
        let index = Arc::new(MessageIndex::new(db));
        let (hook, worker) = IngestHook::spawn(index, 4);

        assert!(hook.observe(msg(1, "goes nowhere")));
        drop(hook);
        assert_eq!(worker.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel::<MessageRecord>(1);
        let hook = IngestHook { tx };

        assert!(hook.observe(msg(1, "first")));
        // Nobody drains the queue, so the second send must not wait.
        assert!(!hook.observe(msg(2, "second")));
    }
}
