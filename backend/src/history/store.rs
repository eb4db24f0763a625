//! Persistence port for the history ledger

use crate::db::KeyValueStore;
use crate::error::StorageError;
use crate::history::HistoryEntry;
use std::sync::Arc;

/// Fixed key the whole ledger is stored under
pub const HISTORY_KEY: &str = "downloadHistory";

/// Where the ledger is read from at startup and written to after each batch
pub trait HistoryStore: Send + Sync {
    fn load(&self) -> Result<Vec<HistoryEntry>, StorageError>;
    fn save(&self, entries: &[HistoryEntry]) -> Result<(), StorageError>;
}

/// Stores the ledger as one JSON document in a key-value store
pub struct KvHistoryStore {
    kv: Arc<dyn KeyValueStore>,
}

impl KvHistoryStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

impl HistoryStore for KvHistoryStore {
    fn load(&self) -> Result<Vec<HistoryEntry>, StorageError> {
        match self.kv.get(HISTORY_KEY)? {
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(entries)?;
        self.kv.set(HISTORY_KEY, &raw)
    }
}
