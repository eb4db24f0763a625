//! Bounded, persisted log of completed downloads

mod store;

pub use store::{HistoryStore, KvHistoryStore, HISTORY_KEY};

use crate::error::StorageError;
use crate::task::Task;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Immutable snapshot of a task at the time its batch completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub completed_at_epoch_millis: i64,
    pub task: Task,
}

/// Newest-first list of completed tasks, trimmed to `limit` after every append.
///
/// Storage is touched only in [`HistoryLedger::load`] and after each batch
/// append.
pub struct HistoryLedger {
    limit: usize,
    entries: Vec<HistoryEntry>,
    store: Arc<dyn HistoryStore>,
}

impl HistoryLedger {
    /// Read the persisted ledger. Unreadable history is treated as empty.
    pub fn load(store: Arc<dyn HistoryStore>, limit: usize) -> Self {
        let mut entries = match store.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Discarding unreadable download history: {}", e);
                Vec::new()
            }
        };
        entries.truncate(limit);
        info!("Loaded {} history entries", entries.len());

        Self {
            limit,
            entries,
            store,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    /// Record a completed batch and persist the trimmed ledger.
    ///
    /// The batch keeps its own order at the head of the ledger; the oldest
    /// entries beyond `limit` are dropped. The in-memory ledger is updated
    /// even when persisting fails.
    pub fn append_batch(
        &mut self,
        tasks: &[Task],
        completed_at_epoch_millis: i64,
    ) -> Result<(), StorageError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let mut next: Vec<HistoryEntry> = tasks
            .iter()
            .map(|task| HistoryEntry {
                completed_at_epoch_millis,
                task: task.clone(),
            })
            .collect();
        next.extend(self.entries.drain(..));
        next.truncate(self.limit);
        self.entries = next;

        self.store.save(&self.entries)?;
        info!("History now holds {} entries", self.entries.len());
        Ok(())
    }

    /// A brand-new task copied from the entry at `index`.
    /// The ledger itself is not changed.
    pub fn redownload(&self, index: usize) -> Option<Task> {
        self.entries.get(index).map(|entry| entry.task.fresh_copy())
    }
}
