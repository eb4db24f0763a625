//! Ordered, capacity-bounded collection of live tasks

use crate::error::QueueError;
use crate::task::{ProgressSnapshot, Task, TaskId, TaskPatch};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Immutable view of the store at one version
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub version: u64,
    pub tasks: Arc<[Task]>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }
}

/// Live task collection.
///
/// Insertion order is display order. Every successful mutation publishes a
/// new snapshot with a bumped version; records inside an older snapshot are
/// never touched, so readers holding one keep a consistent view.
pub struct TaskStore {
    capacity: usize,
    tx: watch::Sender<StoreSnapshot>,
}

impl TaskStore {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = watch::channel(StoreSnapshot {
            version: 0,
            tasks: Arc::from(Vec::new()),
        });
        Self { capacity, tx }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to new versions of the store
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.tx.borrow().clone()
    }

    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots left before the store is full, computed on each call
    pub fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.len())
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tx.borrow().get(id).cloned()
    }

    /// Append one default task per URL, all or nothing.
    ///
    /// An empty batch is a no-op that returns no ids.
    pub fn add_tasks<I, S>(&self, urls: I) -> Result<Vec<TaskId>, QueueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks: Vec<Task> = urls.into_iter().map(Task::new).collect();
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_all(tasks)
    }

    /// Append a prepared task (used by redownload), capacity-checked
    pub fn insert(&self, task: Task) -> Result<TaskId, QueueError> {
        let mut ids = self.insert_all(vec![task])?;
        ids.pop().ok_or(QueueError::EmptyBatch)
    }

    fn insert_all(&self, tasks: Vec<Task>) -> Result<Vec<TaskId>, QueueError> {
        let requested = tasks.len();
        let mut outcome = Err(QueueError::EmptyBatch);

        self.tx.send_if_modified(|snapshot| {
            let remaining = self.capacity.saturating_sub(snapshot.len());
            if requested > remaining {
                outcome = Err(QueueError::CapacityExceeded {
                    requested,
                    remaining,
                });
                return false;
            }

            let ids: Vec<TaskId> = tasks.iter().map(|task| task.id.clone()).collect();
            let mut next = snapshot.tasks.to_vec();
            next.extend(tasks);
            publish(snapshot, next);
            outcome = Ok(ids);
            true
        });

        if let Ok(ids) = &outcome {
            info!("Added {} task(s), queue size {}", ids.len(), self.len());
        }
        outcome
    }

    /// Replace only the fields named in `patch`. No-op if `id` is absent.
    pub fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> bool {
        self.modify(id, |task| task.apply(patch))
    }

    /// Apply a simulator progress report. No-op if `id` is absent.
    pub fn record_progress(&self, id: &TaskId, progress: &ProgressSnapshot) -> bool {
        self.modify(id, |task| task.apply_progress(progress))
    }

    /// Start a fresh progress run for `id`, discarding whatever an earlier
    /// run left behind. Returns false only if `id` is absent.
    pub fn reset_progress(&self, id: &TaskId, progress: &ProgressSnapshot) -> bool {
        self.modify(id, |task| {
            task.restart_progress(progress);
            true
        })
    }

    /// Drop a task from the queue. Returns the removed record.
    pub fn remove_task(&self, id: &TaskId) -> Option<Task> {
        let mut removed = None;
        self.tx.send_if_modified(|snapshot| {
            let Some(index) = snapshot.tasks.iter().position(|task| &task.id == id) else {
                return false;
            };
            let mut next = snapshot.tasks.to_vec();
            removed = Some(next.remove(index));
            publish(snapshot, next);
            true
        });
        if removed.is_some() {
            debug!("Removed task {}", id);
        }
        removed
    }

    fn modify(&self, id: &TaskId, change: impl FnOnce(&mut Task) -> bool) -> bool {
        self.tx.send_if_modified(|snapshot| {
            let Some(index) = snapshot.tasks.iter().position(|task| &task.id == id) else {
                return false;
            };
            let mut updated = snapshot.tasks[index].clone();
            if !change(&mut updated) {
                return false;
            }
            let mut next = snapshot.tasks.to_vec();
            next[index] = updated;
            publish(snapshot, next);
            true
        })
    }
}

fn publish(snapshot: &mut StoreSnapshot, tasks: Vec<Task>) {
    *snapshot = StoreSnapshot {
        version: snapshot.version + 1,
        tasks: Arc::from(tasks),
    };
}
