//! Download runs and the events they publish

mod orchestrator;

pub use orchestrator::{Orchestrator, TaskOutcome};

use crate::progress::ProgressSink;
use crate::task::{ProgressSnapshot, TaskId, TaskStore};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

/// Transient user-facing message (a toast in the UI)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

/// Update sent to websocket clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    Progress {
        id: TaskId,
        #[serde(flatten)]
        progress: ProgressSnapshot,
    },
    Notification(Notification),
    /// A new version of the task store is available
    Tasks { version: u64 },
}

/// Broadcast channel for [`Event`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Nobody listening is not an error.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.publish(Event::Notification(Notification {
            level,
            message: message.into(),
        }));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NotificationLevel::Error, message);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes simulator progress into the task store and onto the event bus.
///
/// Progress for a task that has since been removed is dropped.
pub struct StoreProgressSink {
    store: Arc<TaskStore>,
    events: EventBus,
}

impl StoreProgressSink {
    pub fn new(store: Arc<TaskStore>, events: EventBus) -> Self {
        Self { store, events }
    }
}

impl ProgressSink for StoreProgressSink {
    fn on_start(&self, task_id: &TaskId, progress: &ProgressSnapshot) {
        if self.store.reset_progress(task_id, progress) {
            self.events.publish(Event::Progress {
                id: task_id.clone(),
                progress: progress.clone(),
            });
        }
    }

    fn on_progress(&self, task_id: &TaskId, progress: &ProgressSnapshot) {
        if self.store.record_progress(task_id, progress) {
            self.events.publish(Event::Progress {
                id: task_id.clone(),
                progress: progress.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let progress = Event::Progress {
            id: TaskId::from("t1"),
            progress: ProgressSnapshot {
                percent: 40,
                estimated_time_remaining: Some("12 seconds".into()),
                approximate_file_size: Some("250MB".into()),
            },
        };
        assert_eq!(
            serde_json::to_value(&progress).unwrap(),
            serde_json::json!({
                "type": "progress",
                "id": "t1",
                "percent": 40,
                "estimatedTimeRemaining": "12 seconds",
                "approximateFileSize": "250MB"
            })
        );

        let note = Event::Notification(Notification {
            level: NotificationLevel::Error,
            message: "boom".into(),
        });
        assert_eq!(
            serde_json::to_value(&note).unwrap(),
            serde_json::json!({"type": "notification", "level": "error", "message": "boom"})
        );
    }

    #[test]
    fn sink_ignores_removed_tasks() {
        let store = Arc::new(TaskStore::new(5));
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let sink = StoreProgressSink::new(Arc::clone(&store), events);

        let ids = store.add_tasks(["https://youtu.be/a"]).unwrap();
        let snapshot = ProgressSnapshot {
            percent: 10,
            estimated_time_remaining: None,
            approximate_file_size: None,
        };
        sink.on_progress(&ids[0], &snapshot);
        assert_eq!(store.get(&ids[0]).unwrap().progress_percent, 10);
        assert!(matches!(rx.try_recv(), Ok(Event::Progress { .. })));

        store.remove_task(&ids[0]);
        sink.on_progress(&ids[0], &snapshot);
        assert!(rx.try_recv().is_err());
    }
}
