//! Walks the queue once, downloading every task and recording the batch

use crate::config::DownloadMode;
use crate::download::{Event, EventBus};
use crate::error::QueueError;
use crate::history::HistoryLedger;
use crate::media::{Transfer, TransferRequest};
use crate::progress::ProgressSimulator;
use crate::task::{ProgressSnapshot, Task, TaskId, TaskStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What happened to one task during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TaskOutcome {
    Completed {
        id: TaskId,
        #[serde(rename = "savedTo", skip_serializing_if = "Option::is_none")]
        saved_to: Option<PathBuf>,
    },
    Failed {
        id: TaskId,
        message: String,
    },
    /// Removed from the queue before its turn came
    Removed { id: TaskId },
}

impl TaskOutcome {
    pub fn id(&self) -> &TaskId {
        match self {
            Self::Completed { id, .. } | Self::Failed { id, .. } | Self::Removed { id } => id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a download run over the task store.
///
/// In [`DownloadMode::Transfer`] tasks are transferred one at a time in
/// queue order, each with a simulator running alongside for feedback. In
/// [`DownloadMode::Simulated`] no transfer happens and every task's
/// simulator runs at once. Either way the attempted tasks are appended to
/// history as one batch when the run ends.
pub struct Orchestrator {
    store: Arc<TaskStore>,
    history: Arc<Mutex<HistoryLedger>>,
    simulator: Arc<ProgressSimulator>,
    transfer: Arc<dyn Transfer>,
    events: EventBus,
    mode: DownloadMode,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<TaskStore>,
        history: Arc<Mutex<HistoryLedger>>,
        simulator: Arc<ProgressSimulator>,
        transfer: Arc<dyn Transfer>,
        events: EventBus,
        mode: DownloadMode,
    ) -> Self {
        Self {
            store,
            history,
            simulator,
            transfer,
            events,
            mode,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mode(&self) -> DownloadMode {
        self.mode
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Download every task currently in the queue and wait for the run to end
    pub async fn run_all(&self) -> Result<Vec<TaskOutcome>, QueueError> {
        let (guard, ids) = self.claim()?;
        let outcomes = self.run(ids).await;
        drop(guard);
        Ok(outcomes)
    }

    /// Like [`Orchestrator::run_all`], but the run continues in the background.
    /// Validation errors are still returned immediately.
    pub fn spawn_run(self: &Arc<Self>) -> Result<JoinHandle<Vec<TaskOutcome>>, QueueError> {
        let (guard, ids) = self.claim()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _guard = guard;
            this.run(ids).await
        }))
    }

    fn claim(&self) -> Result<(RunGuard, Vec<TaskId>), QueueError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QueueError::RunInProgress);
        }
        let guard = RunGuard(Arc::clone(&self.running));

        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return Err(QueueError::NothingToDownload);
        }
        let ids = snapshot.tasks.iter().map(|task| task.id.clone()).collect();
        Ok((guard, ids))
    }

    async fn run(&self, ids: Vec<TaskId>) -> Vec<TaskOutcome> {
        info!("Starting {:?} run over {} task(s)", self.mode, ids.len());

        let (outcomes, attempted) = match self.mode {
            DownloadMode::Transfer => self.run_transfers(ids).await,
            DownloadMode::Simulated => self.run_simulated(ids).await,
        };

        let completed = outcomes.iter().filter(|o| o.is_completed()).count();
        info!(
            "Run finished: {} completed, {} attempted",
            completed,
            attempted.len()
        );

        self.record_batch(&attempted);
        outcomes
    }

    async fn run_transfers(&self, ids: Vec<TaskId>) -> (Vec<TaskOutcome>, Vec<Task>) {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut attempted = Vec::with_capacity(ids.len());

        for id in ids {
            // Options may have been edited since the run started
            let Some(task) = self.store.get(&id) else {
                outcomes.push(TaskOutcome::Removed { id });
                continue;
            };

            self.simulator.start(id.clone());
            let request = TransferRequest::from_task(&task);
            info!("Downloading {} as {}", task.source_url, request.output_file_name());

            let result = self.transfer.transfer(&request).await;
            self.simulator.cancel(&id);

            let outcome = match result {
                Ok(path) => {
                    self.pin_complete(&id);
                    self.events
                        .success(format!("Download complete: {}", task.source_url));
                    TaskOutcome::Completed {
                        id: id.clone(),
                        saved_to: Some(path),
                    }
                }
                Err(e) => {
                    warn!("Download failed for {}: {}", task.source_url, e);
                    self.events
                        .error(format!("Failed to download {}: {}", task.source_url, e));
                    TaskOutcome::Failed {
                        id: id.clone(),
                        message: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
            attempted.push(self.store.get(&id).unwrap_or(task));
        }

        (outcomes, attempted)
    }

    async fn run_simulated(&self, ids: Vec<TaskId>) -> (Vec<TaskOutcome>, Vec<Task>) {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut running = Vec::with_capacity(ids.len());

        for id in ids {
            match self.store.get(&id) {
                Some(task) => {
                    let handle = self.simulator.start(id);
                    running.push((task, handle));
                }
                None => outcomes.push(TaskOutcome::Removed { id }),
            }
        }

        let mut attempted = Vec::with_capacity(running.len());
        for (task, handle) in running {
            let id = task.id.clone();
            let outcome = match handle.finished().await {
                Some(_) => {
                    self.events
                        .success(format!("Download complete: {}", task.source_url));
                    TaskOutcome::Completed { id: id.clone(), saved_to: None }
                }
                None if self.store.get(&id).is_none() => TaskOutcome::Removed { id: id.clone() },
                None => TaskOutcome::Failed {
                    id: id.clone(),
                    message: "Simulation stopped".to_string(),
                },
            };
            outcomes.push(outcome);
            attempted.push(self.store.get(&id).unwrap_or(task));
        }

        (outcomes, attempted)
    }

    fn pin_complete(&self, id: &TaskId) {
        let complete = ProgressSnapshot::complete();
        if self.store.record_progress(id, &complete) {
            self.events.publish(Event::Progress {
                id: id.clone(),
                progress: complete,
            });
        }
    }

    fn record_batch(&self, tasks: &[Task]) {
        if tasks.is_empty() {
            return;
        }
        let now = chrono::Utc::now().timestamp_millis();
        if let Err(e) = self.history.lock().append_batch(tasks, now) {
            warn!("Failed to persist download history: {}", e);
        }
    }
}
