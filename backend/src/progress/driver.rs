//! Timer that drives one [`SimulatorState`] per task

use crate::progress::{SimulationProfile, SimulatorState};
use crate::task::{ProgressSnapshot, TaskId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, Instant};
use tracing::debug;

/// Receives every state the simulator reaches
pub trait ProgressSink: Send + Sync + 'static {
    /// First report of a run. Replaces anything an earlier run reported.
    fn on_start(&self, task_id: &TaskId, progress: &ProgressSnapshot) {
        self.on_progress(task_id, progress);
    }

    fn on_progress(&self, task_id: &TaskId, progress: &ProgressSnapshot);
}

/// Running simulation for one task
pub struct SimulationHandle {
    task_id: TaskId,
    join: JoinHandle<SimulatorState>,
}

impl SimulationHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the simulation to reach 100%. `None` if it was cancelled.
    pub async fn finished(self) -> Option<SimulatorState> {
        self.join.await.ok()
    }
}

type ActiveMap = HashMap<TaskId, (u64, AbortHandle)>;

/// Spawns and tracks independent per-task progress timers.
///
/// Timers are not coordinated with each other. Each one stops itself at
/// 100%; [`ProgressSimulator::cancel`] and [`ProgressSimulator::shutdown`]
/// release the ones still running.
pub struct ProgressSimulator {
    profile: SimulationProfile,
    sink: Arc<dyn ProgressSink>,
    active: Arc<Mutex<ActiveMap>>,
    generation: AtomicU64,
}

impl ProgressSimulator {
    pub fn new(profile: SimulationProfile, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            profile,
            sink,
            active: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    /// Start a timer for `task_id`, replacing any timer it already had
    pub fn start(&self, task_id: TaskId) -> SimulationHandle {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let profile = self.profile;
        let sink = Arc::clone(&self.sink);
        let active = Arc::clone(&self.active);
        let id = task_id.clone();

        // The reset lands before `start` returns, even if the timer is cancelled unpolled
        let mut state = SimulatorState::start(&profile);
        sink.on_start(&id, &state.snapshot(&profile));

        // Held across the spawn so the timer cannot unregister before it is registered
        let mut registry = self.active.lock();

        let join = tokio::spawn(async move {
            let mut interval =
                time::interval_at(Instant::now() + profile.tick_interval, profile.tick_interval);
            loop {
                interval.tick().await;
                state = state.tick(&profile);
                sink.on_progress(&id, &state.snapshot(&profile));
                if state.is_complete() {
                    break;
                }
            }

            let mut registry = active.lock();
            if matches!(registry.get(&id), Some((g, _)) if *g == generation) {
                registry.remove(&id);
            }
            debug!("Simulated progress complete for {}", id);
            state
        });

        let previous = registry.insert(task_id.clone(), (generation, join.abort_handle()));
        if let Some((_, previous)) = previous {
            previous.abort();
        }
        drop(registry);

        SimulationHandle { task_id, join }
    }

    pub fn is_active(&self, task_id: &TaskId) -> bool {
        self.active.lock().contains_key(task_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Stop the timer for `task_id`, if one is running
    pub fn cancel(&self, task_id: &TaskId) -> bool {
        match self.active.lock().remove(task_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every running timer
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.active.lock().drain().collect();
        if !drained.is_empty() {
            debug!("Stopping {} progress timer(s)", drained.len());
        }
        for (_, (_, handle)) in drained {
            handle.abort();
        }
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
