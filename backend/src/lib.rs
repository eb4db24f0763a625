//! Batchtube - a bulk video download queue.
//!
//! URLs come in from typed text, dropped text or files, and the clipboard.
//! Each becomes a [`task::Task`] with its own output options. A download run
//! walks the queue, shows synthetic progress per task, and records the batch
//! in a persisted history ledger. Everything is exposed over a small HTTP and
//! websocket API served by [`server`].

pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod history;
pub mod ingest;
pub mod media;
pub mod progress;
pub mod server;
pub mod task;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{KeyValueStore, MemoryStore};
use crate::download::{EventBus, Orchestrator, StoreProgressSink};
use crate::history::{HistoryLedger, KvHistoryStore};
use crate::ingest::{
    ClipboardReader, ClipboardSubscription, ClipboardWatcher, CommandClipboard, IngestSource,
    Ingestor,
};
use crate::media::{HttpTransfer, LocalTransfer, MediaBackend, Transfer, YtDlpBackend};
use crate::progress::ProgressSimulator;
use crate::task::TaskStore;

/// Application state shared across all components
pub struct AppState {
    pub settings: RwLock<Settings>,
    pub store: Arc<TaskStore>,
    pub history: Arc<Mutex<HistoryLedger>>,
    pub simulator: Arc<ProgressSimulator>,
    pub orchestrator: Arc<Orchestrator>,
    pub ingestor: Ingestor,
    pub events: EventBus,
    pub media: Arc<dyn MediaBackend>,
    clipboard_reader: Arc<dyn ClipboardReader>,
    clipboard: Mutex<Option<ClipboardSubscription>>,
    config_path: Option<PathBuf>,
}

impl AppState {
    pub fn builder(settings: Settings) -> AppStateBuilder {
        AppStateBuilder {
            settings,
            kv: None,
            media: None,
            transfer: None,
            clipboard: None,
            config_path: None,
        }
    }

    /// Submit input from any source, reporting rejections as notifications
    pub fn ingest(&self, source: &IngestSource) -> Result<Vec<task::TaskId>, error::IngestError> {
        submit_and_notify(&self.ingestor, &self.store, &self.events, source)
    }

    /// Put a fresh copy of history entry `index` back on the queue.
    /// `Ok(None)` if there is no such entry.
    pub fn redownload(&self, index: usize) -> Result<Option<task::Task>, error::QueueError> {
        let Some(task) = self.history.lock().redownload(index) else {
            return Ok(None);
        };
        let result = self.store.insert(task.clone()).map(|id| vec![id]);
        report_added(&self.events, "redownload", &result);
        result?;
        info!("Re-queued {} from history", task.source_url);
        Ok(Some(task))
    }

    pub fn clipboard_enabled(&self) -> bool {
        self.clipboard
            .lock()
            .as_ref()
            .is_some_and(ClipboardSubscription::is_running)
    }

    /// Start or stop clipboard capture and remember the choice
    pub async fn set_clipboard_enabled(&self, enabled: bool) {
        if enabled {
            self.start_clipboard();
        } else {
            let subscription = self.clipboard.lock().take();
            if let Some(subscription) = subscription {
                subscription.stop().await;
            }
        }

        let snapshot = {
            let mut settings = self.settings.write();
            settings.clipboard.enabled = enabled;
            settings.clone()
        };
        if let Some(path) = &self.config_path {
            if let Err(e) = config::save_to(path, &snapshot) {
                warn!("Failed to save settings: {}", e);
            }
        }
    }

    fn start_clipboard(&self) {
        let mut slot = self.clipboard.lock();
        if slot.as_ref().is_some_and(ClipboardSubscription::is_running) {
            return;
        }

        let (interval, patterns) = {
            let settings = self.settings.read();
            (
                settings.clipboard.poll_interval(),
                settings.clipboard.host_patterns.clone(),
            )
        };
        let watcher = ClipboardWatcher::new(Arc::clone(&self.clipboard_reader), interval, patterns);

        let ingestor = self.ingestor.clone();
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        *slot = Some(watcher.start(move |url| {
            let _ = submit_and_notify(&ingestor, &store, &events, &IngestSource::Clipboard(url));
        }));
    }

    /// Release every background timer: the clipboard watcher and all
    /// running progress simulators
    pub async fn shutdown(&self) {
        let subscription = self.clipboard.lock().take();
        if let Some(subscription) = subscription {
            subscription.stop().await;
        }
        self.simulator.shutdown();
        info!("Background timers released");
    }
}

fn submit_and_notify(
    ingestor: &Ingestor,
    store: &TaskStore,
    events: &EventBus,
    source: &IngestSource,
) -> Result<Vec<task::TaskId>, error::IngestError> {
    let result = ingestor.submit(store, source);
    report_added(events, source.kind(), &result);
    result
}

/// Tell subscribers how a queue addition went
fn report_added<E: std::fmt::Display>(
    events: &EventBus,
    origin: &str,
    result: &Result<Vec<task::TaskId>, E>,
) {
    match result {
        Ok(ids) if !ids.is_empty() => {
            events.notify(
                download::NotificationLevel::Info,
                format!("Added {} video(s) to the queue", ids.len()),
            );
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Rejected {} input: {}", origin, e);
            events.error(e.to_string());
        }
    }
}

/// Wires the collaborators behind [`AppState`]. Anything not supplied is
/// built from the settings.
pub struct AppStateBuilder {
    settings: Settings,
    kv: Option<Arc<dyn KeyValueStore>>,
    media: Option<Arc<dyn MediaBackend>>,
    transfer: Option<Arc<dyn Transfer>>,
    clipboard: Option<Arc<dyn ClipboardReader>>,
    config_path: Option<PathBuf>,
}

impl AppStateBuilder {
    /// Where history is persisted. Defaults to a process-local store.
    pub fn key_value_store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn media_backend(mut self, media: Arc<dyn MediaBackend>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn transfer(mut self, transfer: Arc<dyn Transfer>) -> Self {
        self.transfer = Some(transfer);
        self
    }

    pub fn clipboard_reader(mut self, reader: Arc<dyn ClipboardReader>) -> Self {
        self.clipboard = Some(reader);
        self
    }

    /// Persist settings changes (such as the clipboard toggle) to `path`
    pub fn config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    pub fn build(self) -> Result<AppState> {
        let settings = self.settings;

        let store = Arc::new(TaskStore::new(settings.max_tasks()));
        let events = EventBus::new();

        let kv = self
            .kv
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let history = Arc::new(Mutex::new(HistoryLedger::load(
            Arc::new(KvHistoryStore::new(kv)),
            settings.history_limit(),
        )));

        let sink = Arc::new(StoreProgressSink::new(Arc::clone(&store), events.clone()));
        let simulator = Arc::new(ProgressSimulator::new(settings.simulation_profile(), sink));

        let media: Arc<dyn MediaBackend> = match self.media {
            Some(media) => media,
            None => Arc::new(YtDlpBackend::new(
                settings.media.ytdlp_path.clone(),
                settings.media.ffmpeg_path.clone(),
            )),
        };

        let transfer: Arc<dyn Transfer> = match (self.transfer, &settings.media.transfer_endpoint) {
            (Some(transfer), _) => transfer,
            (None, Some(endpoint)) => {
                info!("Transfers go through {}", endpoint);
                Arc::new(HttpTransfer::new(
                    endpoint.clone(),
                    settings.media.download_dir.clone(),
                )?)
            }
            (None, None) => Arc::new(LocalTransfer::new(
                Arc::clone(&media),
                settings.media.download_dir.clone(),
            )),
        };

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&history),
            Arc::clone(&simulator),
            transfer,
            events.clone(),
            settings.mode,
        ));

        let clipboard_reader = self
            .clipboard
            .unwrap_or_else(|| Arc::new(CommandClipboard::detect()) as Arc<dyn ClipboardReader>);
        let ingestor = Ingestor::new(settings.clipboard.host_patterns.clone());

        info!(
            "{:?} edition: up to {} tasks, {} history entries",
            settings.edition,
            settings.max_tasks(),
            settings.history_limit()
        );

        Ok(AppState {
            settings: RwLock::new(settings),
            store,
            history,
            simulator,
            orchestrator,
            ingestor,
            events,
            media,
            clipboard_reader,
            clipboard: Mutex::new(None),
            config_path: self.config_path,
        })
    }
}
