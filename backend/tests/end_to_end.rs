//! End-to-end flows through `AppState`: ingest, run, history, restart

use async_trait::async_trait;
use batchtube::config::{DownloadMode, Edition, Settings};
use batchtube::db::Database;
use batchtube::download::{Event, NotificationLevel};
use batchtube::error::{ClipboardError, IngestError, MediaError, QueueError};
use batchtube::ingest::{ClipboardReader, IngestSource};
use batchtube::media::{Transfer, TransferRequest};
use batchtube::AppState;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct FlakyTransfer;

#[async_trait]
impl Transfer for FlakyTransfer {
    async fn transfer(&self, request: &TransferRequest) -> Result<PathBuf, MediaError> {
        if request.url.contains("broken") {
            return Err(MediaError::Remote {
                status: 500,
                message: "Failed to download video".into(),
            });
        }
        Ok(PathBuf::from("/downloads").join(request.output_file_name()))
    }
}

fn state_with_db(settings: Settings, db: &Database) -> AppState {
    AppState::builder(settings)
        .key_value_store(Arc::new(db.clone()))
        .transfer(Arc::new(FlakyTransfer))
        .build()
        .unwrap()
}

#[tokio::test]
async fn history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("batchtube.db");

    {
        let db = Database::open(&db_path).unwrap();
        let state = state_with_db(Settings::default(), &db);
        state
            .ingest(&IngestSource::Typed("https://youtu.be/abc123".into()))
            .unwrap();

        let task = &state.store.snapshot().tasks[0];
        assert_eq!(task.source_url, "https://youtu.be/abc123");
        assert_eq!(task.quality.as_str(), "Auto");
        assert!(!task.is_audio_only);

        let outcomes = state.orchestrator.run_all().await.unwrap();
        assert!(outcomes[0].is_completed());
    }

    let db = Database::open(&db_path).unwrap();
    let state = state_with_db(Settings::default(), &db);
    let history = state.history.lock();
    assert_eq!(history.len(), 1);
    assert_eq!(history.entries()[0].task.source_url, "https://youtu.be/abc123");
}

#[tokio::test]
async fn failed_transfer_still_lands_in_history() {
    let db = Database::open_in_memory().unwrap();
    let state = state_with_db(Settings::default(), &db);
    let mut events = state.events.subscribe();

    state
        .ingest(&IngestSource::Typed("https://youtu.be/broken".into()))
        .unwrap();
    let outcomes = state.orchestrator.run_all().await.unwrap();
    assert!(!outcomes[0].is_completed());

    assert_eq!(state.history.lock().len(), 1);

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let Event::Notification(n) = event {
            if n.level == NotificationLevel::Error {
                assert!(n.message.contains("Failed to download video"));
                saw_error = true;
            }
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn history_is_trimmed_to_edition_limit() {
    let db = Database::open_in_memory().unwrap();
    let mut settings = Settings::for_edition(Edition::Pro);
    settings.queue.history_limit = Some(3);
    let state = state_with_db(settings, &db);

    for round in 0..3 {
        let text = format!("https://youtu.be/r{round}a\nhttps://youtu.be/r{round}b");
        let ids = state.ingest(&IngestSource::Typed(text)).unwrap();
        state.orchestrator.run_all().await.unwrap();
        for id in ids {
            state.store.remove_task(&id);
        }
    }

    let history = state.history.lock();
    let urls: Vec<_> = history
        .entries()
        .iter()
        .map(|e| e.task.source_url.as_str())
        .collect();
    assert_eq!(
        urls,
        vec!["https://youtu.be/r2a", "https://youtu.be/r2b", "https://youtu.be/r1a"]
    );
}

#[tokio::test]
async fn capacity_rejection_reaches_subscribers() {
    let db = Database::open_in_memory().unwrap();
    let mut settings = Settings::default();
    settings.queue.max_tasks = Some(2);
    let state = state_with_db(settings, &db);
    let mut events = state.events.subscribe();

    let err = state
        .ingest(&IngestSource::Typed("a\nb\nc".into()))
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Queue(QueueError::CapacityExceeded {
            requested: 3,
            remaining: 2
        })
    ));
    assert!(state.store.is_empty());

    match events.try_recv() {
        Ok(Event::Notification(n)) => {
            assert_eq!(n.level, NotificationLevel::Error);
            assert_eq!(n.message, "You can only add 2 more videos");
        }
        other => panic!("expected a notification, got {other:?}"),
    }
}

#[tokio::test]
async fn redownload_into_full_queue_reaches_subscribers() {
    let db = Database::open_in_memory().unwrap();
    let mut settings = Settings::default();
    settings.queue.max_tasks = Some(1);
    let state = state_with_db(settings, &db);

    state
        .ingest(&IngestSource::Typed("https://youtu.be/abc123".into()))
        .unwrap();
    state.orchestrator.run_all().await.unwrap();
    let mut events = state.events.subscribe();

    let err = state.redownload(0).unwrap_err();
    assert_eq!(
        err,
        QueueError::CapacityExceeded {
            requested: 1,
            remaining: 0
        }
    );
    assert_eq!(state.store.len(), 1);
    match events.try_recv() {
        Ok(Event::Notification(n)) => {
            assert_eq!(n.level, NotificationLevel::Error);
            assert_eq!(n.message, "You can only add 0 more videos");
        }
        other => panic!("expected a notification, got {other:?}"),
    }

    assert!(state.redownload(5).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn simulated_mode_reports_every_step() {
    let db = Database::open_in_memory().unwrap();
    let mut settings = Settings::for_edition(Edition::Pro);
    settings.mode = DownloadMode::Simulated;
    let state = state_with_db(settings, &db);
    let mut events = state.events.subscribe();

    let ids = state
        .ingest(&IngestSource::Typed("https://youtu.be/abc123".into()))
        .unwrap();
    state.orchestrator.run_all().await.unwrap();

    let mut percents = Vec::new();
    let mut last_eta = None;
    while let Ok(event) = events.try_recv() {
        if let Event::Progress { id, progress } = event {
            assert_eq!(id, ids[0]);
            percents.push(progress.percent);
            last_eta = progress.estimated_time_remaining;
        }
    }
    assert_eq!(percents, (0..=100).step_by(10).collect::<Vec<u8>>());
    assert_eq!(last_eta.as_deref(), Some("0 seconds"));

    let task = state.store.get(&ids[0]).unwrap();
    assert_eq!(task.progress_percent, 100);
    let size = task.approximate_file_size.unwrap();
    let mb: u32 = size.trim_end_matches("MB").parse().unwrap();
    assert!((100..600).contains(&mb));
    assert_eq!(state.simulator.active_count(), 0);
}

/// Returns whatever text the test last put on it
#[derive(Default)]
struct TestClipboard {
    text: Mutex<Option<String>>,
}

#[async_trait]
impl ClipboardReader for TestClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        self.text
            .lock()
            .clone()
            .ok_or_else(|| ClipboardError::Denied("permission denied".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn clipboard_capture_adds_each_new_url_once() {
    let clipboard = Arc::new(TestClipboard::default());
    let state = AppState::builder(Settings::default())
        .clipboard_reader(clipboard.clone())
        .transfer(Arc::new(FlakyTransfer))
        .build()
        .unwrap();

    state.set_clipboard_enabled(true).await;
    assert!(state.clipboard_enabled());

    // Denied reads are ignored
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(state.store.is_empty());

    *clipboard.text.lock() = Some("https://www.youtube.com/watch?v=abc123".into());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(state.store.len(), 1);

    *clipboard.text.lock() = Some("just some notes".into());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(state.store.len(), 1);

    state.shutdown().await;
    assert!(!state.clipboard_enabled());

    *clipboard.text.lock() = Some("https://youtu.be/after-shutdown".into());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(state.store.len(), 1);
}
