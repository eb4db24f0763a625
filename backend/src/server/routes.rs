//! REST API routes

use crate::config::{DownloadMode, Edition};
use crate::download::TaskOutcome;
use crate::error::{IngestError, MediaError, QueueError};
use crate::history::HistoryEntry;
use crate::ingest::IngestSource;
use crate::server::media;
use crate::task::{Task, TaskId, TaskPatch};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Create API routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Queue
        .route("/tasks", get(list_tasks).post(add_tasks))
        .route("/tasks/file", post(add_tasks_from_file))
        .route("/tasks/{id}", patch(update_task).delete(remove_task))
        .route("/downloads", post(start_downloads))
        // History
        .route("/history", get(list_history))
        .route("/history/{index}/redownload", post(redownload))
        // Clipboard capture
        .route("/clipboard", get(clipboard_status).put(set_clipboard))
        // Settings
        .route("/settings", get(get_settings))
        // Media
        .route("/video-info", get(media::video_info))
        .route("/download", get(media::download))
}

// ============ Queue Endpoints ============

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksResponse {
    pub version: u64,
    pub capacity: usize,
    pub remaining_capacity: usize,
    pub tasks: Vec<Task>,
}

/// Current queue in display order
async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<TasksResponse> {
    let snapshot = state.store.snapshot();
    let capacity = state.store.capacity();
    Json(TasksResponse {
        version: snapshot.version,
        capacity,
        remaining_capacity: capacity.saturating_sub(snapshot.len()),
        tasks: snapshot.tasks.to_vec(),
    })
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextOrigin {
    #[default]
    Typed,
    Dropped,
}

#[derive(Debug, Deserialize)]
pub struct AddTasksRequest {
    pub text: String,
    #[serde(default)]
    pub origin: TextOrigin,
}

#[derive(Debug, Serialize)]
pub struct AddTasksResponse {
    pub ids: Vec<TaskId>,
}

/// Add one task per non-blank line of text
async fn add_tasks(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTasksRequest>,
) -> Result<(StatusCode, Json<AddTasksResponse>), AppError> {
    let source = match req.origin {
        TextOrigin::Typed => IngestSource::Typed(req.text),
        TextOrigin::Dropped => IngestSource::DroppedText(req.text),
    };
    let ids = state.ingest(&source)?;
    Ok((StatusCode::CREATED, Json(AddTasksResponse { ids })))
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub name: String,
}

/// Add tasks from an uploaded `.txt` file, one URL per line
async fn add_tasks_from_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<AddTasksResponse>), AppError> {
    let source = IngestSource::TextFile {
        name: query.name,
        contents: body.to_vec(),
    };
    let ids = state.ingest(&source)?;
    Ok((StatusCode::CREATED, Json(AddTasksResponse { ids })))
}

/// Change the options of one task
async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, AppError> {
    let id = TaskId::from(id);
    state.store.update_task(&id, &patch);
    state
        .store
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

/// Remove a task, stopping its progress timer if one is running
async fn remove_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = TaskId::from(id);
    state.simulator.cancel(&id);
    match state.store.remove_task(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::NotFound("Task not found".into())),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunQuery {
    /// Wait for the run to finish and return per-task outcomes
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<TaskOutcome>>,
}

/// Download everything in the queue
async fn start_downloads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunQuery>,
) -> Result<(StatusCode, Json<RunResponse>), AppError> {
    let run = state.orchestrator.spawn_run()?;
    info!("Download run started");

    if !query.wait {
        return Ok((
            StatusCode::ACCEPTED,
            Json(RunResponse {
                started: true,
                outcomes: None,
            }),
        ));
    }

    let outcomes = run
        .await
        .map_err(|e| AppError::Internal(format!("Download run aborted: {}", e)))?;
    Ok((
        StatusCode::OK,
        Json(RunResponse {
            started: true,
            outcomes: Some(outcomes),
        }),
    ))
}

// ============ History Endpoints ============

/// Completed downloads, newest first
async fn list_history(State(state): State<Arc<AppState>>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.lock().entries().to_vec())
}

/// Queue a fresh copy of a history entry
async fn redownload(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = state
        .redownload(index)?
        .ok_or_else(|| AppError::NotFound("History entry not found".into()))?;
    Ok((StatusCode::CREATED, Json(task)))
}

// ============ Clipboard Endpoints ============

#[derive(Debug, Serialize, Deserialize)]
pub struct ClipboardState {
    pub enabled: bool,
}

async fn clipboard_status(State(state): State<Arc<AppState>>) -> Json<ClipboardState> {
    Json(ClipboardState {
        enabled: state.clipboard_enabled(),
    })
}

/// Turn clipboard capture on or off
async fn set_clipboard(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClipboardState>,
) -> Json<ClipboardState> {
    state.set_clipboard_enabled(req.enabled).await;
    Json(ClipboardState {
        enabled: state.clipboard_enabled(),
    })
}

// ============ Settings Endpoints ============

/// Settings response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub edition: Edition,
    pub mode: DownloadMode,
    pub max_tasks: usize,
    pub history_limit: usize,
    pub tick_interval_ms: u64,
    pub progress_step: u8,
    pub clipboard_poll_interval_ms: u64,
}

/// Get current settings
async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let settings = state.settings.read();
    let profile = settings.simulation_profile();
    Json(SettingsResponse {
        edition: settings.edition,
        mode: settings.mode,
        max_tasks: settings.max_tasks(),
        history_limit: settings.history_limit(),
        tick_interval_ms: profile.tick_interval.as_millis() as u64,
        progress_step: profile.step,
        clipboard_poll_interval_ms: settings.clipboard.poll_interval_ms,
    })
}

// ============ Error Handling ============

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({ "message": message }));
        (status, body).into_response()
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::RunInProgress => AppError::Conflict(err.to_string()),
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Queue(e) => e.into(),
            IngestError::UnsupportedFile(_) => AppError::BadRequest(err.to_string()),
            IngestError::Io { .. } => AppError::Internal(err.to_string()),
        }
    }
}

impl AppError {
    /// Bad input is a 400 with the real reason; anything else is logged and
    /// reported as `failure`
    pub fn from_media(err: MediaError, failure: &str) -> Self {
        match err {
            MediaError::MissingUrl | MediaError::InvalidUrl(_) => {
                AppError::BadRequest(err.to_string())
            }
            other => {
                error!("{}: {}", failure, other);
                AppError::Internal(failure.to_string())
            }
        }
    }
}
