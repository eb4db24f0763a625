//! Opt-in clipboard capture

use crate::error::ClipboardError;
use crate::ingest::looks_like_video_url;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// Read access to the system clipboard
#[async_trait]
pub trait ClipboardReader: Send + Sync {
    async fn read_text(&self) -> Result<String, ClipboardError>;
}

/// Reads the clipboard through the platform's paste tool
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
}

impl CommandClipboard {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The usual paste command for the current platform
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("pbpaste", Vec::new())
        } else if cfg!(target_os = "windows") {
            Self::new(
                "powershell",
                vec![
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    "Get-Clipboard".to_string(),
                ],
            )
        } else if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            Self::new("wl-paste", vec!["--no-newline".to_string()])
        } else {
            Self::new(
                "xclip",
                vec![
                    "-selection".to_string(),
                    "clipboard".to_string(),
                    "-o".to_string(),
                ],
            )
        }
    }
}

#[async_trait]
impl ClipboardReader for CommandClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ClipboardError::Unavailable,
                _ => ClipboardError::Denied(e.to_string()),
            })?;

        if !output.status.success() {
            return Err(ClipboardError::Denied(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Polls the clipboard and reports text that looks like a video URL
pub struct ClipboardWatcher {
    reader: Arc<dyn ClipboardReader>,
    poll_interval: Duration,
    host_patterns: Vec<String>,
}

impl ClipboardWatcher {
    pub fn new(
        reader: Arc<dyn ClipboardReader>,
        poll_interval: Duration,
        host_patterns: Vec<String>,
    ) -> Self {
        Self {
            reader,
            poll_interval,
            host_patterns,
        }
    }

    /// Start polling. `on_url` is called once per new matching clipboard value.
    ///
    /// Read failures are ignored and polling continues. The returned
    /// subscription owns the timer.
    pub fn start<F>(self, on_url: F) -> ClipboardSubscription
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            let mut ticker = time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_seen: Option<String> = None;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let text = match self.reader.read_text().await {
                            Ok(text) => text.trim().to_string(),
                            Err(e) => {
                                debug!("Clipboard read skipped: {}", e);
                                continue;
                            }
                        };
                        if last_seen.as_deref() == Some(text.as_str()) {
                            continue;
                        }
                        last_seen = Some(text.clone());
                        if looks_like_video_url(&text, &self.host_patterns) {
                            on_url(text);
                        }
                    }
                }
            }
            debug!("Clipboard watcher stopped");
        });

        info!("Clipboard watcher started");
        ClipboardSubscription {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }
}

/// Handle to a running clipboard watcher. Dropping it aborts the timer.
pub struct ClipboardSubscription {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ClipboardSubscription {
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Stop polling and wait for the timer task to exit
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
        info!("Clipboard watcher stopped");
    }
}

impl Drop for ClipboardSubscription {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}
