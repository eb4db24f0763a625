//! Turns typed text, dropped text, `.txt` files and clipboard captures into
//! task-creation requests.

pub mod clipboard;

pub use clipboard::{ClipboardReader, ClipboardSubscription, ClipboardWatcher, CommandClipboard};

use crate::error::IngestError;
use crate::task::{TaskId, TaskStore};
use std::path::Path;
use tracing::{debug, info};

/// One submission from any input surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    /// Multi-line text typed or pasted into the input box
    Typed(String),
    /// Plain text dropped onto the page
    DroppedText(String),
    /// Contents of a dropped or selected text file
    TextFile { name: String, contents: Vec<u8> },
    /// Text read from the clipboard by the watcher
    Clipboard(String),
}

impl IngestSource {
    /// Read a `.txt` file from disk into a [`IngestSource::TextFile`]
    pub async fn read_text_file(path: &Path) -> Result<Self, IngestError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ensure_text_file(&name)?;

        let contents = tokio::fs::read(path).await.map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::TextFile { name, contents })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Typed(_) => "typed",
            Self::DroppedText(_) => "dropped-text",
            Self::TextFile { .. } => "text-file",
            Self::Clipboard(_) => "clipboard",
        }
    }
}

/// One trimmed candidate per non-blank line
pub fn split_candidates(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Substring match against known video-host path fragments
pub fn looks_like_video_url(text: &str, host_patterns: &[String]) -> bool {
    let text = text.trim();
    !text.is_empty() && host_patterns.iter().any(|pattern| text.contains(pattern.as_str()))
}

fn ensure_text_file(name: &str) -> Result<(), IngestError> {
    let is_txt = Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if is_txt {
        Ok(())
    } else {
        Err(IngestError::UnsupportedFile(name.to_string()))
    }
}

/// Normalizes every input source into the same candidate list and submits
/// it to the task store.
#[derive(Debug, Clone)]
pub struct Ingestor {
    host_patterns: Vec<String>,
}

impl Ingestor {
    pub fn new(host_patterns: Vec<String>) -> Self {
        Self { host_patterns }
    }

    /// Candidate URLs for `source`, in submission order.
    ///
    /// Duplicates are kept. Clipboard text that does not look like a video
    /// URL yields nothing.
    pub fn candidates(&self, source: &IngestSource) -> Result<Vec<String>, IngestError> {
        let candidates = match source {
            IngestSource::Typed(text) | IngestSource::DroppedText(text) => split_candidates(text),
            IngestSource::TextFile { name, contents } => {
                ensure_text_file(name)?;
                split_candidates(&String::from_utf8_lossy(contents))
            }
            IngestSource::Clipboard(text) => {
                if looks_like_video_url(text, &self.host_patterns) {
                    vec![text.trim().to_string()]
                } else {
                    Vec::new()
                }
            }
        };
        Ok(candidates)
    }

    /// Add every candidate as a task, or nothing if they do not all fit
    pub fn submit(
        &self,
        store: &TaskStore,
        source: &IngestSource,
    ) -> Result<Vec<TaskId>, IngestError> {
        let candidates = self.candidates(source)?;
        if candidates.is_empty() {
            debug!("Nothing to add from {} input", source.kind());
            return Ok(Vec::new());
        }

        let count = candidates.len();
        let ids = store.add_tasks(candidates)?;
        info!("Accepted {} URL(s) from {} input", count, source.kind());
        Ok(ids)
    }
}
