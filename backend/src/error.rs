//! Error types for the queue, history, ingestion and media layers.
//!
//! Every error here is scoped to the item or operation that raised it;
//! nothing is fatal to the process.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected queue mutations. Nothing is changed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A batch of zero URLs
    #[error("No video URLs to add")]
    EmptyBatch,

    /// The batch does not fit in the remaining capacity
    #[error("You can only add {remaining} more videos")]
    CapacityExceeded { requested: usize, remaining: usize },

    /// A download run is already walking the queue
    #[error("A download run is already in progress")]
    RunInProgress,

    /// `run_all` was called with an empty queue
    #[error("Please add at least one video URL")]
    NothingToDownload,
}

/// Failures while turning raw input into task-creation requests
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Only plain `.txt` files are accepted
    #[error("Unsupported file '{0}', expected a .txt file")]
    UnsupportedFile(String),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// History persistence failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value exists but is not a valid history document
    #[error("Stored history is corrupt: {0}")]
    Corrupt(String),
}

/// Failures of the external extractor, transcoder or transfer endpoint
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The extractor process exited unsuccessfully
    #[error("Extractor exited with {status}: {stderr}")]
    Extractor { status: String, stderr: String },

    /// The extractor reported success but left no output file
    #[error("Extractor produced no output file")]
    NoOutput,

    #[error("Metadata parse error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The transfer endpoint answered with an error status
    #[error("Server responded {status}: {message}")]
    Remote { status: u16, message: String },
}

/// Clipboard read failures. These are swallowed by the watcher.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("No clipboard tool available")]
    Unavailable,

    #[error("Clipboard read denied: {0}")]
    Denied(String),
}
