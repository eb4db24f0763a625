//! Boundary to the external extractor/transcoder.
//!
//! Metadata lookup and byte transfer are delegated entirely to
//! [`MediaBackend`] implementations; the queue only sees the [`Transfer`]
//! port, which performs one download and saves the result locally.

pub mod transfer;
pub mod ytdlp;

pub use transfer::{HttpTransfer, LocalTransfer};
pub use ytdlp::YtDlpBackend;

use crate::error::MediaError;
use crate::task::{AudioBitrate, ContainerFormat, Quality, Task};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Reduced extractor metadata for one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    pub duration_seconds: u64,
    pub thumbnail_url: Option<String>,
    pub formats: Vec<FormatInfo>,
}

/// One combined audio+video format offered by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    pub quality: String,
    pub container: String,
    pub file_size_bytes: u64,
}

/// Everything the transfer operation needs about one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub container_format: ContainerFormat,
    pub quality: Quality,
    pub is_audio_only: bool,
    pub audio_bitrate: AudioBitrate,
    /// Output name without extension
    pub file_name: String,
}

impl TransferRequest {
    pub fn from_task(task: &Task) -> Self {
        Self {
            url: task.source_url.clone(),
            container_format: task.container_format,
            quality: task.quality,
            is_audio_only: task.is_audio_only,
            audio_bitrate: task.audio_bitrate,
            file_name: task.display_name.clone(),
        }
    }

    pub fn extension(&self) -> &'static str {
        if self.is_audio_only {
            "mp3"
        } else {
            self.container_format.extension()
        }
    }

    /// Sanitized `"{file_name}.{ext}"`
    pub fn output_file_name(&self) -> String {
        format!("{}.{}", sanitize_file_name(&self.file_name), self.extension())
    }

    pub fn content_type(&self) -> String {
        if self.is_audio_only {
            "audio/mp3".to_string()
        } else {
            format!("video/{}", self.container_format.extension())
        }
    }
}

/// Extractor/transcoder collaborator
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn metadata(&self, url: &str) -> Result<VideoMetadata, MediaError>;

    /// Produce the requested media inside `dest_dir` and return its path
    async fn fetch(
        &self,
        request: &TransferRequest,
        dest_dir: &Path,
    ) -> Result<PathBuf, MediaError>;
}

/// The transfer operation the orchestrator calls for each task
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Download and save one item, returning where it was saved
    async fn transfer(&self, request: &TransferRequest) -> Result<PathBuf, MediaError>;
}

/// Reject missing, unparsable and non-http(s) URLs
pub fn validate_url(raw: &str) -> Result<url::Url, MediaError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MediaError::MissingUrl);
    }
    let parsed = url::Url::parse(raw).map_err(|_| MediaError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(MediaError::InvalidUrl(raw.to_string())),
    }
}

/// Make a user-supplied label safe to use as a file name
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned.to_string()
    }
}

/// `dir/file_name`, or `dir/stem (n).ext` if that already exists
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1..)
        .map(|n| match &ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}
