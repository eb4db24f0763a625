//! Task record and its option enums

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque task identifier, generated once and never reused
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Parse failure for the option enums below
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownOption {
    pub kind: &'static str,
    pub value: String,
}

/// Generates `as_str`, `ALL`, `Display` and `FromStr` for a label enum.
macro_rules! labelled_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownOption;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| UnknownOption {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

/// Requested video quality, best first after `Auto`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[default]
    Auto,
    #[serde(rename = "4K")]
    Uhd,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

labelled_enum!(Quality, "quality", {
    Auto => "Auto",
    Uhd => "4K",
    P1440 => "1440p",
    P1080 => "1080p",
    P720 => "720p",
    P480 => "480p",
    P360 => "360p",
});

impl Quality {
    /// Maximum frame height, `None` for `Auto`
    pub fn max_height(self) -> Option<u32> {
        match self {
            Self::Auto => None,
            Self::Uhd => Some(2160),
            Self::P1440 => Some(1440),
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::P360 => Some(360),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Avi,
    Webm,
}

labelled_enum!(ContainerFormat, "format", {
    Mp4 => "MP4",
    Avi => "AVI",
    Webm => "WEBM",
});

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Webm => "webm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioBitrate {
    #[serde(rename = "128kbps")]
    Kbps128,
    #[default]
    #[serde(rename = "192kbps")]
    Kbps192,
    #[serde(rename = "320kbps")]
    Kbps320,
}

labelled_enum!(AudioBitrate, "audio bitrate", {
    Kbps128 => "128kbps",
    Kbps192 => "192kbps",
    Kbps320 => "320kbps",
});

impl AudioBitrate {
    pub fn kbps(self) -> u32 {
        match self {
            Self::Kbps128 => 128,
            Self::Kbps192 => 192,
            Self::Kbps320 => 320,
        }
    }
}

/// The options that are actually in effect for a task.
/// Quality and format are inert while audio-only is on, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSelection {
    Video {
        quality: Quality,
        format: ContainerFormat,
    },
    Audio {
        bitrate: AudioBitrate,
    },
}

/// One queued or in-flight download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub source_url: String,
    pub quality: Quality,
    pub container_format: ContainerFormat,
    #[serde(rename = "isMP3", alias = "isAudioOnly")]
    pub is_audio_only: bool,
    pub audio_bitrate: AudioBitrate,
    pub display_name: String,
    pub progress_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_file_size: Option<String>,
}

impl Task {
    /// New task for `url` with default options
    pub fn new(url: impl Into<String>) -> Self {
        let source_url = url.into();
        let display_name = derive_display_name(&source_url);
        Self {
            id: TaskId::generate(),
            source_url,
            quality: Quality::default(),
            container_format: ContainerFormat::default(),
            is_audio_only: false,
            audio_bitrate: AudioBitrate::default(),
            display_name,
            progress_percent: 0,
            estimated_time_remaining: None,
            approximate_file_size: None,
        }
    }

    pub fn selection(&self) -> OutputSelection {
        if self.is_audio_only {
            OutputSelection::Audio {
                bitrate: self.audio_bitrate,
            }
        } else {
            OutputSelection::Video {
                quality: self.quality,
                format: self.container_format,
            }
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self.selection() {
            OutputSelection::Audio { .. } => "mp3",
            OutputSelection::Video { format, .. } => format.extension(),
        }
    }

    /// `"{display_name}.{ext}"`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.display_name, self.file_extension())
    }

    /// Detached copy with a fresh id and no progress
    pub fn fresh_copy(&self) -> Self {
        Self {
            id: TaskId::generate(),
            progress_percent: 0,
            estimated_time_remaining: None,
            approximate_file_size: None,
            ..self.clone()
        }
    }

    /// Apply the user-editable fields present in `patch`.
    /// Returns whether anything changed.
    pub fn apply(&mut self, patch: &TaskPatch) -> bool {
        let before = self.clone();
        if let Some(quality) = patch.quality {
            self.quality = quality;
        }
        if let Some(format) = patch.container_format {
            self.container_format = format;
        }
        if let Some(audio_only) = patch.is_audio_only {
            self.is_audio_only = audio_only;
        }
        if let Some(bitrate) = patch.audio_bitrate {
            self.audio_bitrate = bitrate;
        }
        if let Some(name) = &patch.display_name {
            self.display_name = name.clone();
        }
        *self != before
    }

    /// Overwrite progress, ETA and size with the first report of a new run
    pub fn restart_progress(&mut self, progress: &ProgressSnapshot) {
        self.progress_percent = progress.percent.min(100);
        self.estimated_time_remaining = progress.estimated_time_remaining.clone();
        self.approximate_file_size = progress.approximate_file_size.clone();
    }

    /// Apply a progress report. Within a run, progress never moves backwards.
    pub fn apply_progress(&mut self, progress: &ProgressSnapshot) -> bool {
        if progress.percent < self.progress_percent {
            return false;
        }
        let before = self.clone();
        self.progress_percent = progress.percent.min(100);
        if progress.estimated_time_remaining.is_some() {
            self.estimated_time_remaining = progress.estimated_time_remaining.clone();
        }
        if progress.approximate_file_size.is_some() {
            self.approximate_file_size = progress.approximate_file_size.clone();
        }
        *self != before
    }
}

/// Partial update of the user-editable task fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "format")]
    pub container_format: Option<ContainerFormat>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "isMP3",
        alias = "isAudioOnly"
    )]
    pub is_audio_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<AudioBitrate>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "fileName")]
    pub display_name: Option<String>,
}

impl TaskPatch {
    pub fn quality(quality: Quality) -> Self {
        Self {
            quality: Some(quality),
            ..Self::default()
        }
    }

    pub fn container_format(format: ContainerFormat) -> Self {
        Self {
            container_format: Some(format),
            ..Self::default()
        }
    }

    pub fn audio_only(enabled: bool) -> Self {
        Self {
            is_audio_only: Some(enabled),
            ..Self::default()
        }
    }

    pub fn audio_bitrate(bitrate: AudioBitrate) -> Self {
        Self {
            audio_bitrate: Some(bitrate),
            ..Self::default()
        }
    }

    pub fn display_name(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Progress fields owned by the progress simulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub estimated_time_remaining: Option<String>,
    pub approximate_file_size: Option<String>,
}

impl ProgressSnapshot {
    pub fn complete() -> Self {
        Self {
            percent: 100,
            estimated_time_remaining: Some("0 seconds".to_string()),
            approximate_file_size: None,
        }
    }
}

/// Best-effort default label: the `v` query parameter, or the raw URL
pub fn derive_display_name(source_url: &str) -> String {
    url::Url::parse(source_url.trim())
        .ok()
        .and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(key, value)| key == "v" && !value.is_empty())
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| source_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_defaults() {
        let task = Task::new("https://youtu.be/abc123");
        assert_eq!(task.quality, Quality::Auto);
        assert_eq!(task.container_format, ContainerFormat::Mp4);
        assert!(!task.is_audio_only);
        assert_eq!(task.audio_bitrate, AudioBitrate::Kbps192);
        assert_eq!(task.progress_percent, 0);
        assert!(task.estimated_time_remaining.is_none());
        assert!(task.approximate_file_size.is_none());
        assert_eq!(task.display_name, "https://youtu.be/abc123");
    }

    #[test]
    fn display_name_uses_v_parameter() {
        assert_eq!(
            derive_display_name("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(derive_display_name("not a url"), "not a url");
        assert_eq!(
            derive_display_name("https://example.com/watch?v="),
            "https://example.com/watch?v="
        );
    }

    #[test]
    fn audio_toggle_keeps_video_options() {
        let mut task = Task::new("https://youtu.be/abc123");
        task.apply(&TaskPatch::quality(Quality::P720));
        task.apply(&TaskPatch::container_format(ContainerFormat::Webm));

        task.apply(&TaskPatch::audio_only(true));
        assert_eq!(
            task.selection(),
            OutputSelection::Audio {
                bitrate: AudioBitrate::Kbps192
            }
        );
        assert_eq!(task.file_extension(), "mp3");

        task.apply(&TaskPatch::audio_only(false));
        assert_eq!(
            task.selection(),
            OutputSelection::Video {
                quality: Quality::P720,
                format: ContainerFormat::Webm
            }
        );
    }

    #[test]
    fn progress_is_monotonic() {
        let mut task = Task::new("https://youtu.be/abc123");
        let at = |percent| ProgressSnapshot {
            percent,
            estimated_time_remaining: None,
            approximate_file_size: None,
        };
        assert!(task.apply_progress(&at(40)));
        assert!(!task.apply_progress(&at(20)));
        assert_eq!(task.progress_percent, 40);
        assert!(task.apply_progress(&at(250)));
        assert_eq!(task.progress_percent, 100);
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("4k".parse::<Quality>().unwrap(), Quality::Uhd);
        assert_eq!("webm".parse::<ContainerFormat>().unwrap(), ContainerFormat::Webm);
        assert_eq!("320KBPS".parse::<AudioBitrate>().unwrap(), AudioBitrate::Kbps320);
        assert!("8K".parse::<Quality>().is_err());
        assert_eq!(Quality::ALL.len(), 7);
    }

    #[test]
    fn patch_accepts_wire_names() {
        let patch: TaskPatch =
            serde_json::from_str(r#"{"isMP3": true, "quality": "1080p", "format": "AVI"}"#)
                .unwrap();
        assert_eq!(patch.is_audio_only, Some(true));
        assert_eq!(patch.quality, Some(Quality::P1080));
        assert_eq!(patch.container_format, Some(ContainerFormat::Avi));
        assert_eq!(patch.display_name, None);
    }

    #[test]
    fn fresh_copy_gets_new_id_and_zero_progress() {
        let mut task = Task::new("https://youtu.be/abc123");
        task.apply(&TaskPatch::audio_only(true));
        task.apply_progress(&ProgressSnapshot::complete());

        let copy = task.fresh_copy();
        assert_ne!(copy.id, task.id);
        assert_eq!(copy.progress_percent, 0);
        assert_eq!(copy.source_url, task.source_url);
        assert!(copy.is_audio_only);
        assert_eq!(copy.display_name, task.display_name);
    }
}
