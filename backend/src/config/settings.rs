//! Settings data structures

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::progress::SimulationProfile;

/// Product variant. Decides the defaults for queue capacity, history size
/// and the simulated progress cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    #[default]
    Simple,
    Pro,
}

impl Edition {
    pub fn max_tasks(self) -> usize {
        match self {
            Self::Simple => 10,
            Self::Pro => 1000,
        }
    }

    pub fn history_limit(self) -> usize {
        match self {
            Self::Simple => 50,
            Self::Pro => 100,
        }
    }

    pub fn tick_interval_ms(self) -> u64 {
        match self {
            Self::Simple => 1000,
            Self::Pro => 500,
        }
    }

    pub fn progress_step(self) -> u8 {
        match self {
            Self::Simple => 5,
            Self::Pro => 10,
        }
    }
}

/// How a download run produces its result.
///
/// `Simulated` never touches the network: every task only runs the
/// synthetic progress timer. `Transfer` calls the media backend for real
/// and uses the timer as visual feedback alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    #[default]
    Transfer,
    Simulated,
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Variant that drives the defaults below
    pub edition: Edition,

    /// Whether downloads are real or simulated
    pub mode: DownloadMode,

    /// Server configuration
    pub server: ServerSettings,

    /// Queue and history bounds
    pub queue: QueueSettings,

    /// Synthetic progress parameters
    pub simulation: SimulationSettings,

    /// Clipboard capture
    pub clipboard: ClipboardSettings,

    /// External extractor and transfer configuration
    pub media: MediaSettings,
}

impl Settings {
    /// Default settings for the given edition
    pub fn for_edition(edition: Edition) -> Self {
        Self {
            edition,
            ..Self::default()
        }
    }

    /// Maximum number of live tasks in the queue
    pub fn max_tasks(&self) -> usize {
        self.queue
            .max_tasks
            .unwrap_or_else(|| self.edition.max_tasks())
    }

    /// Number of history entries retained after every append
    pub fn history_limit(&self) -> usize {
        self.queue
            .history_limit
            .unwrap_or_else(|| self.edition.history_limit())
    }

    /// Progress simulator parameters, edition defaults filled in
    pub fn simulation_profile(&self) -> SimulationProfile {
        let sim = &self.simulation;
        SimulationProfile {
            tick_interval: Duration::from_millis(
                sim.tick_interval_ms
                    .unwrap_or_else(|| self.edition.tick_interval_ms())
                    .max(1),
            ),
            step: sim
                .step
                .unwrap_or_else(|| self.edition.progress_step())
                .clamp(1, 100),
            eta_seconds_per_step: sim.eta_seconds_per_step,
            size_range_mb: (sim.min_size_mb, sim.max_size_mb.max(sim.min_size_mb + 1)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Optional overrides of the edition's queue bounds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tasks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Tick interval override in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,

    /// Percent added per tick override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,

    /// Seconds of remaining time shown per remaining step
    pub eta_seconds_per_step: u64,

    /// Lower bound (inclusive) of the synthetic file size
    pub min_size_mb: u32,

    /// Upper bound (exclusive) of the synthetic file size
    pub max_size_mb: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: None,
            step: None,
            eta_seconds_per_step: 2,
            min_size_mb: 100,
            max_size_mb: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardSettings {
    /// Start the clipboard watcher at launch
    pub enabled: bool,

    /// Polling period in milliseconds
    pub poll_interval_ms: u64,

    /// Substrings that mark clipboard text as a video URL
    pub host_patterns: Vec<String>,
}

impl ClipboardSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ClipboardSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: 2000,
            host_patterns: vec![
                "youtube.com/watch".to_string(),
                "youtu.be/".to_string(),
                "youtube.com/shorts/".to_string(),
                "m.youtube.com/watch".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Extractor binary (yt-dlp compatible command line)
    pub ytdlp_path: PathBuf,

    /// Transcoder location handed to the extractor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Where finished downloads are saved
    pub download_dir: PathBuf,

    /// Base URL of a remote instance exposing `/api/download`.
    /// When unset, transfers run in-process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_endpoint: Option<String>,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: PathBuf::from("yt-dlp"),
            ffmpeg_path: None,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from("./downloads")),
            transfer_endpoint: None,
        }
    }
}
