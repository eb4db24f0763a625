//! Thin wrapper over a yt-dlp compatible extractor binary.
//!
//! Format selection and transcoding are left to the extractor (and the
//! ffmpeg it drives); this module only builds the command line and reads
//! back its JSON or output file.

use crate::error::MediaError;
use crate::media::{
    sanitize_file_name, validate_url, FormatInfo, MediaBackend, TransferRequest, VideoMetadata,
};
use crate::task::{ContainerFormat, Quality};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    binary: PathBuf,
    ffmpeg: Option<PathBuf>,
}

impl YtDlpBackend {
    pub fn new(binary: impl Into<PathBuf>, ffmpeg: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg,
        }
    }

    async fn run(&self, args: &[String]) -> Result<Output, MediaError> {
        debug!("Running {:?} {:?}", self.binary, args);
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::Extractor {
                status: output.status.to_string(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), 5),
            });
        }
        Ok(output)
    }

    /// Command line for one download into `dest_dir`
    pub fn fetch_args(&self, request: &TransferRequest, dest_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--no-warnings".to_string(),
        ];

        if request.is_audio_only {
            args.extend([
                "-f".to_string(),
                "bestaudio/best".to_string(),
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
                "--audio-quality".to_string(),
                format!("{}K", request.audio_bitrate.kbps()),
            ]);
        } else {
            args.extend(["-f".to_string(), format_selector(request.quality)]);
            let ext = request.container_format.extension().to_string();
            match request.container_format {
                ContainerFormat::Avi => args.extend(["--recode-video".to_string(), ext]),
                ContainerFormat::Mp4 | ContainerFormat::Webm => {
                    args.extend(["--remux-video".to_string(), ext])
                }
            }
        }

        if let Some(ffmpeg) = &self.ffmpeg {
            args.extend([
                "--ffmpeg-location".to_string(),
                ffmpeg.to_string_lossy().into_owned(),
            ]);
        }

        // `%` is literal in the output path, only `%(ext)s` is a field
        let stem = dest_dir.join(sanitize_file_name(&request.file_name));
        let template = format!("{}.%(ext)s", stem.to_string_lossy().replace('%', "%%"));
        args.extend([
            "-o".to_string(),
            template,
            "--".to_string(),
            request.url.clone(),
        ]);
        args
    }
}

/// Best stream not taller than the requested quality
fn format_selector(quality: Quality) -> String {
    match quality.max_height() {
        None => "bestvideo+bestaudio/best".to_string(),
        Some(h) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]"),
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<RawThumbnail>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
struct RawThumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_note: Option<String>,
    height: Option<u32>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

impl RawFormat {
    fn has_audio_and_video(&self) -> bool {
        let present = |codec: &Option<String>| codec.as_deref().is_some_and(|c| c != "none");
        present(&self.vcodec) && present(&self.acodec)
    }

    fn quality_label(&self) -> String {
        match (&self.format_note, self.height) {
            (Some(note), _) if note.ends_with('p') => note.clone(),
            (_, Some(h)) => format!("{h}p"),
            (Some(note), None) => note.clone(),
            (None, None) => "unknown".to_string(),
        }
    }
}

/// Reduce extractor JSON to the fields the UI shows
pub fn parse_metadata(raw: &[u8]) -> Result<VideoMetadata, MediaError> {
    let info: RawInfo = serde_json::from_slice(raw)?;
    let thumbnail_url = info
        .thumbnail
        .or_else(|| info.thumbnails.first().map(|t| t.url.clone()));

    let formats = info
        .formats
        .iter()
        .filter(|f| f.has_audio_and_video())
        .map(|f| FormatInfo {
            quality: f.quality_label(),
            container: f.ext.clone().unwrap_or_default(),
            file_size_bytes: f.filesize.or(f.filesize_approx).unwrap_or(0),
        })
        .collect();

    Ok(VideoMetadata {
        title: info.title,
        duration_seconds: info.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
        thumbnail_url,
        formats,
    })
}

/// The finished file the extractor wrote for `stem`
async fn find_output(dest_dir: &Path, stem: &str) -> Result<PathBuf, MediaError> {
    let mut entries = tokio::fs::read_dir(dest_dir).await?;
    let mut fallback = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let is_partial = path
            .extension()
            .is_some_and(|ext| ext == "part" || ext == "ytdl");
        if is_partial {
            continue;
        }
        if path.file_stem().is_some_and(|s| s == stem) {
            return Ok(path);
        }
        fallback.get_or_insert(path);
    }

    fallback.ok_or(MediaError::NoOutput)
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    async fn metadata(&self, url: &str) -> Result<VideoMetadata, MediaError> {
        let url = validate_url(url)?;
        let args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--".to_string(),
            url.to_string(),
        ];
        let output = self.run(&args).await?;
        parse_metadata(&output.stdout)
    }

    async fn fetch(
        &self,
        request: &TransferRequest,
        dest_dir: &Path,
    ) -> Result<PathBuf, MediaError> {
        validate_url(&request.url)?;
        tokio::fs::create_dir_all(dest_dir).await?;

        info!("Extracting {} -> {}", request.url, request.output_file_name());
        self.run(&self.fetch_args(request, dest_dir)).await?;
        find_output(dest_dir, &sanitize_file_name(&request.file_name)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::AudioBitrate;

    fn request() -> TransferRequest {
        TransferRequest {
            url: "https://youtu.be/abc123".to_string(),
            container_format: ContainerFormat::Mp4,
            quality: Quality::P720,
            is_audio_only: false,
            audio_bitrate: AudioBitrate::Kbps192,
            file_name: "clip".to_string(),
        }
    }

    #[test]
    fn video_args_cap_height_and_remux() {
        let backend = YtDlpBackend::new("yt-dlp", None);
        let args = backend.fetch_args(&request(), Path::new("/tmp/out"));

        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "bestvideo[height<=720]+bestaudio/best[height<=720]");
        let remux = args.iter().position(|a| a == "--remux-video").unwrap();
        assert_eq!(args[remux + 1], "mp4");
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc123");
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
    }

    #[test]
    fn avi_is_recoded_and_auto_picks_best() {
        let backend = YtDlpBackend::new("yt-dlp", Some(PathBuf::from("/opt/ffmpeg")));
        let mut req = request();
        req.container_format = ContainerFormat::Avi;
        req.quality = Quality::Auto;
        let args = backend.fetch_args(&req, Path::new("/tmp/out"));

        assert!(args.contains(&"bestvideo+bestaudio/best".to_string()));
        assert!(args.contains(&"--recode-video".to_string()));
        assert!(args.contains(&"/opt/ffmpeg".to_string()));
    }

    #[test]
    fn audio_args_extract_mp3_at_bitrate() {
        let backend = YtDlpBackend::new("yt-dlp", None);
        let mut req = request();
        req.is_audio_only = true;
        req.audio_bitrate = AudioBitrate::Kbps320;
        let args = backend.fetch_args(&req, Path::new("/tmp/out"));

        assert!(args.contains(&"-x".to_string()));
        assert!(args.contains(&"320K".to_string()));
        assert!(!args.contains(&"--remux-video".to_string()));
    }

    #[test]
    fn percent_in_name_is_escaped_in_template() {
        let backend = YtDlpBackend::new("yt-dlp", None);
        let mut req = request();
        req.file_name = "50% off".to_string();
        let args = backend.fetch_args(&req, Path::new("/tmp/out"));

        let o = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(args[o + 1], "/tmp/out/50%% off.%(ext)s");
    }

    #[test]
    fn metadata_keeps_only_muxed_formats() {
        let raw = br#"{
            "title": "A video",
            "duration": 212.4,
            "thumbnails": [{"url": "https://i.ytimg.com/a.jpg"}],
            "formats": [
                {"format_note": "720p", "height": 720, "ext": "mp4",
                 "vcodec": "avc1", "acodec": "mp4a", "filesize": 1000},
                {"height": 360, "ext": "webm", "vcodec": "vp9", "acodec": "opus",
                 "filesize_approx": 500},
                {"format_note": "1080p", "height": 1080, "ext": "mp4",
                 "vcodec": "avc1", "acodec": "none", "filesize": 9000},
                {"format_note": "medium", "ext": "m4a", "vcodec": "none", "acodec": "mp4a"}
            ]
        }"#;

        let meta = parse_metadata(raw).unwrap();
        assert_eq!(meta.title, "A video");
        assert_eq!(meta.duration_seconds, 212);
        assert_eq!(meta.thumbnail_url.as_deref(), Some("https://i.ytimg.com/a.jpg"));
        assert_eq!(
            meta.formats,
            vec![
                FormatInfo {
                    quality: "720p".into(),
                    container: "mp4".into(),
                    file_size_bytes: 1000
                },
                FormatInfo {
                    quality: "360p".into(),
                    container: "webm".into(),
                    file_size_bytes: 500
                },
            ]
        );
    }

    #[tokio::test]
    async fn output_lookup_skips_partials() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4.part"), b"x").unwrap();
        assert!(matches!(
            find_output(dir.path(), "clip").await,
            Err(MediaError::NoOutput)
        ));

        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();
        assert_eq!(
            find_output(dir.path(), "clip").await.unwrap(),
            dir.path().join("clip.mp4")
        );
    }

    #[tokio::test]
    async fn missing_binary_is_an_io_error() {
        let backend = YtDlpBackend::new("batchtube-no-such-extractor", None);
        let err = backend.metadata("https://youtu.be/abc123").await.unwrap_err();
        assert!(matches!(err, MediaError::Io(_)));

        let err = backend.metadata("").await.unwrap_err();
        assert!(matches!(err, MediaError::MissingUrl));
    }
}
