//! Metadata and download endpoints backed by the media extractor

use crate::media::{validate_url, TransferRequest, VideoMetadata};
use crate::server::routes::AppError;
use crate::task::{AudioBitrate, ContainerFormat, Quality};
use crate::AppState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct VideoInfoQuery {
    #[serde(default)]
    pub url: String,
}

/// Title, duration, thumbnail and muxed formats for one URL
pub async fn video_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VideoInfoQuery>,
) -> Result<Json<VideoMetadata>, AppError> {
    let url = validate_url(&query.url)
        .map_err(|e| AppError::from_media(e, "Failed to fetch video info"))?;
    let metadata = state
        .media
        .metadata(url.as_str())
        .await
        .map_err(|e| AppError::from_media(e, "Failed to fetch video info"))?;
    Ok(Json(metadata))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadQuery {
    #[serde(default)]
    pub url: String,
    pub format: Option<String>,
    pub quality: Option<String>,
    #[serde(default, rename = "isMP3")]
    pub is_mp3: bool,
    pub bitrate: Option<String>,
    pub file_name: Option<String>,
}

fn parse_or_default<T: FromStr + Default>(raw: Option<&str>) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => T::from_str(raw).map_err(|e| AppError::BadRequest(e.to_string())),
        None => Ok(T::default()),
    }
}

impl DownloadQuery {
    fn into_request(self) -> Result<TransferRequest, AppError> {
        let url = validate_url(&self.url)
            .map_err(|e| AppError::from_media(e, "Failed to download video"))?;
        let file_name = self
            .file_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "video".to_string());

        Ok(TransferRequest {
            url: url.to_string(),
            container_format: parse_or_default::<ContainerFormat>(self.format.as_deref())?,
            quality: parse_or_default::<Quality>(self.quality.as_deref())?,
            is_audio_only: self.is_mp3,
            audio_bitrate: parse_or_default::<AudioBitrate>(self.bitrate.as_deref())?,
            file_name,
        })
    }
}

/// Run the extractor and stream the finished file back as an attachment
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let request = query.into_request()?;
    let failure = "Failed to download video";

    let work = tempfile::tempdir()
        .map_err(|e| AppError::from_media(e.into(), failure))?;
    let produced = state
        .media
        .fetch(&request, work.path())
        .await
        .map_err(|e| AppError::from_media(e, failure))?;
    let file = tokio::fs::File::open(&produced)
        .await
        .map_err(|e| AppError::from_media(e.into(), failure))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| AppError::from_media(e.into(), failure))?
        .len();

    let file_name = request.output_file_name();
    info!("Serving {} ({} bytes)", file_name, size);

    // The work dir lives until the last chunk has been sent
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _ = &work;
        chunk
    });

    Ok((
        [
            (header::CONTENT_TYPE, request.content_type()),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
            (header::CONTENT_LENGTH, size.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// `attachment` header with an ASCII fallback and an RFC 5987 UTF-8 name
pub fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && c != '"' && !c.is_control() { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::transfer::filename_from_content_disposition;

    #[test]
    fn disposition_round_trips_unicode_names() {
        let header = content_disposition("café \"live\".mp3");
        assert!(header.starts_with("attachment; filename=\"caf_ _live_.mp3\""));
        assert_eq!(
            filename_from_content_disposition(&header).as_deref(),
            Some("café \"live\".mp3")
        );
    }

    #[test]
    fn query_options_parse_case_insensitively() {
        let query = DownloadQuery {
            url: "https://youtu.be/abc123".into(),
            format: Some("webm".into()),
            quality: Some("1080P".into()),
            is_mp3: false,
            bitrate: None,
            file_name: Some("clip".into()),
        };
        let request = query.into_request().unwrap();
        assert_eq!(request.container_format, ContainerFormat::Webm);
        assert_eq!(request.quality, Quality::P1080);
        assert_eq!(request.audio_bitrate, AudioBitrate::Kbps192);
    }

    #[test]
    fn unknown_quality_is_a_bad_request() {
        let query = DownloadQuery {
            url: "https://youtu.be/abc123".into(),
            format: None,
            quality: Some("8K".into()),
            is_mp3: false,
            bitrate: None,
            file_name: None,
        };
        assert!(matches!(query.into_request(), Err(AppError::BadRequest(_))));
    }
}
