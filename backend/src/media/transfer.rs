//! Transfer implementations: over HTTP from a running instance, or in-process

use crate::error::MediaError;
use crate::media::{unique_destination, MediaBackend, Transfer, TransferRequest};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Calls `GET {endpoint}/api/download` and saves the body to `download_dir`
pub struct HttpTransfer {
    client: reqwest::Client,
    endpoint: String,
    download_dir: PathBuf,
}

impl HttpTransfer {
    pub fn new(endpoint: impl Into<String>, download_dir: PathBuf) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("Batchtube/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            download_dir,
        })
    }

    fn download_url(&self) -> String {
        format!("{}/api/download", self.endpoint.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn transfer(&self, request: &TransferRequest) -> Result<PathBuf, MediaError> {
        let response = self
            .client
            .get(self.download_url())
            .query(&[
                ("url", request.url.as_str()),
                ("format", request.container_format.as_str()),
                ("quality", request.quality.as_str()),
                ("isMP3", if request.is_audio_only { "true" } else { "false" }),
                ("bitrate", request.audio_bitrate.as_str()),
                ("fileName", request.file_name.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(MediaError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let content_disposition = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let filename = content_disposition
            .as_deref()
            .and_then(filename_from_content_disposition)
            .unwrap_or_else(|| request.output_file_name());

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let final_path = unique_destination(&self.download_dir, &filename);
        let temp_path = part_path(&final_path);
        let downloaded = match write_part(&temp_path, response).await {
            Ok(downloaded) => downloaded,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        // Rename from .part to final filename
        tokio::fs::rename(&temp_path, &final_path).await?;
        info!("Saved {} bytes to {:?}", downloaded, final_path);

        Ok(final_path)
    }
}

/// Runs the media backend in-process and moves its output to `download_dir`
pub struct LocalTransfer {
    backend: Arc<dyn MediaBackend>,
    download_dir: PathBuf,
}

impl LocalTransfer {
    pub fn new(backend: Arc<dyn MediaBackend>, download_dir: PathBuf) -> Self {
        Self {
            backend,
            download_dir,
        }
    }
}

#[async_trait]
impl Transfer for LocalTransfer {
    async fn transfer(&self, request: &TransferRequest) -> Result<PathBuf, MediaError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        // Work dir on the same filesystem so the final move is a rename
        let work = tempfile::Builder::new()
            .prefix(".batchtube-")
            .tempdir_in(&self.download_dir)?;
        let produced = self.backend.fetch(request, work.path()).await?;

        let final_path = unique_destination(&self.download_dir, &request.output_file_name());
        tokio::fs::rename(&produced, &final_path).await?;
        info!("Saved {:?}", final_path);

        Ok(final_path)
    }
}

/// Stream the response body into `path`. The caller removes the file on error.
async fn write_part(path: &Path, response: reqwest::Response) -> Result<u64, MediaError> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        file.write_all(&bytes).await?;
        downloaded += bytes.len() as u64;
    }
    file.flush().await?;
    Ok(downloaded)
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// File name from a `Content-Disposition` header.
///
/// Prefers RFC 5987 `filename*=UTF-8''...` over a plain `filename=`.
pub fn filename_from_content_disposition(cd: &str) -> Option<String> {
    let mut plain = None;

    for part in cd.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let value = encoded
                .split_once("''")
                .map(|(_, v)| v)
                .unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(value) {
                let name = base_name(&decoded);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            let name = base_name(value.trim_matches('"').trim_matches('\''));
            if !name.is_empty() {
                plain = Some(name);
            }
        }
    }

    plain
}

/// Strip any directory components a server might send
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or("").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VideoMetadata;
    use crate::task::{AudioBitrate, ContainerFormat, Quality};

    #[test]
    fn content_disposition_parsing() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="My clip.mp4""#).as_deref(),
            Some("My clip.mp4")
        );
        assert_eq!(
            filename_from_content_disposition(
                "attachment; filename=\"fallback.mp4\"; filename*=UTF-8''caf%C3%A9.mp4"
            )
            .as_deref(),
            Some("café.mp4")
        );
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="../../etc/passwd""#)
                .as_deref(),
            Some("passwd")
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
    }

    #[test]
    fn part_suffix_is_appended() {
        assert_eq!(
            part_path(Path::new("/d/a.mp4")),
            PathBuf::from("/d/a.mp4.part")
        );
    }

    struct WritesFile;

    #[async_trait]
    impl MediaBackend for WritesFile {
        async fn metadata(&self, _url: &str) -> Result<VideoMetadata, MediaError> {
            Err(MediaError::NoOutput)
        }

        async fn fetch(
            &self,
            request: &TransferRequest,
            dest_dir: &Path,
        ) -> Result<PathBuf, MediaError> {
            let path = dest_dir.join(format!("{}.{}", request.file_name, request.extension()));
            tokio::fs::write(&path, b"media").await?;
            Ok(path)
        }
    }

    #[tokio::test]
    async fn local_transfer_moves_output_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let transfer = LocalTransfer::new(Arc::new(WritesFile), dir.path().to_path_buf());
        let request = TransferRequest {
            url: "https://youtu.be/abc123".into(),
            container_format: ContainerFormat::Webm,
            quality: Quality::Auto,
            is_audio_only: false,
            audio_bitrate: AudioBitrate::Kbps192,
            file_name: "clip".into(),
        };

        let first = transfer.transfer(&request).await.unwrap();
        let second = transfer.transfer(&request).await.unwrap();
        assert_eq!(first, dir.path().join("clip.webm"));
        assert_eq!(second, dir.path().join("clip (1).webm"));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".batchtube-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    mod http {
        use super::*;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn audio_request() -> TransferRequest {
            TransferRequest {
                url: "https://youtu.be/abc123".into(),
                container_format: ContainerFormat::Mp4,
                quality: Quality::P1080,
                is_audio_only: true,
                audio_bitrate: AudioBitrate::Kbps320,
                file_name: "song".into(),
            }
        }

        #[tokio::test]
        async fn saves_body_under_server_file_name() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/download"))
                .and(query_param("url", "https://youtu.be/abc123"))
                .and(query_param("isMP3", "true"))
                .and(query_param("bitrate", "320kbps"))
                .and(query_param("quality", "1080p"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Content-Type", "audio/mp3")
                        .insert_header("Content-Disposition", r#"attachment; filename="song.mp3""#)
                        .set_body_bytes(b"ID3 audio bytes".to_vec()),
                )
                .expect(1)
                .mount(&server)
                .await;

            let dir = tempfile::tempdir().unwrap();
            let transfer = HttpTransfer::new(server.uri(), dir.path().to_path_buf()).unwrap();
            let saved = transfer.transfer(&audio_request()).await.unwrap();

            assert_eq!(saved, dir.path().join("song.mp3"));
            assert_eq!(std::fs::read(&saved).unwrap(), b"ID3 audio bytes");
            assert!(!dir.path().join("song.mp3.part").exists());
        }

        #[tokio::test]
        async fn falls_back_to_request_name_without_header() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/download"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
                .mount(&server)
                .await;

            let dir = tempfile::tempdir().unwrap();
            let transfer =
                HttpTransfer::new(format!("{}/", server.uri()), dir.path().to_path_buf()).unwrap();
            let saved = transfer.transfer(&audio_request()).await.unwrap();
            assert_eq!(saved, dir.path().join("song.mp3"));
        }

        #[tokio::test]
        async fn interrupted_body_leaves_no_part_file() {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            // Promises 100 bytes, sends 5, hangs up
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\
                          Content-Disposition: attachment; filename=\"cut.mp4\"\r\n\r\nshort",
                    )
                    .await;
            });

            let dir = tempfile::tempdir().unwrap();
            let transfer =
                HttpTransfer::new(format!("http://{addr}"), dir.path().to_path_buf()).unwrap();
            assert!(transfer.transfer(&audio_request()).await.is_err());
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }

        #[tokio::test]
        async fn server_error_message_is_surfaced() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/download"))
                .respond_with(
                    ResponseTemplate::new(500)
                        .set_body_string(r#"{"message":"Failed to download video"}"#),
                )
                .mount(&server)
                .await;

            let dir = tempfile::tempdir().unwrap();
            let transfer = HttpTransfer::new(server.uri(), dir.path().to_path_buf()).unwrap();
            let err = transfer.transfer(&audio_request()).await.unwrap_err();

            match err {
                MediaError::Remote { status, message } => {
                    assert_eq!(status, 500);
                    assert_eq!(message, "Failed to download video");
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        }
    }
}
