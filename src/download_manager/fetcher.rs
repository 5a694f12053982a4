//! Streaming audio from the secondary service to a local file.

use super::FetchError;
use crate::config::{DownloadSettings, SearchSettings};
use crate::match_search::api_types::{ApiStreamLocation, ApiTrack};
use crate::match_search::{resolver_from_settings, ClientIdResolver};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Called with `(bytes_so_far, total_bytes)` after every received chunk.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Download the track behind `url` into `dest`, returning the number of bytes written.
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, FetchError>;
}

/// A client for long transfers: `stall_timeout` bounds connecting and each
/// read, never the whole body, so a big file on a slow link still finishes.
pub fn streaming_client(stall_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(stall_timeout)
        .read_timeout(stall_timeout)
        .build()
}

pub struct SoundCloudStreamFetcher {
    client: Client,
    api_base_url: String,
    resolver: Arc<dyn ClientIdResolver>,
}

impl SoundCloudStreamFetcher {
    pub fn new(
        client: Client,
        api_base_url: impl Into<String>,
        resolver: Arc<dyn ClientIdResolver>,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            resolver,
        }
    }

    pub fn from_settings(search: &SearchSettings, download: &DownloadSettings) -> Result<Self> {
        let client = streaming_client(download.request_timeout)?;
        let resolver = resolver_from_settings(&client, search);
        Ok(Self::new(client, search.api_base_url.clone(), resolver))
    }

    /// Resolve a permalink into the signed URL of its progressive stream.
    async fn media_url(&self, permalink: &str, client_id: &str) -> Result<String, FetchError> {
        let resolve_url = format!("{}/resolve", self.api_base_url);
        let response = self
            .client
            .get(&resolve_url)
            .query(&[("url", permalink), ("client_id", client_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let track: ApiTrack = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

        let transcoding = track
            .media
            .into_iter()
            .flat_map(|media| media.transcodings)
            .find(|t| t.format.protocol == "progressive")
            .ok_or(FetchError::NoProgressiveStream)?;
        debug!(
            "Using progressive transcoding {} ({:?})",
            transcoding.url, transcoding.format.mime_type
        );

        let response = self
            .client
            .get(&transcoding.url)
            .query(&[("client_id", client_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let location: ApiStreamLocation = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(location.url)
    }
}

#[async_trait]
impl AudioFetcher for SoundCloudStreamFetcher {
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, FetchError> {
        let client_id = self
            .resolver
            .resolve()
            .await
            .map_err(|e| FetchError::ClientId(e.to_string()))?;
        let media_url = self.media_url(url, &client_id).await?;

        let response = self.client.get(&media_url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let total = response.content_length();

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            progress(downloaded, total);
        }
        file.flush().await?;

        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_search::FixedClientIdResolver;
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const AUDIO_BYTES: usize = 64 * 1024;
    const SLOW_CHUNKS: usize = 8;

    #[derive(Clone)]
    struct StreamServerState {
        base: String,
        progressive: bool,
        slow: bool,
    }

    async fn resolve(
        State(state): State<StreamServerState>,
        Query(params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        assert_eq!(params.get("client_id").map(String::as_str), Some("cid"));
        if params.get("url").map(String::as_str) != Some("https://sc.example/a/song") {
            return StatusCode::NOT_FOUND.into_response();
        }
        let mut transcodings = vec![serde_json::json!({
            "url": format!("{}/media/hls", state.base),
            "format": { "protocol": "hls", "mime_type": "audio/mpeg" }
        })];
        if state.progressive {
            transcodings.push(serde_json::json!({
                "url": format!("{}/media/progressive", state.base),
                "format": { "protocol": "progressive", "mime_type": "audio/mpeg" }
            }));
        }
        Json(serde_json::json!({ "id": 1, "media": { "transcodings": transcodings } }))
            .into_response()
    }

    async fn progressive(State(state): State<StreamServerState>) -> impl IntoResponse {
        let file = if state.slow { "slow.mp3" } else { "audio.mp3" };
        Json(serde_json::json!({ "url": format!("{}/cdn/{}", state.base, file) }))
    }

    async fn audio() -> impl IntoResponse {
        vec![7u8; AUDIO_BYTES]
    }

    /// Eight chunks, 150ms apart.
    async fn slow_audio() -> impl IntoResponse {
        let chunks = futures::stream::iter(0..SLOW_CHUNKS).then(|_| async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, std::io::Error>(vec![7u8; 1024])
        });
        axum::body::Body::from_stream(chunks)
    }

    async fn spawn_stream_server(progressive_available: bool, slow: bool) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let state = StreamServerState {
            base: base.clone(),
            progressive: progressive_available,
            slow,
        };
        let app = Router::new()
            .route("/resolve", get(resolve))
            .route("/media/progressive", get(progressive))
            .route("/cdn/audio.mp3", get(audio))
            .route("/cdn/slow.mp3", get(slow_audio))
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    fn fetcher_for(base: &str) -> SoundCloudStreamFetcher {
        SoundCloudStreamFetcher::new(
            Client::new(),
            base,
            Arc::new(FixedClientIdResolver::new("cid")),
        )
    }

    #[tokio::test]
    async fn test_fetches_progressive_stream() {
        let base = spawn_stream_server(true, false).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("song.part");
        let seen = Mutex::new(Vec::new());
        let record = |done: u64, total: Option<u64>| seen.lock().unwrap().push((done, total));

        let bytes = fetcher_for(&base)
            .fetch_to_file("https://sc.example/a/song", &dest, &record)
            .await
            .unwrap();

        assert_eq!(bytes, AUDIO_BYTES as u64);
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), AUDIO_BYTES as u64);
        let seen = seen.into_inner().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(
            seen.last(),
            Some(&(AUDIO_BYTES as u64, Some(AUDIO_BYTES as u64)))
        );
    }

    #[tokio::test]
    async fn test_hls_only_track_fails() {
        let base = spawn_stream_server(false, false).await;
        let dir = TempDir::new().unwrap();

        let err = fetcher_for(&base)
            .fetch_to_file("https://sc.example/a/song", &dir.path().join("x"), &|_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NoProgressiveStream), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unknown_permalink_fails_with_status() {
        let base = spawn_stream_server(true, false).await;
        let dir = TempDir::new().unwrap();

        let err = fetcher_for(&base)
            .fetch_to_file("https://sc.example/other", &dir.path().join("x"), &|_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status(404)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_slow_transfer_outlasting_stall_timeout_completes() {
        let base = spawn_stream_server(true, true).await;
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("slow.part");
        // The body takes ~1.2s in total, each chunk arrives well within 500ms.
        let fetcher = SoundCloudStreamFetcher::new(
            streaming_client(Duration::from_millis(500)).unwrap(),
            &base,
            Arc::new(FixedClientIdResolver::new("cid")),
        );

        let bytes = fetcher
            .fetch_to_file("https://sc.example/a/song", &dest, &|_, _| {})
            .await
            .unwrap();

        assert_eq!(bytes, (SLOW_CHUNKS * 1024) as u64);
    }
}
