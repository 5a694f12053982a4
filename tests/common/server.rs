//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own database and download root,
//! wired to the fakes in `fakes.rs`.

use super::constants::*;
use super::fakes::{CopyTranscoder, FakeCatalog, FakeFetcher, FakeSearcher, FixedAnalyzer};
use cratedigger_server::download_manager::DownloadManager;
use cratedigger_server::library::LibraryPaths;
use cratedigger_server::playlist::PlaylistReconciler;
use cratedigger_server::rekordbox::RekordboxExporter;
use cratedigger_server::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use cratedigger_server::{SqliteTrackStore, TrackStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with an isolated database and download root.
///
/// When dropped, the server shuts down and the temp directories are removed.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub port: u16,

    /// Track store for direct database access in tests
    pub track_store: Arc<dyn TrackStore>,

    /// Root the downloads and playlist folders are written to
    pub download_root: PathBuf,

    failing_downloads: Arc<AtomicBool>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port and waits until it answers.
    ///
    /// # Panics
    ///
    /// Panics if the database cannot be created, the port cannot be bound or
    /// the server doesn't become ready within the timeout.
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let download_root = temp_dir.path().join("downloads");
        std::fs::create_dir_all(&download_root).expect("Failed to create download root");

        let track_store: Arc<dyn TrackStore> = Arc::new(
            SqliteTrackStore::new(temp_dir.path().join("cratedigger.db"))
                .expect("Failed to open track store"),
        );
        let paths = LibraryPaths::new(download_root.clone());
        let failing_downloads = Arc::new(AtomicBool::new(false));

        let download_manager = Arc::new(DownloadManager::new(
            track_store.clone(),
            Arc::new(FakeFetcher {
                failing: failing_downloads.clone(),
            }),
            Arc::new(CopyTranscoder),
            Arc::new(FixedAnalyzer),
            paths.clone(),
            2,
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let state = ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                source_playlist_id: Some(SOURCE_PLAYLIST_ID.to_string()),
                ..ServerConfig::default()
            },
            start_time: Instant::now(),
            hash: "e2e".to_string(),
            track_store: track_store.clone(),
            catalog: Arc::new(FakeCatalog::new()),
            searcher: Arc::new(FakeSearcher),
            download_manager,
            reconciler: Arc::new(PlaylistReconciler::new(track_store.clone(), paths)),
            exporter: Arc::new(RekordboxExporter::new(track_store.clone(), "Cratedigger")),
        };
        let app = make_app(state);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            track_store,
            download_root,
            failing_downloads,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    /// Make every following download fail (or succeed again).
    pub fn set_downloads_failing(&self, failing: bool) {
        self.failing_downloads.store(failing, Ordering::SeqCst);
    }

    /// Directory the server writes temp files into, for export fixtures.
    pub fn temp_path(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
