use axum::extract::FromRef;

use crate::catalog::CatalogSource;
use crate::download_manager::DownloadManager;
use crate::match_search::MatchSearcher;
use crate::playlist::PlaylistReconciler;
use crate::rekordbox::RekordboxExporter;
use crate::track_store::TrackStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedTrackStore = Arc<dyn TrackStore>;
pub type GuardedCatalogSource = Arc<dyn CatalogSource>;
pub type GuardedMatchSearcher = Arc<dyn MatchSearcher>;
pub type GuardedDownloadManager = Arc<DownloadManager>;
pub type GuardedPlaylistReconciler = Arc<PlaylistReconciler>;
pub type GuardedExporter = Arc<RekordboxExporter>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub hash: String,
    pub track_store: GuardedTrackStore,
    pub catalog: GuardedCatalogSource,
    pub searcher: GuardedMatchSearcher,
    pub download_manager: GuardedDownloadManager,
    pub reconciler: GuardedPlaylistReconciler,
    pub exporter: GuardedExporter,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedTrackStore {
    fn from_ref(input: &ServerState) -> Self {
        input.track_store.clone()
    }
}

impl FromRef<ServerState> for GuardedCatalogSource {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog.clone()
    }
}

impl FromRef<ServerState> for GuardedMatchSearcher {
    fn from_ref(input: &ServerState) -> Self {
        input.searcher.clone()
    }
}

impl FromRef<ServerState> for GuardedDownloadManager {
    fn from_ref(input: &ServerState) -> Self {
        input.download_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedPlaylistReconciler {
    fn from_ref(input: &ServerState) -> Self {
        input.reconciler.clone()
    }
}

impl FromRef<ServerState> for GuardedExporter {
    fn from_ref(input: &ServerState) -> Self {
        input.exporter.clone()
    }
}
