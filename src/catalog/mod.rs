//! Client for the primary streaming catalog and the flows built on it.

mod discovery;
mod spotify;

pub(crate) use discovery::require_playlist;
pub use discovery::{check_track_presence, discover_new_tracks, PresenceCheck};
pub use spotify::SpotifyCatalogClient;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Batch size used while walking the source playlist for new tracks.
pub const DISCOVERY_BATCH_SIZE: usize = 50;
/// How many untriaged tracks discovery returns.
pub const DISCOVERY_RESULT_SIZE: usize = 15;
/// Page size used by the presence check.
pub const PRESENCE_PAGE_SIZE: usize = 100;
/// The presence check gives up past this offset.
pub const PRESENCE_MAX_OFFSET: usize = 10_000;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog credentials are not configured")]
    MissingCredentials,

    #[error("catalog playlist id is not configured")]
    MissingPlaylist,

    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned status {status} for {context}")]
    Status { status: u16, context: String },

    #[error("catalog item not found: {0}")]
    NotFound(String),

    #[error("invalid catalog response: {0}")]
    InvalidResponse(String),
}

/// A track as the catalog describes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogTrack {
    #[serde(rename = "track_id")]
    pub id: String,
    pub title: String,
    /// Artist names joined with ", ".
    pub artist: String,
    pub artwork_url: Option<String>,
    pub preview_url: Option<String>,
    pub duration_ms: Option<i64>,
    pub album_name: Option<String>,
    pub release_date: Option<String>,
}

/// One row of the source playlist. `track` is `None` for entries the catalog
/// can no longer resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub track: Option<CatalogTrack>,
    /// Unix seconds.
    pub added_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistPage {
    pub items: Vec<PlaylistItem>,
    pub total: usize,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch a fresh bearer token.
    async fn fetch_access_token(&self) -> Result<String, CatalogError>;

    async fn fetch_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<PlaylistPage, CatalogError>;

    async fn fetch_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError>;
}
