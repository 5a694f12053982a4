//! Track routes: saved tracks, discovery, catalog detail and presence checks.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use super::state::{GuardedCatalogSource, GuardedTrackStore, ServerState};
use super::ServerConfig;
use crate::catalog::{
    check_track_presence, discover_new_tracks, require_playlist, CatalogTrack, PresenceCheck,
};
use crate::match_search::MatchCandidate;
use crate::track_store::{PrimaryTrack, SavedTrack};

const DEFAULT_PAGE_SIZE: usize = 15;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SavedTracksQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub exclude_in_playlist: bool,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Serialize)]
pub struct SavedTracksResponse {
    pub tracks: Vec<SavedTrack>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct NewTracksResponse {
    pub tracks: Vec<PrimaryTrack>,
}

#[derive(Debug, Serialize)]
pub struct TrackDetail {
    #[serde(flatten)]
    pub track: CatalogTrack,
    pub is_saved: bool,
    pub matches: Vec<MatchCandidate>,
    pub search_error: bool,
}

async fn get_saved_tracks(
    State(store): State<GuardedTrackStore>,
    Query(query): Query<SavedTracksQuery>,
) -> Result<Json<SavedTracksResponse>, ApiError> {
    if query.page == 0 {
        return Err(ApiError::BadRequest("page starts at 1".to_string()));
    }
    if query.page_size == 0 {
        return Err(ApiError::BadRequest("page_size must be positive".to_string()));
    }
    let page_size = query.page_size.min(MAX_PAGE_SIZE);
    let offset = (query.page - 1)
        .checked_mul(page_size)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| ApiError::BadRequest("page is out of range".to_string()))?;

    let (tracks, total) = store.list_saved(query.exclude_in_playlist, page_size, offset)?;
    Ok(Json(SavedTracksResponse {
        tracks,
        total,
        page: query.page,
        page_size,
        total_pages: total.div_ceil(page_size),
    }))
}

async fn get_new_tracks(
    State(catalog): State<GuardedCatalogSource>,
    State(store): State<GuardedTrackStore>,
    State(config): State<ServerConfig>,
) -> Result<Json<NewTracksResponse>, ApiError> {
    let playlist_id = require_playlist(config.source_playlist_id.as_deref())?;
    let tracks = discover_new_tracks(catalog.as_ref(), store.as_ref(), playlist_id).await?;
    Ok(Json(NewTracksResponse { tracks }))
}

/// Catalog detail plus candidates: the confirmed match when there is one,
/// otherwise a live search.
async fn get_track(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<TrackDetail>, ApiError> {
    let track = state.catalog.fetch_track(&id).await?;
    let is_saved = state
        .track_store
        .get_primary(&id)?
        .is_some_and(|primary| primary.is_saved);

    if is_saved {
        if let Some(matched) = state.track_store.get_match(&id)? {
            return Ok(Json(TrackDetail {
                track,
                is_saved,
                matches: vec![MatchCandidate::from(&matched)],
                search_error: false,
            }));
        }
    }

    let outcome = state
        .searcher
        .search(&track.title, &track.artist, state.config.search_result_limit)
        .await;
    let search_error = outcome.is_exhausted();
    if search_error {
        debug!("Search exhausted for track {}", id);
    }
    Ok(Json(TrackDetail {
        track,
        is_saved,
        matches: outcome.into_candidates(),
        search_error,
    }))
}

async fn check_track(
    State(catalog): State<GuardedCatalogSource>,
    State(store): State<GuardedTrackStore>,
    State(config): State<ServerConfig>,
    Path(id): Path<String>,
) -> Result<Json<PresenceCheck>, ApiError> {
    let playlist_id = require_playlist(config.source_playlist_id.as_deref())?;
    match check_track_presence(catalog.as_ref(), store.as_ref(), playlist_id, &id).await? {
        Some(check) => Ok(Json(check)),
        None => Err(ApiError::NotFound(format!("Track {} not found", id))),
    }
}

pub fn track_routes() -> Router<ServerState> {
    Router::new()
        .route("/saved", get(get_saved_tracks))
        .route("/new", get(get_new_tracks))
        .route("/{id}", get(get_track))
        .route("/{id}/check", post(check_track))
}
