//! Playlist routes. Every mutation goes through the reconciler so the
//! playlist directories follow the database.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::{GuardedPlaylistReconciler, GuardedTrackStore, ServerState};
use crate::track_store::{
    AddMembershipOutcome, CreatePlaylistOutcome, DownloadStatus, Playlist, PlaylistEntry,
    PlaylistSummary, PrimaryTrack, RemoveMembershipOutcome,
};

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddTrackBody {
    pub track_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistsResponse {
    pub playlists: Vec<PlaylistSummary>,
}

#[derive(Debug, Serialize)]
pub struct PlaylistTrack {
    pub position: usize,
    pub added_at: i64,
    #[serde(flatten)]
    pub track: PrimaryTrack,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub download_status: Option<DownloadStatus>,
}

impl From<PlaylistEntry> for PlaylistTrack {
    fn from(entry: PlaylistEntry) -> Self {
        let (bpm, key, download_status) = match entry.matched {
            Some(m) => (m.bpm, m.musical_key, Some(m.download_status)),
            None => (None, None, None),
        };
        PlaylistTrack {
            position: entry.position,
            added_at: entry.added_at,
            track: entry.track,
            bpm,
            key,
            download_status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlaylistTracksResponse {
    pub playlist: Playlist,
    pub tracks: Vec<PlaylistTrack>,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub success: bool,
    pub playlist_id: i64,
    pub track_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

fn playlist_not_found(playlist_id: i64) -> ApiError {
    ApiError::NotFound(format!("Playlist {} not found", playlist_id))
}

async fn list_playlists(
    State(store): State<GuardedTrackStore>,
) -> Result<Json<PlaylistsResponse>, ApiError> {
    Ok(Json(PlaylistsResponse {
        playlists: store.list_playlists()?,
    }))
}

async fn create_playlist(
    State(reconciler): State<GuardedPlaylistReconciler>,
    Json(body): Json<CreatePlaylistBody>,
) -> Result<(StatusCode, Json<Playlist>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Playlist name is required".to_string()));
    }
    let description = body
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    match reconciler.create_playlist(name, description).await? {
        CreatePlaylistOutcome::Created(playlist) => Ok((StatusCode::CREATED, Json(playlist))),
        CreatePlaylistOutcome::NameTaken => Err(ApiError::Conflict(format!(
            "A playlist named '{}' already exists",
            name
        ))),
        CreatePlaylistOutcome::FolderTaken(owner) => Err(ApiError::Conflict(format!(
            "Playlist '{}' would share its folder with playlist '{}'",
            name, owner
        ))),
    }
}

async fn get_playlist(
    State(store): State<GuardedTrackStore>,
    Path(playlist_id): Path<i64>,
) -> Result<Json<Playlist>, ApiError> {
    store
        .get_playlist(playlist_id)?
        .map(Json)
        .ok_or_else(|| playlist_not_found(playlist_id))
}

async fn delete_playlist(
    State(reconciler): State<GuardedPlaylistReconciler>,
    Path(playlist_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    match reconciler.delete_playlist(playlist_id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(playlist_not_found(playlist_id)),
    }
}

async fn get_playlist_tracks(
    State(store): State<GuardedTrackStore>,
    Path(playlist_id): Path<i64>,
) -> Result<Json<PlaylistTracksResponse>, ApiError> {
    let playlist = store
        .get_playlist(playlist_id)?
        .ok_or_else(|| playlist_not_found(playlist_id))?;
    let tracks = store
        .list_playlist_entries(playlist_id)?
        .into_iter()
        .map(PlaylistTrack::from)
        .collect();
    Ok(Json(PlaylistTracksResponse { playlist, tracks }))
}

async fn add_playlist_track(
    State(reconciler): State<GuardedPlaylistReconciler>,
    Path(playlist_id): Path<i64>,
    Json(body): Json<AddTrackBody>,
) -> Result<(StatusCode, Json<MembershipResponse>), ApiError> {
    let track_id = body
        .track_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing track_id".to_string()))?;

    match reconciler.add_track(playlist_id, &track_id).await? {
        AddMembershipOutcome::Added { position, .. } => Ok((
            StatusCode::CREATED,
            Json(MembershipResponse {
                success: true,
                playlist_id,
                track_id,
                position: Some(position),
            }),
        )),
        AddMembershipOutcome::PlaylistNotFound => Err(playlist_not_found(playlist_id)),
        AddMembershipOutcome::TrackNotFound => {
            Err(ApiError::NotFound(format!("Track {} not found", track_id)))
        }
        AddMembershipOutcome::AlreadyInPlaylist => Err(ApiError::Conflict(format!(
            "Track {} is already in a playlist",
            track_id
        ))),
        AddMembershipOutcome::DuplicateMembership => Err(ApiError::Conflict(format!(
            "Track {} is already in playlist {}",
            track_id, playlist_id
        ))),
    }
}

async fn remove_playlist_track(
    State(reconciler): State<GuardedPlaylistReconciler>,
    Path((playlist_id, track_id)): Path<(i64, String)>,
) -> Result<Json<MembershipResponse>, ApiError> {
    match reconciler.remove_track(playlist_id, &track_id).await? {
        RemoveMembershipOutcome::Removed { .. } => Ok(Json(MembershipResponse {
            success: true,
            playlist_id,
            track_id,
            position: None,
        })),
        RemoveMembershipOutcome::PlaylistNotFound => Err(playlist_not_found(playlist_id)),
        RemoveMembershipOutcome::TrackNotFound => {
            Err(ApiError::NotFound(format!("Track {} not found", track_id)))
        }
        RemoveMembershipOutcome::NotMember => Err(ApiError::NotFound(format!(
            "Track {} is not in playlist {}",
            track_id, playlist_id
        ))),
    }
}

pub fn playlist_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_playlists).post(create_playlist))
        .route("/{id}", get(get_playlist).delete(delete_playlist))
        .route(
            "/{id}/tracks",
            get(get_playlist_tracks).post(add_playlist_track),
        )
        .route("/{id}/tracks/{track_id}", delete(remove_playlist_track))
}
