//! Match routes: confirm a match, tear it down, poll and retry its download.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiError;
use super::state::{
    GuardedDownloadManager, GuardedPlaylistReconciler, GuardedTrackStore, ServerState,
};
use crate::download_manager::DownloadJob;
use crate::match_search::MatchCandidate;
use crate::playlist::MatchRemoval;
use crate::track_store::{
    DownloadStatus, MatchedTrack, NewMatch, NewPrimaryTrack, RetryClaim, SaveMatchOutcome,
};

#[derive(Debug, Deserialize)]
pub struct SaveMatchBody {
    pub track_id: Option<String>,
    #[serde(rename = "match")]
    pub candidate: Option<MatchCandidate>,
    /// Primary track metadata, used when the track was never discovered.
    #[serde(default)]
    pub track_title: Option<String>,
    #[serde(default)]
    pub track_artist: Option<String>,
    #[serde(default)]
    pub track_artwork_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadStatusResponse {
    pub has_match: bool,
    pub download_status: Option<DownloadStatus>,
    pub download_progress: u8,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    #[serde(rename = "match")]
    pub matched: Option<MatchedTrack>,
}

impl DownloadStatusResponse {
    fn unmatched() -> Self {
        DownloadStatusResponse {
            has_match: false,
            download_status: None,
            download_progress: 0,
            bpm: None,
            key: None,
            matched: None,
        }
    }
}

impl From<MatchedTrack> for DownloadStatusResponse {
    fn from(matched: MatchedTrack) -> Self {
        DownloadStatusResponse {
            has_match: true,
            download_status: Some(matched.download_status),
            download_progress: matched.download_progress,
            bpm: matched.bpm,
            key: matched.musical_key.clone(),
            matched: Some(matched),
        }
    }
}

/// Record the chosen match as `pending` and launch its download.
async fn save_match(
    State(store): State<GuardedTrackStore>,
    State(downloads): State<GuardedDownloadManager>,
    Json(body): Json<SaveMatchBody>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let track_id = body
        .track_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing track_id".to_string()))?;
    let candidate = body
        .candidate
        .ok_or_else(|| ApiError::BadRequest("Missing match".to_string()))?;
    if candidate.id.is_empty() || candidate.url.is_empty() {
        return Err(ApiError::BadRequest(
            "Match requires an id and a url".to_string(),
        ));
    }

    if store.get_primary(&track_id)?.is_none() {
        if let (Some(title), Some(artist)) = (body.track_title, body.track_artist) {
            store.upsert_primary(NewPrimaryTrack {
                external_id: track_id.clone(),
                title,
                artist,
                artwork_url: body.track_artwork_url,
                added_at: chrono::Utc::now().timestamp(),
            })?;
        }
    }

    let matched = match store.save_match(&track_id, NewMatch::from(candidate))? {
        SaveMatchOutcome::Saved(matched) => matched,
        SaveMatchOutcome::TrackNotFound => {
            return Err(ApiError::NotFound(format!("Track {} not found", track_id)))
        }
        SaveMatchOutcome::MatchTaken => {
            return Err(ApiError::Conflict(
                "Match is already assigned to another track".to_string(),
            ))
        }
    };

    info!(
        "Saved match {} for track {}, starting download",
        matched.external_id, track_id
    );
    downloads.submit(DownloadJob::from(&matched));

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            success: true,
            message: "Match saved, download started".to_string(),
        }),
    ))
}

async fn delete_match(
    State(reconciler): State<GuardedPlaylistReconciler>,
    Path(track_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    match reconciler.delete_match(&track_id).await? {
        MatchRemoval::Removed => Ok(Json(MessageResponse {
            success: true,
            message: "Match deleted".to_string(),
        })),
        MatchRemoval::NoMatch => Err(ApiError::NotFound(format!(
            "Track {} has no match",
            track_id
        ))),
        MatchRemoval::TrackNotFound => {
            Err(ApiError::NotFound(format!("Track {} not found", track_id)))
        }
    }
}

async fn get_download_status(
    State(store): State<GuardedTrackStore>,
    Path(track_id): Path<String>,
) -> Result<Json<DownloadStatusResponse>, ApiError> {
    if store.get_primary(&track_id)?.is_none() {
        return Err(ApiError::NotFound(format!("Track {} not found", track_id)));
    }
    Ok(Json(match store.get_match(&track_id)? {
        Some(matched) => matched.into(),
        None => DownloadStatusResponse::unmatched(),
    }))
}

async fn retry_download(
    State(store): State<GuardedTrackStore>,
    State(downloads): State<GuardedDownloadManager>,
    Path(track_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    match store.claim_retry(&track_id)? {
        RetryClaim::Claimed(matched) => {
            info!("Retrying download of track {}", track_id);
            downloads.submit(DownloadJob::from(&matched));
            Ok(Json(MessageResponse {
                success: true,
                message: "Download restarted".to_string(),
            }))
        }
        RetryClaim::NotFailed(status) => Err(ApiError::Conflict(format!(
            "Can only retry failed downloads, current status is {}",
            status.as_db_str()
        ))),
        RetryClaim::NoMatch => Err(ApiError::NotFound(format!(
            "Track {} has no match",
            track_id
        ))),
        RetryClaim::TrackNotFound => {
            Err(ApiError::NotFound(format!("Track {} not found", track_id)))
        }
    }
}

pub fn match_routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(save_match))
        .route("/{id}", delete(delete_match))
        .route("/{id}/download", get(get_download_status))
        .route("/{id}/retry", post(retry_download))
}
