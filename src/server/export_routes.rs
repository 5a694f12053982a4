use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::{GuardedExporter, ServerState};

#[derive(Debug, Deserialize)]
pub struct ExportBody {
    #[serde(default, alias = "database_path")]
    pub library_path: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub success: bool,
    pub message: String,
    pub added_playlists: usize,
    pub added_tracks: usize,
}

async fn export_rekordbox(
    State(exporter): State<GuardedExporter>,
    Json(body): Json<ExportBody>,
) -> Result<Json<ExportResponse>, ApiError> {
    let summary = exporter.export(&body.library_path).await?;
    let message = if summary.added_playlists == 0 {
        "Library already contains every playlist".to_string()
    } else {
        format!(
            "Added {} playlists and {} tracks to the '{}' folder",
            summary.added_playlists,
            summary.added_tracks,
            exporter.folder_name()
        )
    };
    Ok(Json(ExportResponse {
        success: true,
        message,
        added_playlists: summary.added_playlists,
        added_tracks: summary.added_tracks,
    }))
}

pub fn export_routes() -> Router<ServerState> {
    Router::new().route("/rekordbox", post(export_rekordbox))
}
