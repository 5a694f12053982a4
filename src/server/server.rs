use anyhow::{Context, Result};
use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::time::Duration;
use tower_http::services::ServeDir;
use tracing::{error, info};

use super::export_routes::export_routes;
use super::match_routes::match_routes;
use super::metrics::{self, metrics_handler};
use super::playlist_routes::playlist_routes;
use super::state::ServerState;
use super::track_routes::track_routes;
use super::{error::ApiError, log_requests};
use crate::track_store::StoreStats;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    #[serde(flatten)]
    pub library: StoreStats,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> Result<impl IntoResponse, ApiError> {
    let library = state.track_store.stats()?;
    metrics::set_library_items(
        library.primary_tracks,
        library.saved_tracks,
        library.playlists,
    );
    Ok(Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        library,
    }))
}

pub fn make_app(state: ServerState) -> Router {
    let api_routes: Router = Router::new()
        .nest("/v1/tracks", track_routes())
        .nest("/v1/matches", match_routes())
        .nest("/v1/playlists", playlist_routes())
        .nest("/v1/export", export_routes())
        .with_state(state.clone());

    let home_router: Router = match &state.config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    let app: Router = home_router.merge(api_routes);
    app.layer(middleware::from_fn_with_state(state, log_requests))
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

pub async fn run_server(state: ServerState) -> Result<()> {
    let port = state.config.port;
    let metrics_port = state.config.metrics_port;

    let metrics_listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port))
        .await
        .with_context(|| format!("failed to bind metrics port {}", metrics_port))?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, make_metrics_app()).await {
            error!("Metrics server stopped: {}", e);
        }
    });

    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    Ok(axum::serve(listener, app).await?)
}
