//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with one method per endpoint. When API routes or request
//! formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    async fn post(&self, path: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("POST request failed")
    }

    async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
    }

    // ========================================================================
    // Home
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.get("/").await
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    pub async fn get_saved_tracks(&self, query: &str) -> Response {
        self.get(&format!("/v1/tracks/saved{}", query)).await
    }

    pub async fn get_new_tracks(&self) -> Response {
        self.get("/v1/tracks/new").await
    }

    pub async fn get_track(&self, track_id: &str) -> Response {
        self.get(&format!("/v1/tracks/{}", track_id)).await
    }

    pub async fn check_track(&self, track_id: &str) -> Response {
        self.client
            .post(self.url(&format!("/v1/tracks/{}/check", track_id)))
            .send()
            .await
            .expect("POST request failed")
    }

    // ========================================================================
    // Matches
    // ========================================================================

    pub async fn save_match(&self, body: Value) -> Response {
        self.post("/v1/matches", body).await
    }

    /// Save the first candidate the track detail route proposes.
    pub async fn save_first_candidate(&self, track_id: &str) -> Response {
        let detail: Value = self
            .get_track(track_id)
            .await
            .json()
            .await
            .expect("Track detail is not JSON");
        let candidate = detail["matches"][0].clone();
        assert!(candidate.is_object(), "No candidate for {}", track_id);
        self.save_match(json!({
            "track_id": track_id,
            "match": candidate,
            "track_title": detail["title"],
            "track_artist": detail["artist"],
        }))
        .await
    }

    pub async fn delete_match(&self, track_id: &str) -> Response {
        self.delete(&format!("/v1/matches/{}", track_id)).await
    }

    pub async fn get_download_status(&self, track_id: &str) -> Response {
        self.get(&format!("/v1/matches/{}/download", track_id)).await
    }

    pub async fn retry_download(&self, track_id: &str) -> Response {
        self.client
            .post(self.url(&format!("/v1/matches/{}/retry", track_id)))
            .send()
            .await
            .expect("POST request failed")
    }

    /// Poll the download status until it settles on `completed` or `failed`.
    pub async fn wait_for_download(&self, track_id: &str) -> Value {
        let start = Instant::now();
        loop {
            let status: Value = self
                .get_download_status(track_id)
                .await
                .json()
                .await
                .expect("Download status is not JSON");
            match status["download_status"].as_str() {
                Some("completed") | Some("failed") => return status,
                _ => {}
            }
            if start.elapsed() > Duration::from_millis(DOWNLOAD_SETTLE_TIMEOUT_MS) {
                panic!("Download of {} did not settle: {}", track_id, status);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    // ========================================================================
    // Playlists
    // ========================================================================

    pub async fn get_playlists(&self) -> Response {
        self.get("/v1/playlists").await
    }

    pub async fn create_playlist(&self, name: &str) -> Response {
        self.post("/v1/playlists", json!({ "name": name })).await
    }

    /// Create a playlist and return its id.
    pub async fn create_playlist_id(&self, name: &str) -> i64 {
        let response = self.create_playlist(name).await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let playlist: Value = response.json().await.expect("Playlist is not JSON");
        playlist["id"].as_i64().expect("Playlist has no id")
    }

    pub async fn get_playlist(&self, playlist_id: i64) -> Response {
        self.get(&format!("/v1/playlists/{}", playlist_id)).await
    }

    pub async fn delete_playlist(&self, playlist_id: i64) -> Response {
        self.delete(&format!("/v1/playlists/{}", playlist_id)).await
    }

    pub async fn get_playlist_tracks(&self, playlist_id: i64) -> Response {
        self.get(&format!("/v1/playlists/{}/tracks", playlist_id))
            .await
    }

    pub async fn add_playlist_track(&self, playlist_id: i64, track_id: &str) -> Response {
        self.post(
            &format!("/v1/playlists/{}/tracks", playlist_id),
            json!({ "track_id": track_id }),
        )
        .await
    }

    pub async fn remove_playlist_track(&self, playlist_id: i64, track_id: &str) -> Response {
        self.delete(&format!("/v1/playlists/{}/tracks/{}", playlist_id, track_id))
            .await
    }

    // ========================================================================
    // Export
    // ========================================================================

    pub async fn export_rekordbox(&self, library_path: &str) -> Response {
        self.post(
            "/v1/export/rekordbox",
            json!({ "library_path": library_path }),
        )
        .await
    }
}
