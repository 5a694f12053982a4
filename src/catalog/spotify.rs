//! HTTP client for the catalog's Web API, using the client-credentials flow.

use super::{CatalogError, CatalogSource, CatalogTrack, PlaylistItem, PlaylistPage};
use crate::config::CatalogSettings;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Tokens are refreshed this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistTracks {
    #[serde(default)]
    items: Vec<ApiPlaylistItem>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylistItem {
    added_at: Option<String>,
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbum>,
    preview_url: Option<String>,
    duration_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    name: Option<String>,
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<ApiImage>,
}

#[derive(Debug, Deserialize)]
struct ApiImage {
    url: String,
}

impl ApiTrack {
    /// Tracks without an id (local files) cannot be referenced later and are dropped.
    fn into_catalog_track(self) -> Option<CatalogTrack> {
        let id = self.id?;
        let artist = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let (album_name, release_date, artwork_url) = match self.album {
            Some(album) => (
                album.name,
                album.release_date,
                album.images.into_iter().next().map(|image| image.url),
            ),
            None => (None, None, None),
        };
        Some(CatalogTrack {
            id,
            title: self.name.unwrap_or_default(),
            artist,
            artwork_url,
            preview_url: self.preview_url,
            duration_ms: self.duration_ms,
            album_name,
            release_date,
        })
    }
}

fn parse_added_at(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct SpotifyCatalogClient {
    client: Client,
    api_base_url: String,
    accounts_base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyCatalogClient {
    pub fn new(
        client: Client,
        api_base_url: impl Into<String>,
        accounts_base_url: impl Into<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into(),
            accounts_base_url: accounts_base_url.into(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &CatalogSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self::new(
            client,
            settings.api_base_url.clone(),
            settings.accounts_base_url.clone(),
            settings.client_id.clone(),
            settings.client_secret.clone(),
        ))
    }

    /// A cached token, refreshed when close to expiry.
    async fn bearer_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let response = self.request_token().await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn request_token(&self) -> Result<TokenResponse, CatalogError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(CatalogError::MissingCredentials);
        };
        let url = format!("{}/api/token", self.accounts_base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let response = Self::check_status(response, "token request")?;
        response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))
    }

    fn check_status(response: Response, context: &str) -> Result<Response, CatalogError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(context.to_string())),
            status => Err(CatalogError::Status {
                status: status.as_u16(),
                context: context.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CatalogSource for SpotifyCatalogClient {
    async fn fetch_access_token(&self) -> Result<String, CatalogError> {
        Ok(self.request_token().await?.access_token)
    }

    async fn fetch_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<PlaylistPage, CatalogError> {
        let token = self.bearer_token().await?;
        let url = format!("{}/playlists/{}/tracks", self.api_base_url, playlist_id);
        debug!("Fetching playlist {} offset={} limit={}", playlist_id, offset, limit);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await?;
        let response = Self::check_status(response, &format!("playlist {}", playlist_id))?;
        let page: ApiPlaylistTracks = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

        Ok(PlaylistPage {
            items: page
                .items
                .into_iter()
                .map(|item| PlaylistItem {
                    added_at: parse_added_at(item.added_at.as_deref()),
                    track: item.track.and_then(ApiTrack::into_catalog_track),
                })
                .collect(),
            total: page.total,
        })
    }

    async fn fetch_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError> {
        let token = self.bearer_token().await?;
        let url = format!("{}/tracks/{}", self.api_base_url, track_id);
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = Self::check_status(response, &format!("track {}", track_id))?;
        let track: ApiTrack = response
            .json()
            .await
            .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;
        track
            .into_catalog_track()
            .ok_or_else(|| CatalogError::InvalidResponse("track without id".to_string()))
    }
}
