//! Wire types of the secondary service's public API.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub collection: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTrack {
    /// Numeric on the wire, but tolerated as a string too.
    #[serde(default)]
    pub id: serde_json::Value,
    pub title: Option<String>,
    pub user: Option<ApiUser>,
    pub artwork_url: Option<String>,
    pub duration: Option<i64>,
    pub permalink_url: Option<String>,
    pub stream_url: Option<String>,
    pub media: Option<ApiMedia>,
}

impl ApiTrack {
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMedia {
    #[serde(default)]
    pub transcodings: Vec<ApiTranscoding>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTranscoding {
    pub url: String,
    pub format: ApiTranscodingFormat,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTranscodingFormat {
    pub protocol: String,
    pub mime_type: Option<String>,
}

/// Body returned when following a transcoding URL.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiStreamLocation {
    pub url: String,
}
