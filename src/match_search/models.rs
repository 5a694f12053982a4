use super::api_types::ApiTrack;
use crate::track_store::{MatchedTrack, NewMatch};
use serde::{Deserialize, Serialize};

/// A secondary-service track proposed as equivalent to a primary track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub duration_ms: i64,
    pub url: String,
    #[serde(default)]
    pub stream_url: Option<String>,
}

impl From<ApiTrack> for MatchCandidate {
    fn from(track: ApiTrack) -> Self {
        MatchCandidate {
            id: track.id_string(),
            title: track.title.unwrap_or_default(),
            artist: track
                .user
                .and_then(|user| user.username)
                .unwrap_or_default(),
            artwork_url: track.artwork_url,
            duration_ms: track.duration.unwrap_or(0),
            url: track.permalink_url.unwrap_or_default(),
            stream_url: track.stream_url,
        }
    }
}

impl From<&MatchedTrack> for MatchCandidate {
    fn from(matched: &MatchedTrack) -> Self {
        MatchCandidate {
            id: matched.external_id.clone(),
            title: matched.title.clone(),
            artist: matched.artist.clone(),
            artwork_url: matched.artwork_url.clone(),
            duration_ms: matched.duration_ms,
            url: matched.url.clone(),
            stream_url: matched.stream_url.clone(),
        }
    }
}

impl From<MatchCandidate> for NewMatch {
    fn from(candidate: MatchCandidate) -> Self {
        NewMatch {
            external_id: candidate.id,
            title: candidate.title,
            artist: candidate.artist,
            artwork_url: candidate.artwork_url,
            duration_ms: candidate.duration_ms,
            url: candidate.url,
            stream_url: candidate.stream_url,
        }
    }
}

/// Result of a search with retries. An empty `Matches` is a successful search
/// that found nothing, which is different from running out of attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Matches(Vec<MatchCandidate>),
    Exhausted { attempts: u32, last_error: String },
}

impl SearchOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SearchOutcome::Exhausted { .. })
    }

    pub fn into_candidates(self) -> Vec<MatchCandidate> {
        match self {
            SearchOutcome::Matches(candidates) => candidates,
            SearchOutcome::Exhausted { .. } => Vec::new(),
        }
    }
}
