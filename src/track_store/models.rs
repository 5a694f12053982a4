//! Records persisted by the track store.

use serde::{Deserialize, Serialize};

/// Lifecycle of a matched track's download.
///
/// `Completed` and `Failed` are settled: no job picks them up on its own.
/// Only an explicit retry moves a `Failed` record back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Analyzing,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Analyzing => "analyzing",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "analyzing" => Some(DownloadStatus::Analyzing),
            "completed" => Some(DownloadStatus::Completed),
            "failed" => Some(DownloadStatus::Failed),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Failed)
    }
}

/// A track observed in the source catalog playlist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimaryTrack {
    #[serde(skip)]
    pub id: i64,
    #[serde(rename = "track_id")]
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub added_at: i64,
    pub is_saved: bool,
    pub saved_at: Option<i64>,
    pub in_playlist: bool,
}

#[derive(Debug, Clone)]
pub struct NewPrimaryTrack {
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub added_at: i64,
}

/// Match data chosen for a primary track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatch {
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub duration_ms: i64,
    pub url: String,
    pub stream_url: Option<String>,
}

/// The secondary-service track confirmed as equivalent to a primary track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedTrack {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub primary_id: i64,
    #[serde(rename = "id")]
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub artwork_url: Option<String>,
    pub duration_ms: i64,
    pub url: String,
    pub stream_url: Option<String>,
    pub file_path: Option<String>,
    pub download_status: DownloadStatus,
    pub download_progress: u8,
    pub bpm: Option<f64>,
    pub musical_key: Option<String>,
    #[serde(skip)]
    pub job_generation: i64,
    pub created_at: i64,
}

/// Result of polling a primary track's download.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    NoMatch,
    Matched(MatchedTrack),
}

/// Partial update written by a background job. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadUpdate {
    pub status: Option<DownloadStatus>,
    pub progress: Option<u8>,
    pub file_path: Option<String>,
    pub bpm: Option<f64>,
    pub musical_key: Option<String>,
}

impl DownloadUpdate {
    pub fn status(status: DownloadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress.min(100)),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }
}

/// A saved primary track together with the analysis fields of its match.
#[derive(Debug, Clone, Serialize)]
pub struct SavedTrack {
    #[serde(flatten)]
    pub track: PrimaryTrack,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub download_status: Option<DownloadStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistSummary {
    #[serde(flatten)]
    pub playlist: Playlist,
    pub track_count: usize,
}

/// One membership row joined with its track and match.
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub position: usize,
    pub added_at: i64,
    pub track: PrimaryTrack,
    pub matched: Option<MatchedTrack>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveMatchOutcome {
    Saved(MatchedTrack),
    TrackNotFound,
    /// The secondary-service track is already matched to another primary track.
    MatchTaken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryClaim {
    Claimed(MatchedTrack),
    NotFailed(DownloadStatus),
    NoMatch,
    TrackNotFound,
}

/// What `delete_match` removed, so the caller can mirror it on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTeardown {
    pub matched: Option<MatchedTrack>,
    pub playlist_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreatePlaylistOutcome {
    Created(Playlist),
    NameTaken,
    /// The name is free but its directory belongs to the named playlist.
    FolderTaken(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddMembershipOutcome {
    Added {
        playlist: Playlist,
        position: usize,
        matched: Option<MatchedTrack>,
    },
    PlaylistNotFound,
    TrackNotFound,
    AlreadyInPlaylist,
    DuplicateMembership,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveMembershipOutcome {
    Removed {
        playlist: Playlist,
        matched: Option<MatchedTrack>,
    },
    PlaylistNotFound,
    TrackNotFound,
    NotMember,
}

/// A deleted playlist and the matches of its former members.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistTeardown {
    pub playlist: Playlist,
    pub member_matches: Vec<MatchedTrack>,
}

/// Row counts reported on the server home route.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub primary_tracks: usize,
    pub saved_tracks: usize,
    pub playlists: usize,
    pub downloads_active: usize,
    pub downloads_completed: usize,
    pub downloads_failed: usize,
}
