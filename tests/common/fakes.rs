//! In-process stand-ins for the external services.

use super::constants::*;
use async_trait::async_trait;
use cratedigger_server::analysis::{AnalysisError, AudioAnalyzer, KeyEstimate, MonoAudio, Scale};
use cratedigger_server::catalog::{
    CatalogError, CatalogSource, CatalogTrack, PlaylistItem, PlaylistPage,
};
use cratedigger_server::download_manager::{
    AudioFetcher, ConversionError, FetchError, ProgressFn, Transcoder,
};
use cratedigger_server::match_search::{MatchCandidate, MatchSearcher, SearchOutcome};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn catalog_track(id: &str, title: &str, artist: &str) -> CatalogTrack {
    CatalogTrack {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        artwork_url: Some(format!("https://images.test/{}.jpg", id)),
        preview_url: None,
        duration_ms: Some(215_000),
        album_name: Some("Test Album".to_string()),
        release_date: Some("2024-01-01".to_string()),
    }
}

/// Serves the source playlist oldest first, like the real service.
pub struct FakeCatalog {
    playlist: Vec<CatalogTrack>,
    orphan: CatalogTrack,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            playlist: vec![
                catalog_track(TRACK_1_ID, TRACK_1_TITLE, TRACK_1_ARTIST),
                catalog_track(TRACK_2_ID, TRACK_2_TITLE, TRACK_2_ARTIST),
                catalog_track(TRACK_3_ID, TRACK_3_TITLE, TRACK_3_ARTIST),
            ],
            orphan: catalog_track(ORPHAN_TRACK_ID, ORPHAN_TRACK_TITLE, ORPHAN_TRACK_ARTIST),
        }
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn fetch_access_token(&self) -> Result<String, CatalogError> {
        Ok("test-token".to_string())
    }

    async fn fetch_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<PlaylistPage, CatalogError> {
        if playlist_id != SOURCE_PLAYLIST_ID {
            return Err(CatalogError::NotFound(format!("playlist {}", playlist_id)));
        }
        let items = self
            .playlist
            .iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(index, track)| PlaylistItem {
                track: Some(track.clone()),
                added_at: Some(PLAYLIST_START_TIMESTAMP + index as i64 * 86_400),
            })
            .collect();
        Ok(PlaylistPage {
            items,
            total: self.playlist.len(),
        })
    }

    async fn fetch_track(&self, track_id: &str) -> Result<CatalogTrack, CatalogError> {
        self.playlist
            .iter()
            .chain(std::iter::once(&self.orphan))
            .find(|track| track.id == track_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("track {}", track_id)))
    }
}

/// One candidate per search, derived from the query.
pub struct FakeSearcher;

#[async_trait]
impl MatchSearcher for FakeSearcher {
    async fn search(&self, title: &str, artist: &str, _limit: usize) -> SearchOutcome {
        if title == UNSEARCHABLE_TITLE {
            return SearchOutcome::Exhausted {
                attempts: 3,
                last_error: "search service returned status 503".to_string(),
            };
        }
        let slug = title.to_lowercase().replace(' ', "-");
        SearchOutcome::Matches(vec![MatchCandidate {
            id: format!("{}{}", MATCH_ID_PREFIX, slug),
            title: title.to_string(),
            artist: artist.to_string(),
            artwork_url: None,
            duration_ms: 215_000,
            url: format!("{}/{}", MATCH_URL_BASE, slug),
            stream_url: None,
        }])
    }
}

/// Writes [`FAKE_AUDIO`] to the destination, or fails while `failing` is set.
pub struct FakeFetcher {
    pub failing: Arc<AtomicBool>,
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch_to_file(
        &self,
        _url: &str,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<u64, FetchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status(503));
        }
        let total = FAKE_AUDIO.len() as u64;
        tokio::fs::write(dest, FAKE_AUDIO).await?;
        progress(total, Some(total));
        Ok(total)
    }
}

/// Copies the partial file to its destination instead of running ffmpeg.
pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode_to_mp3(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

/// Reports 124.4 BPM in A minor for every file.
pub struct FixedAnalyzer;

impl AudioAnalyzer for FixedAnalyzer {
    fn load(&self, _path: &Path) -> Result<MonoAudio, AnalysisError> {
        Ok(MonoAudio {
            samples: vec![0.0; 16],
            sample_rate: 44_100,
        })
    }

    fn tempo(&self, _audio: &MonoAudio) -> Result<f64, AnalysisError> {
        Ok(124.4)
    }

    fn key(&self, _audio: &MonoAudio) -> Result<KeyEstimate, AnalysisError> {
        Ok(KeyEstimate {
            tonic: "A",
            scale: Scale::Minor,
            strength: 0.8,
        })
    }
}
