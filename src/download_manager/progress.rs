use crate::track_store::{DownloadUpdate, TrackStore};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Upper bound of the byte-streaming stage.
pub const STREAM_PROGRESS_CEILING: u8 = 80;

/// Writes a job's progress to the store. Progress only ever moves forward, and
/// once the record is found to be gone (deleted or superseded) nothing more is
/// written.
pub struct ProgressReporter {
    store: Arc<dyn TrackStore>,
    match_id: i64,
    generation: i64,
    last: AtomicU8,
    vanished: AtomicBool,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn TrackStore>, match_id: i64, generation: i64) -> Self {
        Self {
            store,
            match_id,
            generation,
            last: AtomicU8::new(0),
            vanished: AtomicBool::new(false),
        }
    }

    pub fn has_vanished(&self) -> bool {
        self.vanished.load(Ordering::SeqCst)
    }

    /// Apply `update`. Returns `Ok(false)` when the record is gone.
    pub fn write(&self, update: DownloadUpdate) -> Result<bool> {
        if self.has_vanished() {
            return Ok(false);
        }
        let progress = update.progress;
        let applied = self
            .store
            .update_download(self.match_id, self.generation, update)?;
        if !applied {
            self.vanished.store(true, Ordering::SeqCst);
        } else if let Some(progress) = progress {
            self.last.fetch_max(progress, Ordering::SeqCst);
        }
        Ok(applied)
    }

    /// Write `progress` if it is ahead of the last value written.
    pub fn advance(&self, progress: u8) -> Result<bool> {
        if progress <= self.last.load(Ordering::SeqCst) && progress != 0 {
            return Ok(!self.has_vanished());
        }
        self.write(DownloadUpdate::progress(progress))
    }

    /// Map streamed bytes onto `0..=80`. Without a known total nothing is written.
    /// Store errors are logged, not raised, since this runs inside the fetch loop.
    pub fn report_bytes(&self, downloaded: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let scaled = downloaded.saturating_mul(STREAM_PROGRESS_CEILING as u64) / total;
        let progress = scaled.min(STREAM_PROGRESS_CEILING as u64) as u8;
        if progress <= self.last.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.write(DownloadUpdate::progress(progress)) {
            warn!("Failed to record progress for match {}: {}", self.match_id, e);
        }
    }

    pub fn last_progress(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track_store::{
        DownloadStatus, MatchedTrack, NewMatch, NewPrimaryTrack, SaveMatchOutcome,
        SqliteTrackStore,
    };

    fn store_with_match() -> (Arc<dyn TrackStore>, MatchedTrack) {
        let store = SqliteTrackStore::in_memory().unwrap();
        store
            .upsert_primary(NewPrimaryTrack {
                external_id: "abc".to_string(),
                title: "Song".to_string(),
                artist: "Artist".to_string(),
                artwork_url: None,
                added_at: 1,
            })
            .unwrap();
        let matched = match store
            .save_match(
                "abc",
                NewMatch {
                    external_id: "123".to_string(),
                    title: "Song".to_string(),
                    artist: "Artist".to_string(),
                    artwork_url: None,
                    duration_ms: 1000,
                    url: "https://example.com".to_string(),
                    stream_url: None,
                },
            )
            .unwrap()
        {
            SaveMatchOutcome::Saved(m) => m,
            other => panic!("unexpected {:?}", other),
        };
        (Arc::new(store), matched)
    }

    #[test]
    fn test_byte_progress_is_scaled_and_monotonic() {
        let (store, matched) = store_with_match();
        let reporter = ProgressReporter::new(store.clone(), matched.id, matched.job_generation);

        reporter.report_bytes(50, Some(100));
        assert_eq!(reporter.last_progress(), 40);
        reporter.report_bytes(10, Some(100));
        assert_eq!(reporter.last_progress(), 40);
        reporter.report_bytes(100, Some(100));
        assert_eq!(reporter.last_progress(), 80);
        reporter.report_bytes(500, Some(100));
        assert_eq!(reporter.last_progress(), 80);

        let stored = store.get_match("abc").unwrap().unwrap();
        assert_eq!(stored.download_progress, 80);
        assert_eq!(stored.download_status, DownloadStatus::Pending);
    }

    #[test]
    fn test_unknown_total_writes_nothing() {
        let (store, matched) = store_with_match();
        let reporter = ProgressReporter::new(store.clone(), matched.id, matched.job_generation);

        reporter.report_bytes(1_000, None);
        reporter.report_bytes(1_000, Some(0));

        assert_eq!(reporter.last_progress(), 0);
        assert_eq!(store.get_match("abc").unwrap().unwrap().download_progress, 0);
    }

    #[test]
    fn test_stale_generation_marks_vanished() {
        let (store, matched) = store_with_match();
        let reporter =
            ProgressReporter::new(store.clone(), matched.id, matched.job_generation + 1);

        assert!(!reporter.advance(85).unwrap());
        assert!(reporter.has_vanished());
        assert!(!reporter.advance(90).unwrap());
        assert_eq!(store.get_match("abc").unwrap().unwrap().download_progress, 0);
    }
}
