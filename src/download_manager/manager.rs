//! Download job orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::fetcher::AudioFetcher;
use super::progress::{ProgressReporter, STREAM_PROGRESS_CEILING};
use super::transcoder::Transcoder;
use crate::analysis::{run_analysis, AudioAnalyzer};
use crate::library::{
    ensure_dir, remove_file, set_mode, LibraryPaths, AUDIO_EXTENSION, FILE_MODE,
};
use crate::server::metrics;
use crate::track_store::{DownloadStatus, DownloadUpdate, MatchedTrack, TrackStore};

const TRANSCODE_STARTED_PROGRESS: u8 = 85;
const TRANSCODE_FINISHED_PROGRESS: u8 = 90;

/// Everything a job needs, captured when the job is launched.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub match_id: i64,
    /// The `job_generation` the record carried when the job was authorized.
    pub generation: i64,
    pub url: String,
    pub title: String,
    pub artist: String,
    pub external_id: String,
}

impl From<&MatchedTrack> for DownloadJob {
    fn from(matched: &MatchedTrack) -> Self {
        DownloadJob {
            match_id: matched.id,
            generation: matched.job_generation,
            url: matched.url.clone(),
            title: matched.title.clone(),
            artist: matched.artist.clone(),
            external_id: matched.external_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// The record was deleted or re-saved while the job ran.
    Vanished,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::Vanished => "vanished",
        }
    }
}

enum JobAbort {
    Vanished,
    /// Vanished after the transcoded file was moved into place.
    VanishedWithOutput(PathBuf),
    Failed(String),
}

impl From<anyhow::Error> for JobAbort {
    fn from(e: anyhow::Error) -> Self {
        JobAbort::Failed(format!("store error: {}", e))
    }
}

pub struct DownloadManager {
    store: Arc<dyn TrackStore>,
    fetcher: Arc<dyn AudioFetcher>,
    transcoder: Arc<dyn Transcoder>,
    analyzer: Arc<dyn AudioAnalyzer>,
    paths: LibraryPaths,
    permits: Arc<Semaphore>,
}

impl DownloadManager {
    pub fn new(
        store: Arc<dyn TrackStore>,
        fetcher: Arc<dyn AudioFetcher>,
        transcoder: Arc<dyn Transcoder>,
        analyzer: Arc<dyn AudioAnalyzer>,
        paths: LibraryPaths,
        max_concurrent: usize,
    ) -> Self {
        info!(
            "Download manager ready: root={:?}, max_concurrent={}",
            paths.root(),
            max_concurrent
        );
        Self {
            store,
            fetcher,
            transcoder,
            analyzer,
            paths,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    /// Free worker slots right now.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Launch `job` on its own task. It waits for a worker slot, so queued
    /// jobs stay `pending` until one frees up.
    pub fn submit(self: &Arc<Self>, job: DownloadJob) -> JoinHandle<JobOutcome> {
        let manager = Arc::clone(self);
        debug!(
            "Queued download of match {} (generation {})",
            job.match_id, job.generation
        );
        tokio::spawn(async move {
            let _permit = match manager.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Download worker pool closed: {}", e);
                    return JobOutcome::Failed;
                }
            };
            metrics::download_job_started();
            let outcome = manager.run_job(job).await;
            metrics::download_job_finished(outcome.as_str());
            outcome
        })
    }

    /// Run the download-then-analyze chain for `job` on the current task.
    pub async fn run_job(&self, job: DownloadJob) -> JobOutcome {
        let reporter = ProgressReporter::new(self.store.clone(), job.match_id, job.generation);
        let partial_path = self
            .paths
            .partial_dir()
            .join(format!("{}-{}.part", job.match_id, job.generation));

        let staged_path = partial_path.with_extension(AUDIO_EXTENSION);

        let result = self
            .download(&job, &reporter, &partial_path, &staged_path)
            .await;
        remove_file(&partial_path).await;
        remove_file(&staged_path).await;

        let final_path = match result {
            Ok(path) => path,
            Err(JobAbort::Vanished) => {
                debug!(
                    "Match {} vanished during download (generation {}), stopping",
                    job.match_id, job.generation
                );
                return JobOutcome::Vanished;
            }
            Err(JobAbort::VanishedWithOutput(output)) => {
                self.discard_orphaned_output(&job, &output).await;
                return JobOutcome::Vanished;
            }
            Err(JobAbort::Failed(reason)) => {
                warn!(
                    "Download of '{} - {}' (match {}) failed: {}",
                    job.artist, job.title, job.match_id, reason
                );
                return match reporter.write(DownloadUpdate::status(DownloadStatus::Failed)) {
                    Ok(true) => JobOutcome::Failed,
                    Ok(false) => JobOutcome::Vanished,
                    Err(e) => {
                        warn!("Could not mark match {} as failed: {}", job.match_id, e);
                        JobOutcome::Failed
                    }
                };
            }
        };

        if !tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
            warn!(
                "{:?} missing after transcoding, completing without analysis",
                final_path
            );
            let update = DownloadUpdate::status(DownloadStatus::Completed).with_progress(100);
            return match reporter.write(update) {
                Ok(false) => JobOutcome::Vanished,
                Ok(true) => JobOutcome::Completed,
                Err(e) => {
                    warn!("Could not complete match {}: {}", job.match_id, e);
                    JobOutcome::Completed
                }
            };
        }

        match run_analysis(&reporter, self.analyzer.clone(), final_path).await {
            Some(_) => JobOutcome::Completed,
            None => {
                debug!("Match {} vanished during analysis", job.match_id);
                JobOutcome::Vanished
            }
        }
    }

    /// A match deleted while its file was being transcoded already had its
    /// files cleaned up, so the fresh output would be left behind. A re-saved
    /// match keeps it: the newer job writes the same path.
    async fn discard_orphaned_output(&self, job: &DownloadJob, output: &Path) {
        match self.store.get_match_by_id(job.match_id) {
            Ok(None) => {
                info!(
                    "Match {} was deleted during transcoding, removing {:?}",
                    job.match_id, output
                );
                remove_file(output).await;
            }
            Ok(Some(_)) => debug!(
                "Match {} superseded during transcoding, keeping {:?}",
                job.match_id, output
            ),
            Err(e) => warn!("Could not look up match {}: {}", job.match_id, e),
        }
    }

    async fn download(
        &self,
        job: &DownloadJob,
        reporter: &ProgressReporter,
        partial_path: &Path,
        staged_path: &Path,
    ) -> Result<PathBuf, JobAbort> {
        let started = DownloadUpdate::status(DownloadStatus::Downloading).with_progress(0);
        if !reporter.write(started)? {
            return Err(JobAbort::Vanished);
        }
        info!(
            "Downloading '{} - {}' (match {})",
            job.artist, job.title, job.match_id
        );

        let partial_dir = self.paths.partial_dir();
        if !ensure_dir(&partial_dir).await {
            return Err(JobAbort::Failed(format!("cannot create {:?}", partial_dir)));
        }

        let on_progress = |done: u64, total: Option<u64>| reporter.report_bytes(done, total);
        let bytes = self
            .fetcher
            .fetch_to_file(&job.url, partial_path, &on_progress)
            .await
            .map_err(|e| JobAbort::Failed(e.to_string()))?;
        if reporter.has_vanished() {
            return Err(JobAbort::Vanished);
        }
        debug!("Fetched {} bytes for match {}", bytes, job.match_id);

        self.advance(reporter, STREAM_PROGRESS_CEILING)?;
        self.advance(reporter, TRANSCODE_STARTED_PROGRESS)?;

        let final_path = self
            .paths
            .track_path(&job.artist, &job.title, &job.external_id);
        self.transcoder
            .transcode_to_mp3(partial_path, staged_path)
            .await
            .map_err(|e| JobAbort::Failed(e.to_string()))?;

        // Only a finished transcode ever reaches the canonical path.
        let produced = tokio::fs::try_exists(staged_path).await.unwrap_or(false);
        if produced {
            tokio::fs::rename(staged_path, &final_path)
                .await
                .map_err(|e| {
                    JobAbort::Failed(format!("cannot move output to {:?}: {}", final_path, e))
                })?;
            set_mode(&final_path, FILE_MODE).await;
        }

        let transcoded = DownloadUpdate::progress(TRANSCODE_FINISHED_PROGRESS)
            .with_file_path(final_path.to_string_lossy());
        if !reporter.write(transcoded)? {
            return Err(if produced {
                JobAbort::VanishedWithOutput(final_path)
            } else {
                JobAbort::Vanished
            });
        }
        info!("Saved match {} to {:?}", job.match_id, final_path);

        Ok(final_path)
    }

    fn advance(&self, reporter: &ProgressReporter, progress: u8) -> Result<(), JobAbort> {
        if reporter.advance(progress)? {
            Ok(())
        } else {
            Err(JobAbort::Vanished)
        }
    }
}
