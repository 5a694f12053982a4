//! Background download jobs.
//!
//! A job streams the matched track into the partial directory, transcodes it
//! into the download root and hands the result to the analysis stage. Jobs
//! run on their own tokio tasks, bounded by a semaphore.

mod fetcher;
mod manager;
mod progress;
mod transcoder;

pub use fetcher::{AudioFetcher, ProgressFn, SoundCloudStreamFetcher};
pub use manager::{DownloadJob, DownloadManager, JobOutcome};
pub use progress::{ProgressReporter, STREAM_PROGRESS_CEILING};
pub use transcoder::{ConversionError, FfmpegTranscoder, Transcoder};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not resolve client id: {0}")]
    ClientId(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream service returned status {0}")]
    Status(u16),

    #[error("track has no progressive stream")]
    NoProgressiveStream,

    #[error("invalid stream response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
