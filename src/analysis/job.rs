use super::{camelot_key, AnalysisError, AudioAnalyzer, MonoAudio};
use crate::download_manager::ProgressReporter;
use crate::track_store::{DownloadStatus, DownloadUpdate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const ANALYZING_PROGRESS: u8 = 90;
const TEMPO_DONE_PROGRESS: u8 = 92;
const KEY_DONE_PROGRESS: u8 = 95;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub bpm: Option<f64>,
    pub key: Option<String>,
}

async fn blocking<T, F>(f: F) -> Result<T, AnalysisError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AnalysisError::Task(e.to_string()))?
}

/// Write `update`, logging store errors. Returns false once the record is gone.
fn write_logged(reporter: &ProgressReporter, update: DownloadUpdate) -> bool {
    match reporter.write(update) {
        Ok(applied) => applied,
        Err(e) => {
            warn!("Failed to record analysis state: {}", e);
            true
        }
    }
}

fn advance_logged(reporter: &ProgressReporter, progress: u8) -> bool {
    match reporter.advance(progress) {
        Ok(applied) => applied,
        Err(e) => {
            warn!("Failed to record analysis progress: {}", e);
            true
        }
    }
}

/// Analyse the downloaded file at `path` and settle the record as completed.
///
/// Failures of either pass only leave the corresponding field empty. Returns
/// `None` when the record vanished while the analysis was running.
pub async fn run_analysis(
    reporter: &ProgressReporter,
    analyzer: Arc<dyn AudioAnalyzer>,
    path: PathBuf,
) -> Option<AnalysisResult> {
    let analyzing = DownloadUpdate::status(DownloadStatus::Analyzing).with_progress(ANALYZING_PROGRESS);
    if !write_logged(reporter, analyzing) {
        return None;
    }
    info!("Analyzing {}", path.display());

    let mut result = AnalysisResult::default();
    let loader = analyzer.clone();
    let load_path = path.clone();
    match blocking(move || loader.load(&load_path)).await {
        Ok(audio) => {
            let audio = Arc::new(audio);
            result.bpm = tempo_pass(analyzer.clone(), audio.clone(), &path).await;
            if !advance_logged(reporter, TEMPO_DONE_PROGRESS) {
                return None;
            }
            result.key = key_pass(analyzer, audio, &path).await;
            if !advance_logged(reporter, KEY_DONE_PROGRESS) {
                return None;
            }
        }
        Err(e) => warn!("Could not decode {} for analysis: {}", path.display(), e),
    }

    let completed = DownloadUpdate {
        status: Some(DownloadStatus::Completed),
        progress: Some(100),
        file_path: None,
        bpm: result.bpm,
        musical_key: result.key.clone(),
    };
    if !write_logged(reporter, completed) {
        return None;
    }
    info!(
        "Analysis of {} complete: bpm={:?} key={:?}",
        path.display(),
        result.bpm,
        result.key
    );
    Some(result)
}

async fn tempo_pass(
    analyzer: Arc<dyn AudioAnalyzer>,
    audio: Arc<MonoAudio>,
    path: &Path,
) -> Option<f64> {
    match blocking(move || analyzer.tempo(&audio)).await {
        Ok(bpm) => Some(bpm.round()),
        Err(e) => {
            warn!("Tempo detection failed for {}: {}", path.display(), e);
            None
        }
    }
}

async fn key_pass(
    analyzer: Arc<dyn AudioAnalyzer>,
    audio: Arc<MonoAudio>,
    path: &Path,
) -> Option<String> {
    match blocking(move || analyzer.key(&audio)).await {
        Ok(estimate) => Some(camelot_key(estimate.tonic, estimate.scale.as_str())),
        Err(e) => {
            warn!("Key detection failed for {}: {}", path.display(), e);
            None
        }
    }
}
