//! Tempo and key extraction for downloaded audio.

mod camelot;
mod decoder;
mod job;
mod key;
mod spectrum;
mod tempo;

pub use camelot::{camelot_key, pitch_class};
pub use decoder::decode_mono;
pub use job::{run_analysis, AnalysisResult};
pub use key::{estimate_key, KeyEstimate, Scale};
pub use tempo::{estimate_tempo, MAX_BPM, MIN_BPM};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("FFT error: {0}")]
    Dsp(String),

    #[error("audio too short to analyse")]
    TooShort,

    #[error("no onsets detected")]
    NoOnsets,

    #[error("no pitched content detected")]
    NoPitchContent,

    #[error("analysis task failed: {0}")]
    Task(String),
}

/// Decoded single-channel waveform.
#[derive(Debug, Clone)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// The three analysis steps. Implementations are synchronous and get called
/// from the blocking thread pool.
pub trait AudioAnalyzer: Send + Sync {
    fn load(&self, path: &Path) -> Result<MonoAudio, AnalysisError>;

    /// Tempo in BPM, unrounded.
    fn tempo(&self, audio: &MonoAudio) -> Result<f64, AnalysisError>;

    fn key(&self, audio: &MonoAudio) -> Result<KeyEstimate, AnalysisError>;
}

/// symphonia decoding followed by STFT-based tempo and key estimation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralAnalyzer;

impl AudioAnalyzer for SpectralAnalyzer {
    fn load(&self, path: &Path) -> Result<MonoAudio, AnalysisError> {
        decode_mono(path)
    }

    fn tempo(&self, audio: &MonoAudio) -> Result<f64, AnalysisError> {
        estimate_tempo(audio)
    }

    fn key(&self, audio: &MonoAudio) -> Result<KeyEstimate, AnalysisError> {
        estimate_key(audio)
    }
}
