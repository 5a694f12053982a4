//! Tempo estimation from an onset-strength envelope.
//!
//! The envelope is the half-wave rectified spectral flux of a log-compressed
//! STFT. Its autocorrelation is scored at every integer tempo between
//! [`MIN_BPM`] and [`MAX_BPM`], weighted by a log-normal prior around 120 BPM
//! so that a beat period is preferred over its multiples.

use super::spectrum::{for_each_magnitude_frame, frame_size_for};
use super::{AnalysisError, MonoAudio};

pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 200;

const PRIOR_CENTER_BPM: f64 = 120.0;
const REFERENCE_FRAME_SIZE: usize = 2048;
const SMOOTHING_RADIUS: isize = 3;

pub fn estimate_tempo(audio: &MonoAudio) -> Result<f64, AnalysisError> {
    let frame_size = frame_size_for(audio.sample_rate, REFERENCE_FRAME_SIZE);
    let hop = frame_size / 4;
    let frames_per_second = audio.sample_rate as f64 / hop as f64;

    let envelope = onset_envelope(&audio.samples, frame_size, hop)?;

    let max_lag = (frames_per_second * 60.0 / MIN_BPM as f64).ceil() as usize + 1;
    if envelope.len() < max_lag * 2 {
        return Err(AnalysisError::TooShort);
    }
    let ac = autocorrelation(&envelope, max_lag);
    if ac[0] <= f64::EPSILON {
        return Err(AnalysisError::NoOnsets);
    }

    let scores: Vec<f64> = (MIN_BPM..=MAX_BPM)
        .map(|bpm| {
            let lag = frames_per_second * 60.0 / bpm as f64;
            let low = lag.floor() as usize;
            let frac = lag - low as f64;
            let value = ac[low] * (1.0 - frac) + ac[low + 1] * frac;
            let octaves = (bpm as f64 / PRIOR_CENTER_BPM).log2();
            value * (-0.5 * octaves * octaves).exp()
        })
        .collect();

    let best = scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or(AnalysisError::NoOnsets)?;

    // Parabolic refinement between neighbouring tempos.
    let mut offset = 0.0;
    if best > 0 && best + 1 < scores.len() {
        let (a, b, c) = (scores[best - 1], scores[best], scores[best + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > f64::EPSILON {
            offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
        }
    }

    Ok(MIN_BPM as f64 + best as f64 + offset)
}

fn onset_envelope(samples: &[f32], frame_size: usize, hop: usize) -> Result<Vec<f64>, AnalysisError> {
    let mut envelope = vec![0.0f64];
    let mut previous: Option<Vec<f32>> = None;

    for_each_magnitude_frame(samples, frame_size, hop, |mags| {
        let current: Vec<f32> = mags.iter().map(|m| m.ln_1p()).collect();
        if let Some(prev) = &previous {
            let flux: f64 = current
                .iter()
                .zip(prev)
                .map(|(now, before)| (now - before).max(0.0) as f64)
                .sum();
            envelope.push(flux);
        }
        previous = Some(current);
    })?;

    let mean = envelope.iter().sum::<f64>() / envelope.len() as f64;
    let rectified: Vec<f64> = envelope.iter().map(|e| (e - mean).max(0.0)).collect();
    Ok(smooth(&rectified))
}

/// Gaussian smoothing (sigma of one frame) so fractional beat periods still
/// line up with integer lags.
fn smooth(values: &[f64]) -> Vec<f64> {
    let kernel: Vec<f64> = (-SMOOTHING_RADIUS..=SMOOTHING_RADIUS)
        .map(|i| (-0.5 * (i * i) as f64).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();

    (0..values.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .zip(-SMOOTHING_RADIUS..=SMOOTHING_RADIUS)
                .filter_map(|(k, offset)| {
                    let j = i + offset;
                    (j >= 0 && (j as usize) < values.len()).then(|| k * values[j as usize])
                })
                .sum::<f64>()
                / norm
        })
        .collect()
}

fn autocorrelation(values: &[f64], max_lag: usize) -> Vec<f64> {
    (0..=max_lag)
        .map(|lag| {
            values
                .iter()
                .zip(&values[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}
