//! Key estimation by correlating an energy chromagram with the
//! Krumhansl-Kessler key profiles.

use super::spectrum::{for_each_magnitude_frame, frame_size_for};
use super::{AnalysisError, MonoAudio};
use std::fmt;

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

pub const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Bins outside this band are too coarse or mostly overtones.
const MIN_FREQUENCY: f64 = 65.0;
const MAX_FREQUENCY: f64 = 2_100.0;
const REFERENCE_FRAME_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Major,
    Minor,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyEstimate {
    pub tonic: &'static str,
    pub scale: Scale,
    /// Pearson correlation of the winning profile.
    pub strength: f64,
}

impl fmt::Display for KeyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.tonic, self.scale.as_str())
    }
}

pub fn estimate_key(audio: &MonoAudio) -> Result<KeyEstimate, AnalysisError> {
    let chroma = chromagram(audio)?;
    if chroma.iter().all(|c| *c <= f64::EPSILON) {
        return Err(AnalysisError::NoPitchContent);
    }

    let mut best: Option<KeyEstimate> = None;
    for (tonic, name) in PITCH_NAMES.iter().enumerate() {
        for (scale, profile) in [(Scale::Major, &MAJOR_PROFILE), (Scale::Minor, &MINOR_PROFILE)] {
            let rotated: Vec<f64> = (0..12).map(|pc| profile[(pc + 12 - tonic) % 12]).collect();
            let strength = pearson(&chroma, &rotated);
            if best.map_or(true, |b| strength > b.strength) {
                best = Some(KeyEstimate {
                    tonic: *name,
                    scale,
                    strength,
                });
            }
        }
    }
    best.ok_or(AnalysisError::NoPitchContent)
}

fn chromagram(audio: &MonoAudio) -> Result<[f64; 12], AnalysisError> {
    let frame_size = frame_size_for(audio.sample_rate, REFERENCE_FRAME_SIZE);
    let hop = frame_size / 2;
    let bin_hz = audio.sample_rate as f64 / frame_size as f64;

    // Pitch class of every bin inside the analysed band.
    let bin_classes: Vec<Option<usize>> = (0..frame_size / 2 + 1)
        .map(|bin| {
            let freq = bin as f64 * bin_hz;
            if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&freq) {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(12) as usize)
        })
        .collect();

    let mut chroma = [0.0f64; 12];
    let frames = for_each_magnitude_frame(&audio.samples, frame_size, hop, |mags| {
        for (mag, class) in mags.iter().zip(&bin_classes) {
            if let Some(pc) = class {
                chroma[*pc] += (*mag as f64) * (*mag as f64);
            }
        }
    })?;
    if frames == 0 {
        return Err(AnalysisError::TooShort);
    }
    Ok(chroma)
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den_a = 0.0;
    let mut den_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        num += (x - mean_a) * (y - mean_b);
        den_a += (x - mean_a).powi(2);
        den_b += (y - mean_b).powi(2);
    }
    if den_a <= 0.0 || den_b <= 0.0 {
        return 0.0;
    }
    num / (den_a.sqrt() * den_b.sqrt())
}
