use super::AnalysisError;
use realfft::RealFftPlanner;

const REFERENCE_SAMPLE_RATE: f64 = 44_100.0;

/// Power-of-two frame size giving roughly the same time span that
/// `reference_size` covers at 44.1 kHz.
pub(crate) fn frame_size_for(sample_rate: u32, reference_size: usize) -> usize {
    let target = reference_size as f64 * sample_rate as f64 / REFERENCE_SAMPLE_RATE;
    let exponent = target.max(256.0).log2().round() as u32;
    1usize << exponent
}

/// Hann-windowed STFT. `on_frame` receives the magnitude spectrum
/// (`frame_size / 2 + 1` bins) of each full frame, in order.
pub(crate) fn for_each_magnitude_frame<F>(
    samples: &[f32],
    frame_size: usize,
    hop: usize,
    mut on_frame: F,
) -> Result<usize, AnalysisError>
where
    F: FnMut(&[f32]),
{
    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame_size);

    // Hann window for reduced spectral leakage
    let window: Vec<f32> = (0..frame_size)
        .map(|i| {
            let x = std::f32::consts::PI * 2.0 * i as f32 / (frame_size - 1) as f32;
            0.5 * (1.0 - x.cos())
        })
        .collect();

    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut scratch = fft.make_scratch_vec();
    let mut magnitudes = vec![0.0f32; spectrum.len()];

    let mut frames = 0;
    let mut start = 0;
    while start + frame_size <= samples.len() {
        for ((slot, sample), w) in input
            .iter_mut()
            .zip(&samples[start..start + frame_size])
            .zip(&window)
        {
            *slot = sample * w;
        }
        fft.process_with_scratch(&mut input, &mut spectrum, &mut scratch)
            .map_err(|e| AnalysisError::Dsp(e.to_string()))?;
        for (mag, bin) in magnitudes.iter_mut().zip(&spectrum) {
            *mag = bin.norm();
        }
        on_frame(&magnitudes);
        frames += 1;
        start += hop;
    }
    Ok(frames)
}
