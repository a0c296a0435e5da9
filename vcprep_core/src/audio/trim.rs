/// Frame length and hop used for silence detection.
const TRIM_FRAME: usize = 2048;
const TRIM_HOP: usize = 512;

/// Drops leading and trailing audio quieter than `top_db` below the loudest frame.
///
/// Loudness is frame RMS in dB. The returned slice spans from the first to the
/// last non-silent frame; fully silent input yields an empty slice.
pub fn trim_silence(samples: &[f32], top_db: f32) -> &[f32] {
    if samples.is_empty() {
        return samples;
    }

    let frame_len = TRIM_FRAME.min(samples.len());
    let n_frames = 1 + (samples.len() - frame_len) / TRIM_HOP;
    let rms: Vec<f32> = (0..n_frames)
        .map(|f| {
            let frame = &samples[f * TRIM_HOP..f * TRIM_HOP + frame_len];
            (frame.iter().map(|s| s * s).sum::<f32>() / frame_len as f32).sqrt()
        })
        .collect();

    let peak = rms.iter().cloned().fold(0.0f32, f32::max);
    if peak <= 0.0 {
        return &samples[..0];
    }
    let threshold = peak * 10f32.powf(-top_db / 20.0);

    let Some(first) = rms.iter().position(|&r| r > threshold) else {
        return &samples[..0];
    };
    let last = rms.iter().rposition(|&r| r > threshold).unwrap_or(first);

    let start = first * TRIM_HOP;
    let end = (last * TRIM_HOP + frame_len).min(samples.len());
    &samples[start..end]
}
