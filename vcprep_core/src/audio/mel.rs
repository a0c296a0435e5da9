use anyhow::{anyhow, Context, Result};
use mel_spec::prelude::*;
use ndarray::Array2;

use crate::features::FeatureConfig;

/// Convert mono PCM at `cfg.sample_rate` into `(mel, mag)` spectrograms.
///
/// Both matrices are laid out as (frames, dims): `cfg.n_mels` mel bands and
/// `cfg.n_fft / 2 + 1` magnitude bins. Magnitudes are scaled to `[1e-8, 1]`
/// on a dB scale relative to `cfg.ref_db` / `cfg.max_db`.
pub fn pcm_to_spectrograms(pcm: &[f32], cfg: &FeatureConfig) -> Result<(Array2<f32>, Array2<f32>)> {
    cfg.validate()?;
    let hop_size = cfg.hop_length;
    let n_bins = cfg.n_fft / 2 + 1;

    let mut stft = Spectrogram::new(cfg.n_fft, hop_size);
    let mut mel = MelSpectrogram::new(cfg.n_fft, cfg.sample_rate as f64, cfg.n_mels);

    let emphasized = preemphasis(pcm, cfg.preemphasis);

    let mut mel_flat: Vec<f32> = Vec::new();
    let mut mag_flat: Vec<f32> = Vec::new();
    let mut n_frames = 0usize;

    for chunk in emphasized.chunks(hop_size) {
        // pad last hop
        let mut hop = vec![0.0f32; hop_size];
        hop[..chunk.len()].copy_from_slice(chunk);

        if let Some(fft_frame) = stft.add(&hop) {
            mag_flat.extend(
                fft_frame
                    .iter()
                    .take(n_bins)
                    .map(|c| amp_to_unit_db(c.norm() as f32, cfg.ref_db, cfg.max_db)),
            );
            let mel_frame = mel.add(&fft_frame);
            mel_flat.extend(mel_frame.iter().map(|&v| v as f32));
            n_frames += 1;
        }
    }

    if n_frames == 0 {
        return Err(anyhow!(
            "audio too short: {} samples yield no {}-point frames",
            pcm.len(),
            cfg.n_fft
        ));
    }

    let mel_dim = mel_flat.len() / n_frames;
    let mag_dim = mag_flat.len() / n_frames;
    let mel = Array2::from_shape_vec((n_frames, mel_dim), mel_flat)
        .context("mel frames have inconsistent lengths")?;
    let mag = Array2::from_shape_vec((n_frames, mag_dim), mag_flat)
        .context("magnitude frames have inconsistent lengths")?;
    Ok((mel, mag))
}

fn preemphasis(pcm: &[f32], coeff: f32) -> Vec<f32> {
    if coeff == 0.0 {
        return pcm.to_vec();
    }
    let mut out = Vec::with_capacity(pcm.len());
    let mut prev = 0.0f32;
    for &s in pcm {
        out.push(s - coeff * prev);
        prev = s;
    }
    out
}

fn amp_to_unit_db(amplitude: f32, ref_db: f32, max_db: f32) -> f32 {
    let db = 20.0 * amplitude.max(1e-5).log10();
    ((db - ref_db + max_db) / max_db).clamp(1e-8, 1.0)
}
