//! Per-utterance feature extraction.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::audio::{decoder, mel, trim};
use crate::error::{PrepError, Result};

/// Frames × feature-dim matrix for one utterance.
pub type FeatureMatrix = Array2<f32>;

/// Mel and magnitude spectrograms of one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub mel: FeatureMatrix,
    pub mag: FeatureMatrix,
}

/// Turns one audio file into its features.
///
/// Implementations must be deterministic: the same file always yields the same
/// matrices, otherwise normalization statistics are not reproducible.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Features>;

    /// Signal-processing settings, recorded alongside the build.
    fn config(&self) -> Option<&FeatureConfig> {
        None
    }
}

/// Signal-processing parameters for [`SpectrogramExtractor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub preemphasis: f32,
    /// Silence threshold below the loudest frame, in dB.
    pub top_db: f32,
    pub ref_db: f32,
    pub max_db: f32,
}

impl FeatureConfig {
    /// Rejects settings that cannot produce a usable spectrogram.
    pub fn validate(&self) -> Result<()> {
        let invalid = |parameter, reason: &str| {
            Err(PrepError::InvalidFeatureConfig {
                parameter,
                reason: reason.to_string(),
            })
        };
        if self.sample_rate == 0 {
            return invalid("sample_rate", "must be positive");
        }
        if self.n_fft == 0 {
            return invalid("n_fft", "must be positive");
        }
        if self.hop_length == 0 {
            return invalid("hop_length", "must be positive");
        }
        if self.hop_length > self.n_fft {
            return invalid(
                "hop_length",
                &format!("{} exceeds n_fft {}", self.hop_length, self.n_fft),
            );
        }
        if self.n_mels == 0 {
            return invalid("n_mels", "must be positive");
        }
        Ok(())
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            n_fft: 1024,
            hop_length: 256,
            n_mels: 80,
            preemphasis: 0.97,
            top_db: 20.0,
            ref_db: 20.0,
            max_db: 100.0,
        }
    }
}

/// Decode → resample → trim → spectrograms.
#[derive(Debug, Clone, Default)]
pub struct SpectrogramExtractor {
    config: FeatureConfig,
}

impl SpectrogramExtractor {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl FeatureExtractor for SpectrogramExtractor {
    fn config(&self) -> Option<&FeatureConfig> {
        Some(&self.config)
    }

    fn extract(&self, path: &Path) -> Result<Features> {
        let decode_error = |err: anyhow::Error| PrepError::AudioDecode {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        };
        let pcm = decoder::decode_to_mono(path, self.config.sample_rate).map_err(decode_error)?;
        let trimmed = trim::trim_silence(&pcm, self.config.top_db);
        let (mel, mag) = mel::pcm_to_spectrograms(trimmed, &self.config).map_err(decode_error)?;
        Ok(Features { mel, mag })
    }
}
