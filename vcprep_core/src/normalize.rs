//! Global mean / std estimation over training features.

use ndarray::{Array1, ArrayView2, Axis, concatenate};
use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};
use crate::features::FeatureMatrix;

/// Per-dimension statistics estimated from the train split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

impl NormalizationStats {
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / std`, row by row.
    pub fn apply(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        if matrix.ncols() != self.dim() {
            return Err(PrepError::FeatureShape {
                expected: self.dim(),
                got: matrix.ncols(),
            });
        }
        Ok((matrix - &self.mean) / &self.std)
    }
}

/// Fails unless `max_samples` is in `1..=available`.
pub fn check_sample_size(max_samples: usize, available: usize) -> Result<()> {
    if max_samples == 0 {
        return Err(PrepError::InsufficientData(
            "attribute estimation needs at least one utterance".to_string(),
        ));
    }
    if max_samples > available {
        return Err(PrepError::InsufficientData(format!(
            "{max_samples} utterances requested for estimation but the train split has {available}"
        )));
    }
    Ok(())
}

/// Estimates mean and population std from the first `max_samples` matrices.
///
/// Callers pass matrices in sorted-path order; the sample is taken as a prefix,
/// never resampled.
pub fn estimate(train_features: &[FeatureMatrix], max_samples: usize) -> Result<NormalizationStats> {
    check_sample_size(max_samples, train_features.len())?;

    let sample = &train_features[..max_samples];
    let dim = sample[0].ncols();
    if let Some(bad) = sample.iter().find(|m| m.ncols() != dim) {
        return Err(PrepError::FeatureShape {
            expected: dim,
            got: bad.ncols(),
        });
    }

    let views: Vec<ArrayView2<f32>> = sample.iter().map(|m| m.view()).collect();
    let frames = concatenate(Axis(0), &views)
        .map_err(|err| PrepError::InsufficientData(err.to_string()))?
        .mapv(f64::from);
    if frames.nrows() == 0 {
        return Err(PrepError::InsufficientData(
            "sampled utterances contain no frames".to_string(),
        ));
    }

    let mean = frames
        .mean_axis(Axis(0))
        .ok_or_else(|| PrepError::InsufficientData("empty frame axis".to_string()))?;
    let std = frames.std_axis(Axis(0), 0.0);

    if let Some(dim) = std.iter().position(|&s| s == 0.0) {
        return Err(PrepError::InsufficientData(format!(
            "feature dimension {dim} has zero variance over {} frames",
            frames.nrows()
        )));
    }

    Ok(NormalizationStats {
        mean: mean.mapv(|v| v as f32),
        std: std.mapv(|v| v as f32),
    })
}
