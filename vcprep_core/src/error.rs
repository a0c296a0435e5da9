use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a dataset build.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("corpus not found at {path}: {reason}")]
    CorpusNotFound { path: PathBuf, reason: String },

    #[error("invalid split size for {parameter}: {reason}")]
    InvalidSplitSize {
        parameter: &'static str,
        reason: String,
    },

    #[error("duplicate utterance {file_name} for speaker {speaker_id}: {first} and {second}")]
    DuplicateUtterance {
        speaker_id: String,
        file_name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("invalid feature setting {parameter}: {reason}")]
    InvalidFeatureConfig {
        parameter: &'static str,
        reason: String,
    },

    #[error("failed to decode audio {path}: {reason}")]
    AudioDecode { path: PathBuf, reason: String },

    #[error("insufficient data for normalization: {0}")]
    InsufficientData(String),

    #[error("feature shape mismatch: expected {expected} dims, got {got}")]
    FeatureShape { expected: usize, got: usize },

    #[error("failed to write {path}: {source}")]
    IoWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    IoRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start extraction workers: {0}")]
    WorkerPool(String),

    #[error("failed to serialize {path}: {reason}")]
    Serialize { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, PrepError>;
