//! Speech corpus preparation for voice-conversion training.
//!
//! Partitions speakers and utterances into train / in_test / out_test, extracts
//! mel and magnitude spectrograms, normalizes them with train-split statistics
//! and persists the result.

pub mod audio;
pub mod corpus;
pub mod error;
pub mod features;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod split;
pub mod writer;

pub use corpus::{SpeakerCorpusMap, SpeakerId, UtteranceRef};
pub use error::{PrepError, Result};
pub use features::{FeatureConfig, FeatureExtractor, FeatureMatrix, Features, SpectrogramExtractor};
pub use normalize::NormalizationStats;
pub use pipeline::{PipelineConfig, PipelineStage, RunSummary, run};
pub use split::{SplitManifest, SplitName};
pub use writer::{DatasetWriter, FeatureBundle};
