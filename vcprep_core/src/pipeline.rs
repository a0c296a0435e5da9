//! Dataset build driver: index → partition → split → extract → normalize → persist.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};

use crate::corpus::{self, UtteranceRef};
use crate::error::{PrepError, Result};
use crate::features::{FeatureConfig, FeatureExtractor, FeatureMatrix, Features};
use crate::normalize::{self, NormalizationStats};
use crate::partition::{self, SpeakerPartition};
use crate::split::{self, SplitManifest, SplitName};
use crate::writer::{DatasetWriter, FeatureBundle};

const PROGRESS_EVERY: usize = 500;

/// Inputs of one dataset build.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub source_speaker_list: PathBuf,
    pub target_speaker_list: PathBuf,
    pub output_dir: PathBuf,
    /// Source speakers held out from training entirely.
    pub test_speakers: usize,
    /// Share of each train speaker's utterances moved to in_test.
    pub test_proportion: f64,
    /// Train utterances used to estimate mean / std.
    pub n_utts_attr: usize,
    /// Drawn from OS entropy when unset; always recorded in `build_info.json`.
    pub seed: Option<u64>,
    /// Extraction threads; rayon's default when unset.
    pub jobs: Option<usize>,
    /// Also persist the unnormalized magnitude spectrograms.
    pub save_magnitudes: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("wav48"),
            source_speaker_list: PathBuf::from("speaker-info.txt"),
            target_speaker_list: PathBuf::from("target-speakers.txt"),
            output_dir: PathBuf::from("dataset_out"),
            test_speakers: 20,
            test_proportion: 0.1,
            n_utts_attr: 5000,
            seed: None,
            jobs: None,
            save_magnitudes: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    Indexed,
    Partitioned,
    Split,
    ExtractedTrain,
    Normalized,
    ExtractedTest,
    Persisted,
    Aborted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Start => "start",
            PipelineStage::Indexed => "indexed",
            PipelineStage::Partitioned => "partitioned",
            PipelineStage::Split => "split",
            PipelineStage::ExtractedTrain => "extracted(train)",
            PipelineStage::Normalized => "normalized",
            PipelineStage::ExtractedTest => "extracted(test)",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub train: usize,
    pub in_test: usize,
    pub out_test: usize,
    pub feature_dim: usize,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    seed: u64,
    data_dir: &'a PathBuf,
    source_speaker_list: &'a PathBuf,
    target_speaker_list: &'a PathBuf,
    test_speakers: usize,
    test_proportion: f64,
    n_utts_attr: usize,
    save_magnitudes: bool,
    features: Option<&'a FeatureConfig>,
    speakers: &'a SpeakerPartition,
    train_files: usize,
    in_test_files: usize,
    out_test_files: usize,
}

/// Runs a full dataset build with `extractor`.
///
/// Any error aborts the run; artifacts already persisted stay on disk.
pub fn run<E: FeatureExtractor>(config: &PipelineConfig, extractor: &E) -> Result<RunSummary> {
    let mut pipeline = Pipeline::new(config, extractor)?;
    match pipeline.execute() {
        Ok(summary) => Ok(summary),
        Err(err) => {
            error!("dataset build aborted after stage {}: {err}", pipeline.stage);
            pipeline.advance(PipelineStage::Aborted);
            Err(err)
        }
    }
}

struct Pipeline<'a, E> {
    config: &'a PipelineConfig,
    extractor: &'a E,
    pool: rayon::ThreadPool,
    stage: PipelineStage,
}

impl<'a, E: FeatureExtractor> Pipeline<'a, E> {
    fn new(config: &'a PipelineConfig, extractor: &'a E) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.jobs.unwrap_or(0))
            .build()
            .map_err(|err| PrepError::WorkerPool(err.to_string()))?;
        Ok(Self {
            config,
            extractor,
            pool,
            stage: PipelineStage::Start,
        })
    }

    fn advance(&mut self, stage: PipelineStage) {
        info!("stage {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn execute(&mut self) -> Result<RunSummary> {
        let config = self.config;
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        info!("building dataset from {} with seed {seed}", config.data_dir.display());

        let corpus = corpus::index(&config.data_dir)?;
        info!(
            "indexed {} speakers, {} utterances",
            corpus.len(),
            corpus.values().map(Vec::len).sum::<usize>()
        );
        self.advance(PipelineStage::Indexed);

        let target_ids = corpus::read_speaker_info(&config.target_speaker_list)?;
        let source_ids = corpus::read_speaker_info(&config.source_speaker_list)?;
        let partition = partition::partition_speakers(
            &source_ids,
            &target_ids,
            config.test_speakers,
            &corpus,
            &mut rng,
        )?;
        self.advance(PipelineStage::Partitioned);

        let manifest =
            split::split_utterances(&corpus, &partition, config.test_proportion, &mut rng)?;
        // Decoding is the expensive part; refuse an impossible sample up front.
        normalize::check_sample_size(config.n_utts_attr, manifest.train.len())?;
        let writer = DatasetWriter::new(&config.output_dir)?;
        self.persist_split_layout(&writer, seed, &partition, &manifest)?;
        self.advance(PipelineStage::Split);

        let train = manifest.sorted(SplitName::Train);
        let (train_mels, train_mags) = self.extract_split(SplitName::Train, &train)?;
        self.advance(PipelineStage::ExtractedTrain);

        let stats = normalize::estimate(&train_mels, config.n_utts_attr)?;
        writer.write_stats(&stats)?;
        self.advance(PipelineStage::Normalized);

        self.persist_split(&writer, SplitName::Train, &train, train_mels, train_mags, &stats)?;
        for split in [SplitName::InTest, SplitName::OutTest] {
            let utterances = manifest.sorted(split);
            let (mels, mags) = self.extract_split(split, &utterances)?;
            self.persist_split(&writer, split, &utterances, mels, mags, &stats)?;
        }
        self.advance(PipelineStage::ExtractedTest);

        self.advance(PipelineStage::Persisted);
        Ok(RunSummary {
            seed,
            train: manifest.train.len(),
            in_test: manifest.in_test.len(),
            out_test: manifest.out_test.len(),
            feature_dim: stats.dim(),
        })
    }

    fn persist_split_layout(
        &self,
        writer: &DatasetWriter,
        seed: u64,
        partition: &SpeakerPartition,
        manifest: &SplitManifest,
    ) -> Result<()> {
        for split in SplitName::ALL {
            let paths: Vec<PathBuf> = manifest.get(split).iter().map(|u| u.path.clone()).collect();
            writer.write_manifest(split, &paths)?;
        }
        writer.write_speaker_list("train", &partition.train)?;
        writer.write_speaker_list("test", &partition.source_test)?;
        writer.write_speaker_list("target", &partition.target)?;

        let config = self.config;
        writer.write_build_info(&BuildInfo {
            seed,
            data_dir: &config.data_dir,
            source_speaker_list: &config.source_speaker_list,
            target_speaker_list: &config.target_speaker_list,
            test_speakers: config.test_speakers,
            test_proportion: config.test_proportion,
            n_utts_attr: config.n_utts_attr,
            save_magnitudes: config.save_magnitudes,
            features: self.extractor.config(),
            speakers: partition,
            train_files: manifest.train.len(),
            in_test_files: manifest.in_test.len(),
            out_test_files: manifest.out_test.len(),
        })?;
        Ok(())
    }

    /// Extracts features for `utterances`, keeping their order.
    fn extract_split(
        &self,
        split: SplitName,
        utterances: &[UtteranceRef],
    ) -> Result<(Vec<FeatureMatrix>, Vec<FeatureMatrix>)> {
        let total = utterances.len();
        info!("processing {split} set, {total} files");
        let done = AtomicUsize::new(0);
        let extractor = self.extractor;

        let features: Vec<Features> = self.pool.install(|| {
            utterances
                .par_iter()
                .map(|utt| -> Result<Features> {
                    let features = extractor.extract(&utt.path)?;
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % PROGRESS_EVERY == 0 || n == total {
                        info!("processed {n}/{total} {split} files");
                    }
                    Ok(features)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        Ok(features.into_iter().map(|f| (f.mel, f.mag)).unzip())
    }

    fn persist_split(
        &self,
        writer: &DatasetWriter,
        split: SplitName,
        utterances: &[UtteranceRef],
        mels: Vec<FeatureMatrix>,
        mags: Vec<FeatureMatrix>,
        stats: &NormalizationStats,
    ) -> Result<()> {
        let mut bundle = FeatureBundle::new();
        for (utt, mel) in utterances.iter().zip(&mels) {
            bundle.insert(utt.file_name(), stats.apply(mel)?);
        }
        writer.write(split, &bundle)?;

        if self.config.save_magnitudes {
            let mag_bundle: FeatureBundle = utterances
                .iter()
                .map(UtteranceRef::file_name)
                .zip(mags)
                .collect();
            writer.write_magnitudes(split, &mag_bundle)?;
        }
        Ok(())
    }
}
