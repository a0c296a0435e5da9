use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use vcprep_core::{FeatureConfig, PipelineConfig};

/// Build train / in_test / out_test feature sets from a VCTK-style corpus.
#[derive(Parser, Debug)]
#[command(name = "vcprep", author, version, about, long_about = None)]
pub struct Args {
    /// Corpus root containing one directory per speaker
    pub data_dir: PathBuf,

    /// Speaker-info list of source speakers (header line skipped)
    pub source_speaker_list: PathBuf,

    /// Speaker-info list of held-out target speakers (header line skipped)
    pub target_speaker_list: PathBuf,

    /// Directory receiving manifests, feature bundles and statistics
    pub output_dir: PathBuf,

    /// Number of source speakers held out from training
    pub test_speakers: usize,

    /// Share of each training speaker's utterances used for in_test
    pub test_proportion: f64,

    /// Sampling rate audio is resampled to before feature extraction
    pub sample_rate: u32,

    /// Number of train utterances used to estimate mean / std
    pub n_utts_attr: usize,

    /// Seed for speaker and utterance shuffling (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Extraction worker threads (all cores when omitted)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    #[arg(long, default_value_t = 1024)]
    pub n_fft: usize,

    #[arg(long, default_value_t = 256)]
    pub hop_length: usize,

    #[arg(long, default_value_t = 80)]
    pub n_mels: usize,

    /// Silence threshold for trimming, in dB below the loudest frame
    #[arg(long, default_value_t = 20.0)]
    pub top_db: f32,

    /// Also write unnormalized magnitude spectrograms (<split>_mag.pkl)
    #[arg(long)]
    pub save_mag: bool,

    /// Write a per-run log file into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Export all split manifests as JSONL to this path after the build
    #[arg(long)]
    pub jsonl: Option<PathBuf>,
}

/// Parses `argv`; `Ok(None)` when clap already printed `--help` / `--version`.
///
/// Usage errors come back as `Err` so they exit through the same path as
/// build failures.
pub fn parse<I, T>(argv: I) -> anyhow::Result<Option<Args>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Args::try_parse_from(argv) {
        Ok(args) => Ok(Some(args)),
        Err(err) if !err.use_stderr() => {
            err.print()?;
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            data_dir: self.data_dir.clone(),
            source_speaker_list: self.source_speaker_list.clone(),
            target_speaker_list: self.target_speaker_list.clone(),
            output_dir: self.output_dir.clone(),
            test_speakers: self.test_speakers,
            test_proportion: self.test_proportion,
            n_utts_attr: self.n_utts_attr,
            seed: self.seed,
            jobs: self.jobs,
            save_magnitudes: self.save_mag,
        }
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            sample_rate: self.sample_rate,
            n_fft: self.n_fft,
            hop_length: self.hop_length,
            n_mels: self.n_mels,
            top_db: self.top_db,
            ..FeatureConfig::default()
        }
    }
}
