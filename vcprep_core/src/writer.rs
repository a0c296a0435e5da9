//! Persists manifests, feature bundles and statistics into the output directory.
//!
//! Every artifact is written to a temporary file next to its destination and
//! renamed into place, so a failed write never leaves a truncated artifact.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::info;

use crate::corpus::SpeakerId;
use crate::error::{PrepError, Result};
use crate::features::FeatureMatrix;
use crate::normalize::NormalizationStats;
use crate::split::SplitName;

/// Utterance file name to its feature matrix.
pub type FeatureBundle = BTreeMap<String, FeatureMatrix>;

pub const STATS_FILE: &str = "attr.pkl";
pub const BUILD_INFO_FILE: &str = "build_info.json";

pub fn bundle_file_name(split: SplitName) -> String {
    format!("{split}.pkl")
}

pub fn magnitude_file_name(split: SplitName) -> String {
    format!("{split}_mag.pkl")
}

pub fn manifest_file_name(split: SplitName) -> String {
    format!("{split}_files.txt")
}

/// Writes the artifacts of one dataset build.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    out_dir: PathBuf,
}

impl DatasetWriter {
    /// Creates `out_dir` if it does not exist.
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir).map_err(|source| PrepError::IoWrite {
            path: out_dir.clone(),
            source,
        })?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn write(&self, split: SplitName, bundle: &FeatureBundle) -> Result<PathBuf> {
        let path = self.write_msgpack(&bundle_file_name(split), bundle)?;
        info!("wrote {} utterances to {}", bundle.len(), path.display());
        Ok(path)
    }

    pub fn write_magnitudes(&self, split: SplitName, bundle: &FeatureBundle) -> Result<PathBuf> {
        self.write_msgpack(&magnitude_file_name(split), bundle)
    }

    pub fn write_stats(&self, stats: &NormalizationStats) -> Result<PathBuf> {
        self.write_msgpack(STATS_FILE, stats)
    }

    /// Newline-delimited source paths.
    pub fn write_manifest(&self, split: SplitName, paths: &[PathBuf]) -> Result<PathBuf> {
        let lines = paths.iter().map(|p| p.display().to_string());
        self.write_lines(&manifest_file_name(split), lines)
    }

    pub fn write_speaker_list(&self, name: &str, speakers: &[SpeakerId]) -> Result<PathBuf> {
        self.write_lines(&format!("{name}_speakers.txt"), speakers.iter().cloned())
    }

    pub fn write_build_info<T: Serialize>(&self, info: &T) -> Result<PathBuf> {
        self.write_atomic(BUILD_INFO_FILE, |writer| {
            serde_json::to_writer_pretty(&mut *writer, info).map_err(|err| err.to_string())
        })
    }

    fn write_lines(&self, name: &str, lines: impl Iterator<Item = String>) -> Result<PathBuf> {
        self.write_atomic(name, |writer| {
            for line in lines {
                writeln!(writer, "{line}").map_err(|err| err.to_string())?;
            }
            Ok(())
        })
    }

    fn write_msgpack<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        self.write_atomic(name, |writer| {
            rmp_serde::encode::write_named(writer, value).map_err(|err| err.to_string())
        })
    }

    fn write_atomic<F>(&self, name: &str, fill: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> std::result::Result<(), String>,
    {
        let dest = self.out_dir.join(name);
        let io_error = |source| PrepError::IoWrite {
            path: dest.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.out_dir).map_err(io_error)?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            fill(&mut writer).map_err(|reason| PrepError::Serialize {
                path: dest.clone(),
                reason,
            })?;
            writer.flush().map_err(io_error)?;
        }
        tmp.as_file().sync_all().map_err(io_error)?;
        tmp.persist(&dest).map_err(|err| io_error(err.error))?;
        Ok(dest)
    }
}

/// Loads a feature bundle written by [`DatasetWriter::write`].
pub fn read_bundle(path: &Path) -> Result<FeatureBundle> {
    read_msgpack(path)
}

/// Loads statistics written by [`DatasetWriter::write_stats`].
pub fn read_stats(path: &Path) -> Result<NormalizationStats> {
    read_msgpack(path)
}

fn read_msgpack<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).map_err(|source| PrepError::IoRead {
        path: path.to_path_buf(),
        source,
    })?;
    rmp_serde::from_slice(&bytes).map_err(|err| PrepError::Serialize {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}
