use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;
use vcprep_core::corpus::parse_utterance_name;
use vcprep_core::writer::manifest_file_name;
use vcprep_core::SplitName;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ManifestLine {
    pub audio_path: String,
    pub speaker_id: String,
    pub split: SplitName,
}

/// Counts reported after a conversion.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub kept: usize,
    pub skipped_unparseable: usize,
    pub missing_manifests: usize,
}

/// Merges the `<split>_files.txt` manifests of a dataset build into one JSONL file.
pub fn convert(dataset_dir: &Path, out_path: &Path) -> Result<ConvertSummary> {
    info!("Converting manifests in {} to JSONL", dataset_dir.display());

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let out_file = File::create(out_path)
        .with_context(|| format!("Failed to create output: {}", out_path.display()))?;
    let mut writer = BufWriter::new(out_file);
    let mut summary = ConvertSummary::default();

    for split in SplitName::ALL {
        let manifest_path: PathBuf = dataset_dir.join(manifest_file_name(split));
        if !manifest_path.exists() {
            summary.missing_manifests += 1;
            continue;
        }
        let reader = BufReader::new(
            File::open(&manifest_path)
                .with_context(|| format!("Failed to open manifest: {}", manifest_path.display()))?,
        );

        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read {}", manifest_path.display()))?;
            let audio_path = line.trim();
            if audio_path.is_empty() {
                continue;
            }

            let file_name = Path::new(audio_path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let Some((speaker_id, _)) = parse_utterance_name(file_name) else {
                summary.skipped_unparseable += 1;
                continue;
            };

            let line = ManifestLine {
                audio_path: audio_path.to_string(),
                speaker_id,
                split,
            };
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n")?;
            summary.kept += 1;
        }
    }

    writer.flush()?;

    info!("Wrote: {}", out_path.display());
    info!("Kept: {}", summary.kept);
    info!("Skipped (unparseable file name): {}", summary.skipped_unparseable);
    info!("Missing manifests: {}", summary.missing_manifests);

    Ok(summary)
}
