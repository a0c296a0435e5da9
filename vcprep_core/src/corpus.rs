//! Corpus discovery: speaker directories, utterance files and speaker lists.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{PrepError, Result};

pub type SpeakerId = String;

/// Speaker id to that speaker's utterances, in scan order.
pub type SpeakerCorpusMap = BTreeMap<SpeakerId, Vec<UtteranceRef>>;

/// One discovered utterance file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceRef {
    pub path: PathBuf,
    pub speaker_id: SpeakerId,
    pub utterance_id: String,
}

impl UtteranceRef {
    /// File name used as the key in feature bundles.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn utterance_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^p(\d+)_(\d+)\.wav$").expect("static regex"))
}

/// Parses `p<speaker>_<utt>.wav` into `(speaker, utt)`.
pub fn parse_utterance_name(file_name: &str) -> Option<(String, String)> {
    let caps = utterance_pattern().captures(file_name)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Scans `root_dir/<speaker-dir>/<file>` and groups matching files by speaker.
///
/// Entries are visited in lexicographic path order. Files that do not match the
/// utterance pattern are skipped. File names key the feature bundles, so the
/// same name appearing twice for one speaker is an error.
pub fn index(root_dir: &Path) -> Result<SpeakerCorpusMap> {
    if !root_dir.is_dir() {
        return Err(PrepError::CorpusNotFound {
            path: root_dir.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let mut map = SpeakerCorpusMap::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut total = 0usize;
    for speaker_dir in sorted_entries(root_dir)? {
        if !speaker_dir.is_dir() {
            continue;
        }
        for path in sorted_entries(&speaker_dir)? {
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((speaker_id, utterance_id)) = parse_utterance_name(file_name) else {
                debug!("skipping {}", path.display());
                continue;
            };
            if let Some(first) = seen.get(file_name) {
                return Err(PrepError::DuplicateUtterance {
                    speaker_id,
                    file_name: file_name.to_string(),
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(file_name.to_string(), path.clone());
            map.entry(speaker_id.clone()).or_default().push(UtteranceRef {
                path,
                speaker_id,
                utterance_id,
            });
            total += 1;
        }
    }

    if total == 0 {
        return Err(PrepError::CorpusNotFound {
            path: root_dir.to_path_buf(),
            reason: "no files matching p<speaker>_<utt>.wav".to_string(),
        });
    }
    Ok(map)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = fs::read_dir(dir).map_err(|err| PrepError::CorpusNotFound {
        path: dir.to_path_buf(),
        reason: err.to_string(),
    })?;
    let mut paths = Vec::new();
    for entry in read {
        let entry = entry.map_err(|err| PrepError::CorpusNotFound {
            path: dir.to_path_buf(),
            reason: err.to_string(),
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Reads a speaker-info list: header line skipped, first token of each line kept.
pub fn read_speaker_info(path: &Path) -> Result<Vec<SpeakerId>> {
    let text = fs::read_to_string(path).map_err(|err| PrepError::CorpusNotFound {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Ok(parse_speaker_info(&text))
}

pub fn parse_speaker_info(text: &str) -> Vec<SpeakerId> {
    text.lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(normalize_speaker_id)
        .collect()
}

/// `p225` and `225` name the same speaker.
pub fn normalize_speaker_id(token: &str) -> SpeakerId {
    match token.strip_prefix('p') {
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.to_string()
        }
        _ => token.to_string(),
    }
}
