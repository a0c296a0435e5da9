//! Utterance-level train / in_test / out_test assignment.

use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::corpus::{SpeakerCorpusMap, SpeakerId, UtteranceRef};
use crate::error::{PrepError, Result};
use crate::partition::SpeakerPartition;

/// Dataset split an utterance is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitName {
    Train,
    InTest,
    OutTest,
}

impl SplitName {
    pub const ALL: [SplitName; 3] = [SplitName::Train, SplitName::InTest, SplitName::OutTest];

    pub fn as_str(self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::InTest => "in_test",
            SplitName::OutTest => "out_test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Utterances assigned to each split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitManifest {
    pub train: Vec<UtteranceRef>,
    pub in_test: Vec<UtteranceRef>,
    pub out_test: Vec<UtteranceRef>,
}

impl SplitManifest {
    pub fn get(&self, split: SplitName) -> &[UtteranceRef] {
        match split {
            SplitName::Train => &self.train,
            SplitName::InTest => &self.in_test,
            SplitName::OutTest => &self.out_test,
        }
    }

    /// Utterances of `split` sorted by path, the order used for extraction.
    pub fn sorted(&self, split: SplitName) -> Vec<UtteranceRef> {
        let mut utterances = self.get(split).to_vec();
        utterances.sort_by(|a, b| a.path.cmp(&b.path));
        utterances
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.in_test.len() + self.out_test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assigns every utterance of the partitioned speakers to a split.
///
/// Train speakers are shuffled and their last `floor(n * test_proportion)`
/// utterances go to in_test. Source-test speakers go entirely to in_test and
/// target speakers entirely to out_test, both in enumeration order.
pub fn split_utterances<R: Rng + ?Sized>(
    corpus: &SpeakerCorpusMap,
    partition: &SpeakerPartition,
    test_proportion: f64,
    rng: &mut R,
) -> Result<SplitManifest> {
    if !(0.0..=1.0).contains(&test_proportion) {
        return Err(PrepError::InvalidSplitSize {
            parameter: "test_proportion",
            reason: format!("{test_proportion} is outside [0, 1]"),
        });
    }

    let mut manifest = SplitManifest::default();
    for speaker in &partition.train {
        let mut utterances = utterances_of(corpus, speaker);
        utterances.shuffle(rng);
        let k = (utterances.len() as f64 * test_proportion).floor() as usize;
        let test = utterances.split_off(utterances.len() - k.min(utterances.len()));
        manifest.train.extend(utterances);
        manifest.in_test.extend(test);
    }
    for speaker in &partition.source_test {
        manifest.in_test.extend(utterances_of(corpus, speaker));
    }
    for speaker in &partition.target {
        manifest.out_test.extend(utterances_of(corpus, speaker));
    }
    Ok(manifest)
}

fn utterances_of(corpus: &SpeakerCorpusMap, speaker: &SpeakerId) -> Vec<UtteranceRef> {
    corpus.get(speaker).cloned().unwrap_or_default()
}
