//! Speaker-level partitioning into train, source-test and target groups.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, warn};

use crate::corpus::{SpeakerCorpusMap, SpeakerId};
use crate::error::{PrepError, Result};

/// Disjoint speaker groups for one dataset build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpeakerPartition {
    /// Source speakers whose utterances are split into train / in_test.
    pub train: Vec<SpeakerId>,
    /// Source speakers held out entirely for in_test.
    pub source_test: Vec<SpeakerId>,
    /// Held-out conversion targets, out_test only.
    pub target: Vec<SpeakerId>,
}

/// Shuffles the source speakers and moves the last `test_speakers` into the
/// source-test group. Target speakers are removed from the source list first.
pub fn partition_speakers<R: Rng + ?Sized>(
    source_ids: &[SpeakerId],
    target_ids: &[SpeakerId],
    test_speakers: usize,
    corpus: &SpeakerCorpusMap,
    rng: &mut R,
) -> Result<SpeakerPartition> {
    let target = dedup(target_ids.iter());
    let target_set: HashSet<&SpeakerId> = target.iter().collect();
    let mut source = dedup(source_ids.iter().filter(|id| !target_set.contains(id)));

    if test_speakers >= source.len() {
        return Err(PrepError::InvalidSplitSize {
            parameter: "test_speakers",
            reason: format!(
                "{test_speakers} test speakers requested but only {} source speakers available",
                source.len()
            ),
        });
    }

    for id in source.iter().chain(target.iter()) {
        if !corpus.contains_key(id) {
            warn!("speaker {id} is listed but has no utterances in the corpus");
        }
    }

    source.shuffle(rng);
    let source_test = source.split_off(source.len() - test_speakers);
    info!(
        "partitioned speakers: {} train, {} source test, {} target",
        source.len(),
        source_test.len(),
        target.len()
    );
    Ok(SpeakerPartition {
        train: source,
        source_test,
        target,
    })
}

fn dedup<'a>(ids: impl Iterator<Item = &'a SpeakerId>) -> Vec<SpeakerId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}
