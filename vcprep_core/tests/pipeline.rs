use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Axis, concatenate};
use vcprep_core::corpus::parse_utterance_name;
use vcprep_core::writer::{read_bundle, read_stats};
use vcprep_core::{
    FeatureConfig, FeatureExtractor, Features, PipelineConfig, PrepError, SpectrogramExtractor,
    run,
};

/// Deterministic features derived from the file name, no audio decoding.
struct SyntheticExtractor {
    fail_on: Option<String>,
    constant_dim: bool,
    config: FeatureConfig,
    calls: AtomicUsize,
}

impl SyntheticExtractor {
    fn new() -> Self {
        Self {
            fail_on: None,
            constant_dim: false,
            config: FeatureConfig {
                sample_rate: 16_000,
                n_mels: 4,
                ..FeatureConfig::default()
            },
            calls: AtomicUsize::new(0),
        }
    }
}

impl FeatureExtractor for SyntheticExtractor {
    fn config(&self) -> Option<&FeatureConfig> {
        Some(&self.config)
    }

    fn extract(&self, path: &Path) -> vcprep_core::Result<Features> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.as_deref() == Some(name.as_str()) {
            return Err(PrepError::AudioDecode {
                path: path.to_path_buf(),
                reason: "synthetic failure".to_string(),
            });
        }
        let (speaker, utt) = parse_utterance_name(&name).unwrap();
        let speaker: f32 = speaker.parse().unwrap();
        let utt: f32 = utt.parse().unwrap();
        let constant_dim = self.constant_dim;
        let mel = Array2::from_shape_fn((3, 4), |(frame, dim)| {
            if constant_dim && dim == 0 {
                1.0
            } else {
                speaker * 10.0 + utt + frame as f32 * (dim as f32 + 1.0)
            }
        });
        let mag = Array2::from_elem((3, 5), utt);
        Ok(Features { mel, mag })
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
}

fn corpus_fixture(speakers: &[(&str, usize)], source: &[&str], target: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("wav48");
    for (speaker, count) in speakers {
        let speaker_dir = data_dir.join(format!("p{speaker}"));
        fs::create_dir_all(&speaker_dir).unwrap();
        for i in 1..=*count {
            fs::write(speaker_dir.join(format!("p{speaker}_{i:03}.wav")), b"").unwrap();
        }
    }

    let source_list = dir.path().join("source.txt");
    let target_list = dir.path().join("target.txt");
    write_speaker_list(&source_list, source);
    write_speaker_list(&target_list, target);

    let config = PipelineConfig {
        data_dir,
        source_speaker_list: source_list,
        target_speaker_list: target_list,
        output_dir: dir.path().join("out"),
        test_speakers: 1,
        test_proportion: 0.2,
        n_utts_attr: 4,
        seed: Some(1234),
        jobs: Some(2),
        save_magnitudes: false,
    };
    Fixture { _dir: dir, config }
}

fn write_speaker_list(path: &Path, speakers: &[&str]) {
    let mut text = String::from("ID  AGE  GENDER  ACCENTS\n");
    for speaker in speakers {
        text.push_str(&format!("{speaker}  23  F  English\n"));
    }
    fs::write(path, text).unwrap();
}

fn read_lines(path: &Path) -> Vec<PathBuf> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(PathBuf::from)
        .collect()
}

fn speaker_of(path: &Path) -> String {
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    parse_utterance_name(&name).unwrap().0
}

#[test]
fn three_speaker_corpus_end_to_end() {
    let fixture = corpus_fixture(&[("1", 10), ("2", 10), ("3", 10)], &["p1", "p2"], &["p3"]);
    let out = fixture.config.output_dir.clone();

    let summary = run(&fixture.config, &SyntheticExtractor::new()).unwrap();
    assert_eq!(summary.seed, 1234);
    assert_eq!(summary.train, 8);
    assert_eq!(summary.in_test, 12);
    assert_eq!(summary.out_test, 10);
    assert_eq!(summary.feature_dim, 4);

    let out_test = read_lines(&out.join("out_test_files.txt"));
    assert_eq!(out_test.len(), 10);
    assert!(out_test.iter().all(|p| speaker_of(p) == "3"));

    let train = read_lines(&out.join("train_files.txt"));
    let train_speakers: HashSet<_> = train.iter().map(|p| speaker_of(p)).collect();
    assert_eq!(train_speakers.len(), 1);
    let train_speaker = train_speakers.into_iter().next().unwrap();
    assert!(train_speaker == "1" || train_speaker == "2");

    let in_test = read_lines(&out.join("in_test_files.txt"));
    let from_train_speaker = in_test.iter().filter(|p| speaker_of(p) == train_speaker).count();
    assert_eq!(from_train_speaker, 2);
    assert_eq!(in_test.len() - from_train_speaker, 10);

    let mut all: Vec<_> = train.iter().chain(&in_test).chain(&out_test).cloned().collect();
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(all.len(), total);
    assert_eq!(total, 30);

    let held: Vec<String> = fs::read_to_string(out.join("test_speakers.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(held.len(), 1);
    assert_ne!(held[0], train_speaker);
    assert_eq!(fs::read_to_string(out.join("target_speakers.txt")).unwrap(), "3\n");

    let train_bundle = read_bundle(&out.join("train.pkl")).unwrap();
    assert_eq!(train_bundle.len(), 8);
    assert_eq!(read_bundle(&out.join("in_test.pkl")).unwrap().len(), 12);
    let out_bundle = read_bundle(&out.join("out_test.pkl")).unwrap();
    assert_eq!(out_bundle.len(), 10);
    assert!(out_bundle.keys().all(|k| k.starts_with("p3_")));
    assert!(!out.join("train_mag.pkl").exists());

    // Bundle keys iterate in file-name order, which matches sorted-path order
    // within a single speaker directory.
    let sample: Vec<_> = train_bundle.values().take(4).map(|m| m.view()).collect();
    let frames = concatenate(Axis(0), &sample).unwrap();
    let mean = frames.mean_axis(Axis(0)).unwrap();
    let std = frames.std_axis(Axis(0), 0.0);
    for d in 0..4 {
        assert!(mean[d].abs() < 1e-4, "mean[{d}] = {}", mean[d]);
        assert!((std[d] - 1.0).abs() < 1e-3, "std[{d}] = {}", std[d]);
    }

    let stats = read_stats(&out.join("attr.pkl")).unwrap();
    assert_eq!(stats.dim(), 4);

    let info: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("build_info.json")).unwrap()).unwrap();
    assert_eq!(info["seed"], 1234);
    assert_eq!(info["out_test_files"], 10);
    assert_eq!(info["save_magnitudes"], false);
    assert_eq!(info["features"]["sample_rate"], 16_000);
    let recorded: FeatureConfig = serde_json::from_value(info["features"].clone()).unwrap();
    assert_eq!(Some(&recorded), SyntheticExtractor::new().config());
}

#[test]
fn same_seed_reproduces_manifests() {
    let first = corpus_fixture(&[("1", 9), ("2", 7), ("3", 8), ("4", 5)], &["1", "2", "3"], &["4"]);
    let second = corpus_fixture(&[("1", 9), ("2", 7), ("3", 8), ("4", 5)], &["1", "2", "3"], &["4"]);
    run(&first.config, &SyntheticExtractor::new()).unwrap();
    run(&second.config, &SyntheticExtractor::new()).unwrap();

    for name in ["train_files.txt", "in_test_files.txt", "out_test_files.txt"] {
        let relative = |fixture: &Fixture| -> Vec<PathBuf> {
            read_lines(&fixture.config.output_dir.join(name))
                .into_iter()
                .map(|p| p.strip_prefix(&fixture.config.data_dir).unwrap().to_path_buf())
                .collect()
        };
        assert_eq!(relative(&first), relative(&second), "{name} differs");
    }
}

#[test]
fn magnitudes_are_saved_unnormalized_on_request() {
    let mut fixture = corpus_fixture(&[("1", 5), ("2", 5), ("3", 2)], &["1", "2"], &["3"]);
    fixture.config.save_magnitudes = true;
    run(&fixture.config, &SyntheticExtractor::new()).unwrap();

    let mags = read_bundle(&fixture.config.output_dir.join("out_test_mag.pkl")).unwrap();
    assert_eq!(mags["p3_002.wav"], Array2::from_elem((3, 5), 2.0f32));
}

#[test]
fn decode_failure_aborts_after_manifests() {
    let fixture = corpus_fixture(&[("1", 10), ("2", 10), ("3", 10)], &["1", "2"], &["3"]);
    let extractor = SyntheticExtractor {
        fail_on: Some("p3_005.wav".to_string()),
        ..SyntheticExtractor::new()
    };

    let err = run(&fixture.config, &extractor).unwrap_err();
    match err {
        PrepError::AudioDecode { path, .. } => assert!(path.ends_with("p3/p3_005.wav")),
        other => panic!("unexpected error: {other}"),
    }
    let out = &fixture.config.output_dir;
    assert!(out.join("out_test_files.txt").exists());
    assert!(out.join("train.pkl").exists());
    assert!(out.join("in_test.pkl").exists());
    assert!(!out.join("out_test.pkl").exists());
}

#[test]
fn constant_feature_dimension_is_rejected() {
    let fixture = corpus_fixture(&[("1", 10), ("2", 10), ("3", 10)], &["1", "2"], &["3"]);
    let extractor = SyntheticExtractor {
        constant_dim: true,
        ..SyntheticExtractor::new()
    };
    let err = run(&fixture.config, &extractor).unwrap_err();
    assert!(matches!(err, PrepError::InsufficientData(_)));
    assert!(!fixture.config.output_dir.join("attr.pkl").exists());
}

#[test]
fn too_many_test_speakers_is_rejected() {
    let mut fixture = corpus_fixture(&[("1", 3), ("2", 3)], &["1", "2"], &[]);
    fixture.config.test_speakers = 2;
    let err = run(&fixture.config, &SyntheticExtractor::new()).unwrap_err();
    assert!(matches!(err, PrepError::InvalidSplitSize { .. }));
}

#[test]
fn oversized_attribute_sample_fails_before_extraction() {
    let mut fixture = corpus_fixture(&[("1", 10), ("2", 10), ("3", 10)], &["1", "2"], &["3"]);
    fixture.config.n_utts_attr = 9;
    let extractor = SyntheticExtractor::new();

    let err = run(&fixture.config, &extractor).unwrap_err();
    assert!(matches!(err, PrepError::InsufficientData(_)));
    assert_eq!(extractor.calls.load(Ordering::Relaxed), 0);
    assert!(!fixture.config.output_dir.join("train.pkl").exists());
}

#[test]
fn duplicate_file_names_across_directories_are_rejected() {
    let fixture = corpus_fixture(&[("1", 3), ("2", 3)], &["1", "2"], &[]);
    let mirror = fixture.config.data_dir.join("p1_mic2");
    fs::create_dir_all(&mirror).unwrap();
    fs::write(mirror.join("p1_002.wav"), b"").unwrap();

    let err = run(&fixture.config, &SyntheticExtractor::new()).unwrap_err();
    assert!(matches!(err, PrepError::DuplicateUtterance { .. }));
}

#[test]
fn missing_corpus_is_rejected() {
    let mut fixture = corpus_fixture(&[("1", 3)], &["1"], &[]);
    fixture.config.data_dir = fixture.config.data_dir.join("missing");
    let err = run(&fixture.config, &SyntheticExtractor::new()).unwrap_err();
    assert!(matches!(err, PrepError::CorpusNotFound { .. }));
}

fn write_noise(path: &Path, sample_rate: u32, samples: usize, seed: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    for i in 0..samples {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let envelope = 0.3 + 0.2 * ((i / 400) % 3) as f32;
        let noise = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
        writer
            .write_sample((noise * envelope * i16::MAX as f32) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn spectrogram_extractor_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("wav");
    for speaker in ["1", "2", "3"] {
        let speaker_dir = data_dir.join(format!("p{speaker}"));
        fs::create_dir_all(&speaker_dir).unwrap();
        for utt in 1..=3u32 {
            let seed = speaker.parse::<u32>().unwrap() * 10 + utt;
            write_noise(&speaker_dir.join(format!("p{speaker}_{utt:03}.wav")), 16_000, 8_000, seed);
        }
    }
    write_speaker_list(&dir.path().join("source.txt"), &["1", "2"]);
    write_speaker_list(&dir.path().join("target.txt"), &["3"]);

    let config = PipelineConfig {
        data_dir,
        source_speaker_list: dir.path().join("source.txt"),
        target_speaker_list: dir.path().join("target.txt"),
        output_dir: dir.path().join("out"),
        test_speakers: 0,
        test_proportion: 0.0,
        n_utts_attr: 2,
        seed: Some(7),
        jobs: Some(1),
        save_magnitudes: true,
    };
    let extractor = SpectrogramExtractor::new(FeatureConfig {
        sample_rate: 16_000,
        ..FeatureConfig::default()
    })
    .unwrap();

    let summary = run(&config, &extractor).unwrap();
    assert_eq!(summary.train, 6);
    assert_eq!(summary.in_test, 0);
    assert_eq!(summary.out_test, 3);
    assert_eq!(summary.feature_dim, 80);

    let bundle = read_bundle(&config.output_dir.join("out_test.pkl")).unwrap();
    assert_eq!(bundle.len(), 3);
    assert!(bundle.values().all(|m| m.ncols() == 80 && m.iter().all(|v| v.is_finite())));
    assert!(read_bundle(&config.output_dir.join("in_test.pkl")).unwrap().is_empty());
}
