//! Disk-strategy specifics: chunk boundaries, merge fan-in, scratch
//! cleanup and interruption.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::tempdir;

use linedupe::aggregate::{DetectionReport, GroupKind};
use linedupe::config::EngineConfig;
use linedupe::engine::build_engine;
use linedupe::error::DupeError;
use linedupe::input::InputSet;
use linedupe::strategy::{Strategy, StrategyDecision};

fn run_disk(
    inputs: &InputSet,
    config: &EngineConfig,
    chunk_bytes: u64,
    shutdown: Option<Arc<AtomicBool>>,
) -> Result<DetectionReport, DupeError> {
    let decision = StrategyDecision {
        strategy: Strategy::Disk,
        workers: 2,
        chunk_bytes,
    };
    build_engine(&decision, config.clone(), shutdown, None).process(inputs)
}

fn run_fast(inputs: &InputSet, config: &EngineConfig) -> DetectionReport {
    let decision = StrategyDecision {
        strategy: Strategy::Fast,
        workers: 2,
        chunk_bytes: config.chunk_bytes(),
    };
    build_engine(&decision, config.clone(), None, None)
        .process(inputs)
        .unwrap()
}

/// Write `count` records of the shape `row<i>;x;y;z;w;v`, with every
/// record whose index is a multiple of `dup_every` replaced by one fixed
/// duplicated line.
fn write_synthetic(path: &PathBuf, count: usize, dup_every: usize) {
    let mut content = String::new();
    for i in 0..count {
        if i % dup_every == 0 {
            content.push_str("needle;always;the;same;six;fields\n");
        } else {
            content.push_str(&format!("row{i};x;y;z;w;v\n"));
        }
    }
    fs::write(path, content).unwrap();
}

#[test]
fn duplicates_across_chunk_boundaries_are_grouped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("large.csv");
    // ~30KB of records; 512-byte chunks force dozens of chunks, so the
    // duplicated line lands in many different runs.
    write_synthetic(&path, 1000, 250);
    let inputs = InputSet::from_paths(vec![path]).unwrap();
    let config = EngineConfig::default();

    let report = run_disk(&inputs, &config, 512, None).unwrap();
    assert_eq!(report.groups.len(), 1);
    let group = &report.groups[0];
    assert_eq!(group.kind, GroupKind::WithinFile);
    assert_eq!(group.occurrences.len(), 4);
    assert_eq!(
        group
            .occurrences
            .iter()
            .map(|o| o.line_index)
            .collect::<Vec<_>>(),
        vec![0, 250, 500, 750]
    );
}

#[test]
fn tiny_fan_in_forces_hierarchical_merge_with_identical_results() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.csv");
    let b = dir.path().join("b.csv");
    write_synthetic(&a, 600, 100);
    write_synthetic(&b, 400, 80);
    let inputs = InputSet::from_paths(vec![a, b]).unwrap();

    // fan_in=2 with 512-byte chunks guarantees several merge levels.
    let config = EngineConfig::default().with_merge_fan_in(2);
    let hierarchical = run_disk(&inputs, &config, 512, None).unwrap();
    let reference = run_fast(&inputs, &config);

    let shape = |r: &DetectionReport| {
        r.groups
            .iter()
            .map(|g| {
                (
                    g.key,
                    g.kind,
                    g.occurrences
                        .iter()
                        .map(|o| (o.source, o.line_index))
                        .collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&hierarchical), shape(&reference));
    // The duplicated line spans both files and far more runs than the
    // fan-in allows in one pass.
    assert!(hierarchical
        .groups
        .iter()
        .any(|g| g.kind == GroupKind::CrossFile && g.occurrences.len() == 11));
}

#[test]
fn scratch_space_is_removed_after_a_successful_run() {
    let dir = tempdir().unwrap();
    let scratch_base = dir.path().join("scratch");
    fs::create_dir(&scratch_base).unwrap();
    let data = dir.path().join("data.csv");
    write_synthetic(&data, 500, 50);
    let inputs = InputSet::from_paths(vec![data]).unwrap();

    let config = EngineConfig::default().with_scratch_dir(scratch_base.clone());
    let report = run_disk(&inputs, &config, 512, None).unwrap();
    assert!(!report.groups.is_empty());

    let leftovers: Vec<_> = fs::read_dir(&scratch_base).unwrap().collect();
    assert!(
        leftovers.is_empty(),
        "scratch entries leaked: {leftovers:?}"
    );
}

#[test]
fn interrupted_run_cleans_up_and_reports_interrupted() {
    let dir = tempdir().unwrap();
    let scratch_base = dir.path().join("scratch");
    fs::create_dir(&scratch_base).unwrap();
    let data = dir.path().join("data.csv");
    write_synthetic(&data, 2000, 100);
    let inputs = InputSet::from_paths(vec![data]).unwrap();

    let shutdown = Arc::new(AtomicBool::new(false));
    shutdown.store(true, Ordering::SeqCst);

    let config = EngineConfig::default().with_scratch_dir(scratch_base.clone());
    let err = run_disk(&inputs, &config, 512, Some(shutdown)).unwrap_err();
    assert!(matches!(err, DupeError::Interrupted));

    let leftovers: Vec<_> = fs::read_dir(&scratch_base).unwrap().collect();
    assert!(
        leftovers.is_empty(),
        "scratch entries leaked after interrupt: {leftovers:?}"
    );
}

#[test]
fn single_chunk_per_file_still_works() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.csv");
    let b = dir.path().join("b.csv");
    fs::write(&a, "shared;1;2;3;4;5\nonly-a;0;0;0;0;0\n").unwrap();
    fs::write(&b, "shared;1;2;3;4;5\n").unwrap();
    let inputs = InputSet::from_paths(vec![a, b]).unwrap();

    // Chunk size far larger than either file: one run per file.
    let report = run_disk(&inputs, &EngineConfig::default(), 1 << 20, None).unwrap();
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].kind, GroupKind::CrossFile);
}

#[test]
fn skip_header_applies_to_the_first_chunk_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("with_header.csv");
    let mut content = String::from("col_a;col_b;col_c;col_d;col_e;col_f\n");
    for i in 0..200 {
        content.push_str(&format!("row{i};1;2;3;4;5\n"));
    }
    content.push_str("row0;1;2;3;4;5\n");
    fs::write(&path, content).unwrap();
    let inputs = InputSet::from_paths(vec![path]).unwrap();

    let config = EngineConfig::default().with_skip_header(true);
    let report = run_disk(&inputs, &config, 512, None).unwrap();

    // Only row0 repeats; the header never becomes a record even though
    // chunking splits the file many times.
    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].occurrences.len(), 2);
    assert_eq!(report.stats.records_scanned, 201);
}
