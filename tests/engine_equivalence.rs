//! Cross-strategy equivalence and end-to-end detection scenarios.
//!
//! The fast, safe and disk engines must produce identical duplicate
//! groups (same keys, same classification, same occurrences) for any
//! input; they differ only in cost.

use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;

use linedupe::aggregate::{DetectionReport, GroupKind};
use linedupe::config::EngineConfig;
use linedupe::engine::build_engine;
use linedupe::input::InputSet;
use linedupe::key::Key;
use linedupe::strategy::{Strategy, StrategyDecision};

const STRATEGIES: [Strategy; 3] = [Strategy::Fast, Strategy::Safe, Strategy::Disk];

fn run_strategy(strategy: Strategy, inputs: &InputSet, config: &EngineConfig) -> DetectionReport {
    let decision = StrategyDecision {
        strategy,
        workers: 2,
        chunk_bytes: config.chunk_bytes(),
    };
    let engine = build_engine(&decision, config.clone(), None, None);
    engine.process(inputs).unwrap()
}

/// Everything that must match across strategies.
fn fingerprint(report: &DetectionReport) -> Vec<(Key, GroupKind, Vec<(u32, u64, String)>)> {
    report
        .groups
        .iter()
        .map(|g| {
            (
                g.key,
                g.kind,
                g.occurrences
                    .iter()
                    .map(|o| (o.source, o.line_index, o.display_prefix.clone()))
                    .collect(),
            )
        })
        .collect()
}

fn write_inputs(lines_per_file: &[(&str, &[&str])]) -> (tempfile::TempDir, InputSet) {
    let dir = tempdir().unwrap();
    let mut paths: Vec<PathBuf> = Vec::new();
    for (name, lines) in lines_per_file {
        let path = dir.path().join(name);
        fs::write(&path, lines.join("\n")).unwrap();
        paths.push(path);
    }
    let inputs = InputSet::from_paths(paths).unwrap();
    (dir, inputs)
}

#[test]
fn cross_file_duplicate_is_found_by_every_strategy() {
    let shared = "John;Doe;1985-01-01;Manager;Sales;New York";
    let (_dir, inputs) = write_inputs(&[
        (
            "employees_2023.csv",
            &["Alice;Acker;1990-05-05;Clerk;HR;Boston", shared],
        ),
        (
            "employees_2024.csv",
            &["Bob;Becker;1979-12-12;Lead;IT;Denver", shared, "Eve;Eck;2000-01-01;Temp;IT;Reno"],
        ),
    ]);
    let config = EngineConfig::default();

    for strategy in STRATEGIES {
        let report = run_strategy(strategy, &inputs, &config);
        assert_eq!(report.groups.len(), 1, "strategy {strategy}");
        let group = &report.groups[0];
        assert_eq!(group.kind, GroupKind::CrossFile);
        assert_eq!(group.display_prefix(), shared);
        assert_eq!(group.sources(), vec![0, 1]);
        assert_eq!(
            group
                .occurrences
                .iter()
                .map(|o| (o.source, o.line_index))
                .collect::<Vec<_>>(),
            vec![(0, 1), (1, 1)]
        );
    }
}

#[test]
fn within_file_duplicate_references_only_that_file() {
    let (_dir, inputs) = write_inputs(&[(
        "people.csv",
        &[
            "Jane;Smith;1970-03-03;CEO;Board;Austin",
            "Someone;Else;1980-01-01;CTO;Board;Austin",
            "Jane;Smith;1970-03-03;CEO;Board;Austin",
        ],
    )]);
    let config = EngineConfig::default();

    for strategy in STRATEGIES {
        let report = run_strategy(strategy, &inputs, &config);
        assert_eq!(report.groups.len(), 1, "strategy {strategy}");
        let group = &report.groups[0];
        assert_eq!(group.kind, GroupKind::WithinFile);
        assert_eq!(group.sources(), vec![0]);
        assert_eq!(group.occurrences.len(), 2);
    }
}

#[test]
fn empty_input_file_produces_no_groups_and_no_error() {
    let (_dir, inputs) = write_inputs(&[("empty.csv", &[]), ("blank.csv", &["", "   ", ""])]);
    let config = EngineConfig::default();

    for strategy in STRATEGIES {
        let report = run_strategy(strategy, &inputs, &config);
        assert!(report.groups.is_empty(), "strategy {strategy}");
        assert!(report.skipped.is_empty());
        assert_eq!(report.stats.records_scanned, 0);
    }
}

#[test]
fn hash_fields_width_changes_grouping() {
    // The two records differ only in field 5.
    let (_dir, inputs) = write_inputs(&[(
        "records.csv",
        &["a;b;c;d;FIRST;f", "a;b;c;d;SECOND;f"],
    )]);

    for strategy in STRATEGIES {
        let narrow = run_strategy(
            strategy,
            &inputs,
            &EngineConfig::default().with_hash_fields(4),
        );
        assert_eq!(narrow.groups.len(), 1, "strategy {strategy}, hash_fields=4");

        let wide = run_strategy(
            strategy,
            &inputs,
            &EngineConfig::default().with_hash_fields(6),
        );
        assert!(wide.groups.is_empty(), "strategy {strategy}, hash_fields=6");
    }
}

#[test]
fn short_records_compare_equal_to_unpadded_records() {
    let (_dir, inputs) = write_inputs(&[("short.csv", &["x;y", "x;y;;", "x;y;z"])]);
    let config = EngineConfig::default().with_hash_fields(4);

    for strategy in STRATEGIES {
        let report = run_strategy(strategy, &inputs, &config);
        assert_eq!(report.groups.len(), 1, "strategy {strategy}");
        assert_eq!(report.groups[0].occurrences.len(), 2);
    }
}

#[test]
fn strategies_agree_on_a_mixed_workload() {
    let (_dir, inputs) = write_inputs(&[
        (
            "a.csv",
            &[
                "k1;a;b;c;d;e",
                "k2;a;b;c;d;e",
                "k1;a;b;c;d;e",
                "k3;x;y;z;w;v",
                "unique1;q;q;q;q;q",
            ],
        ),
        (
            "b.csv",
            &["k3;x;y;z;w;v", "unique2;r;r;r;r;r", "k2;a;b;c;d;e"],
        ),
        ("c.csv", &["k1;a;b;c;d;e", "unique3;s;s;s;s;s"]),
    ]);
    let config = EngineConfig::default();

    let baseline = fingerprint(&run_strategy(Strategy::Fast, &inputs, &config));
    assert_eq!(baseline.len(), 3);
    for strategy in [Strategy::Safe, Strategy::Disk] {
        let report = run_strategy(strategy, &inputs, &config);
        assert_eq!(fingerprint(&report), baseline, "strategy {strategy}");
    }
}

#[test]
fn repeated_runs_are_idempotent() {
    let (_dir, inputs) = write_inputs(&[
        ("a.csv", &["dup;1;2;3;4;5", "other;9;9;9;9;9", "dup;1;2;3;4;5"]),
        ("b.csv", &["dup;1;2;3;4;5"]),
    ]);
    let config = EngineConfig::default();

    for strategy in STRATEGIES {
        let first = run_strategy(strategy, &inputs, &config);
        let second = run_strategy(strategy, &inputs, &config);
        assert_eq!(
            fingerprint(&first),
            fingerprint(&second),
            "strategy {strategy}"
        );
    }
}

#[test]
fn unreadable_input_is_skipped_and_reported() {
    let dir = tempdir().unwrap();
    let good_a = dir.path().join("good_a.csv");
    let good_b = dir.path().join("good_b.csv");
    fs::write(&good_a, "same;1;2;3;4;5\n").unwrap();
    fs::write(&good_b, "same;1;2;3;4;5\n").unwrap();
    // A directory with a .csv name opens but cannot be read as a file.
    let broken = dir.path().join("broken.csv");
    fs::create_dir(&broken).unwrap();

    let inputs = InputSet::from_paths(vec![good_a, broken, good_b]).unwrap();
    let config = EngineConfig::default();

    for strategy in STRATEGIES {
        let report = run_strategy(strategy, &inputs, &config);
        assert_eq!(report.skipped.len(), 1, "strategy {strategy}");
        assert_eq!(report.skipped[0].name, "broken.csv");
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].kind, GroupKind::CrossFile);
        assert_eq!(report.stats.files_skipped, 1);
        assert_eq!(report.stats.files_processed, 2);
    }
}

#[test]
fn display_prefix_is_truncated_to_write_length() {
    let long = "0123456789;aaaaaaaaaa;bbbbbbbbbb;cccccccccc;dddddddddd;eeeeeeeeee";
    let (_dir, inputs) = write_inputs(&[("long.csv", &[long, long])]);
    let config = EngineConfig::default().with_write_length(12);

    for strategy in STRATEGIES {
        let report = run_strategy(strategy, &inputs, &config);
        assert_eq!(report.groups[0].display_prefix(), "0123456789;a");
    }
}
