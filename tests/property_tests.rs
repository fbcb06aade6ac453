//! Property-based tests: strategy equivalence and key semantics hold for
//! arbitrary inputs, not just the handcrafted scenarios.

use std::fs;

use proptest::prelude::*;
// The engine's Strategy enum shadows proptest's Strategy trait below;
// keep the trait in scope anonymously for combinator methods.
use proptest::strategy::Strategy as _;
use tempfile::tempdir;

use linedupe::config::EngineConfig;
use linedupe::engine::build_engine;
use linedupe::input::InputSet;
use linedupe::key::{select_hasher, HashBackend, KeyExtractor};
use linedupe::strategy::{Strategy, StrategyDecision};

/// A record built from a tiny field alphabet, so collisions between
/// generated records are common and duplicate groups actually form.
fn record_strategy() -> impl proptest::strategy::Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c", ""]), 1..8)
        .prop_map(|fields| fields.join(";"))
}

fn run(strategy: Strategy, inputs: &InputSet, config: &EngineConfig) -> Vec<(Vec<u8>, Vec<(u32, u64)>)> {
    let decision = StrategyDecision {
        strategy,
        workers: 2,
        chunk_bytes: 256,
    };
    let report = build_engine(&decision, config.clone(), None, None)
        .process(inputs)
        .unwrap();
    report
        .groups
        .iter()
        .map(|g| {
            (
                g.key.to_vec(),
                g.occurrences
                    .iter()
                    .map(|o| (o.source, o.line_index))
                    .collect(),
            )
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn all_strategies_agree(
        file_a in prop::collection::vec(record_strategy(), 0..40),
        file_b in prop::collection::vec(record_strategy(), 0..40),
    ) {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, file_a.join("\n")).unwrap();
        fs::write(&b, file_b.join("\n")).unwrap();
        let inputs = InputSet::from_paths(vec![a, b]).unwrap();
        let config = EngineConfig::default().with_hash_fields(4);

        let fast = run(Strategy::Fast, &inputs, &config);
        let safe = run(Strategy::Safe, &inputs, &config);
        let disk = run(Strategy::Disk, &inputs, &config);

        prop_assert_eq!(&fast, &safe);
        prop_assert_eq!(&fast, &disk);
    }

    #[test]
    fn key_ignores_fields_beyond_the_configured_count(
        kept in prop::collection::vec("[a-z]{0,5}", 3),
        extra in prop::collection::vec("[a-z]{0,5}", 0..4),
    ) {
        let config = EngineConfig::default().with_hash_fields(3);
        let extractor = KeyExtractor::new(&config, select_hasher(HashBackend::Blake3));

        let base = kept.join(";");
        let mut extended = kept.clone();
        extended.extend(extra);
        let padded = extended.join(";");

        prop_assert_eq!(extractor.key_of(&base), extractor.key_of(&padded));
    }

    #[test]
    fn key_depends_on_every_kept_field(
        fields in prop::collection::vec("[a-z]{1,5}", 4),
        position in 0usize..4,
    ) {
        let config = EngineConfig::default().with_hash_fields(4);
        let extractor = KeyExtractor::new(&config, select_hasher(HashBackend::Blake3));

        let original = fields.join(";");
        let mut changed = fields.clone();
        changed[position] = format!("{}X", changed[position]);
        let changed = changed.join(";");

        prop_assert_ne!(extractor.key_of(&original), extractor.key_of(&changed));
    }

    #[test]
    fn display_prefix_never_exceeds_write_length(
        line in "\\PC{0,80}",
        write_length in 0usize..60,
    ) {
        let config = EngineConfig::default().with_write_length(write_length);
        let extractor = KeyExtractor::new(&config, select_hasher(HashBackend::Blake3));
        let prefix = extractor.display_prefix(&line);
        prop_assert!(prefix.chars().count() <= write_length);
        prop_assert!(line.starts_with(&prefix));
    }
}
