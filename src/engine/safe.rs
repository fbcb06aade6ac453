//! Safe strategy: two streaming passes, memory bounded by distinct keys.
//!
//! Pass 1 streams every record and keeps nothing but a count per key.
//! The per-file counters are summed at a barrier; keys seen at least
//! twice form the survivor set. Pass 2 streams everything again and
//! keeps occurrences only for survivors, discarding all others
//! immediately. Peak memory tracks the number of distinct keys, not the
//! number of records.

use std::collections::{HashMap, HashSet};

use crate::aggregate::{
    Aggregator, DetectionReport, DetectionStats, Occurrence, SkippedFile,
};
use crate::error::DupeError;
use crate::input::{InputFile, InputSet};
use crate::key::Key;
use crate::strategy::Strategy;

use super::{check_interval, for_each_record, DetectionEngine, EngineContext};

/// Two-pass streaming duplicate detector.
pub struct SafeEngine {
    ctx: EngineContext,
}

impl SafeEngine {
    /// Create the engine with its shared context.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Pass 1: count key occurrences in one file.
    fn count_file(&self, file: &InputFile) -> Result<(HashMap<Key, u64>, u64), DupeError> {
        let mut counts: HashMap<Key, u64> = HashMap::new();
        let shutdown = self.ctx.shutdown.as_ref();
        let records = for_each_record(&file.path, self.ctx.config.skip_header, |line_index, line| {
            check_interval(shutdown, line_index)?;
            *counts.entry(self.ctx.extractor.key_of(line)).or_insert(0) += 1;
            Ok(())
        })?;
        Ok((counts, records))
    }

    /// Pass 2: collect occurrences of surviving keys in one file.
    fn extract_file(
        &self,
        file: &InputFile,
        survivors: &HashSet<Key>,
    ) -> Result<Vec<(Key, Occurrence)>, DupeError> {
        let mut found = Vec::new();
        let shutdown = self.ctx.shutdown.as_ref();
        for_each_record(&file.path, self.ctx.config.skip_header, |line_index, line| {
            check_interval(shutdown, line_index)?;
            let key = self.ctx.extractor.key_of(line);
            if survivors.contains(&key) {
                let prefix = self.ctx.extractor.display_prefix(line);
                found.push((key, Occurrence::new(file.id, line_index, prefix)));
            }
            Ok(())
        })?;
        Ok(found)
    }
}

impl DetectionEngine for SafeEngine {
    fn process(&self, inputs: &InputSet) -> Result<DetectionReport, DupeError> {
        let mut stats = DetectionStats::default();
        let mut skipped = Vec::new();

        // Pass 1: global key counts. The pool call is the barrier; pass 2
        // never starts before every counter is summed.
        self.ctx.phase_start("count", inputs.len());
        let outcomes = self
            .ctx
            .pool
            .run(inputs.files(), |index, file| {
                self.ctx.phase_tick(index + 1, &file.name);
                self.count_file(file)
            });
        self.ctx.phase_end("count");

        self.ctx.check_interrupted()?;

        let mut global_counts: HashMap<Key, u64> = HashMap::new();
        let mut skipped_ids: HashSet<crate::input::SourceId> = HashSet::new();
        for (file, outcome) in inputs.files().iter().zip(outcomes) {
            match outcome.result {
                Ok((counts, records)) => {
                    stats.files_processed += 1;
                    stats.records_scanned += records;
                    for (key, count) in counts {
                        *global_counts.entry(key).or_insert(0) += count;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    log::warn!("Skipping {}: {e}", outcome.label);
                    skipped_ids.insert(file.id);
                    skipped.push(SkippedFile {
                        name: outcome.label,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let survivors: HashSet<Key> = global_counts
            .into_iter()
            .filter_map(|(key, count)| (count >= 2).then_some(key))
            .collect();

        stats.files_skipped = skipped.len();

        if survivors.is_empty() {
            log::info!(
                "Safe scan complete: {} records, no duplicate keys",
                stats.records_scanned
            );
            return Ok(DetectionReport {
                strategy: Strategy::Safe,
                groups: Vec::new(),
                skipped,
                stats,
            });
        }

        log::info!(
            "Pass 1 complete: {} records, {} candidate duplicate keys",
            stats.records_scanned,
            survivors.len()
        );

        // Pass 2 runs only over files that pass 1 could read.
        let pass2_files: Vec<&InputFile> = inputs
            .files()
            .iter()
            .filter(|f| !skipped_ids.contains(&f.id))
            .collect();

        self.ctx.phase_start("extract", pass2_files.len());
        let outcomes = self.ctx.pool.run(&pass2_files, |index, file| {
            self.ctx.phase_tick(index + 1, &file.name);
            self.extract_file(file, &survivors)
        });
        self.ctx.phase_end("extract");

        self.ctx.check_interrupted()?;

        let mut by_key: HashMap<Key, Vec<Occurrence>> = HashMap::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(found) => {
                    for (key, occurrence) in found {
                        by_key.entry(key).or_default().push(occurrence);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    // Readable in pass 1 but not pass 2: without its
                    // occurrences the group contents cannot be trusted.
                    log::warn!("{} became unreadable between passes: {e}", outcome.label);
                    skipped.push(SkippedFile {
                        name: outcome.label,
                        reason: e.to_string(),
                    });
                    stats.files_skipped += 1;
                    stats.files_processed = stats.files_processed.saturating_sub(1);
                }
                Err(e) => return Err(e),
            }
        }

        let mut aggregator = Aggregator::new();
        aggregator.add_key_map(by_key);
        let groups = aggregator.finish();

        stats.duplicate_groups = groups.len();
        stats.duplicate_records = groups.iter().map(|g| g.len() as u64).sum();

        log::info!(
            "Safe scan complete: {} records, {} duplicate groups",
            stats.records_scanned,
            stats.duplicate_groups
        );

        Ok(DetectionReport {
            strategy: Strategy::Safe,
            groups,
            skipped,
            stats,
        })
    }

    fn strategy(&self) -> Strategy {
        Strategy::Safe
    }
}
