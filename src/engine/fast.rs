//! Fast strategy: in-memory, single-pass, parallel by file.
//!
//! Every worker loads one file's records and builds a local key-to-
//! occurrences map, detecting within-file duplicates as it goes. The
//! per-file maps merge into a global map in source order, where cross-file
//! duplicates appear. Memory is O(total record bytes + distinct keys),
//! which is why the strategy selector gates this engine to inputs that
//! fit the memory budget.

use std::collections::HashMap;

use crate::aggregate::{
    Aggregator, DetectionReport, DetectionStats, Occurrence, SkippedFile,
};
use crate::error::DupeError;
use crate::input::{InputFile, InputSet};
use crate::strategy::Strategy;

use super::{check_interval, for_each_record, DetectionEngine, EngineContext};

/// In-memory duplicate detector.
pub struct FastEngine {
    ctx: EngineContext,
}

impl FastEngine {
    /// Create the engine with its shared context.
    #[must_use]
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Scan one file into a local key-to-occurrences map.
    fn scan_file(
        &self,
        file: &InputFile,
    ) -> Result<(HashMap<crate::key::Key, Vec<Occurrence>>, u64), DupeError> {
        let mut local: HashMap<crate::key::Key, Vec<Occurrence>> = HashMap::new();
        let shutdown = self.ctx.shutdown.as_ref();
        let records = for_each_record(&file.path, self.ctx.config.skip_header, |line_index, line| {
            check_interval(shutdown, line_index)?;
            let (key, prefix) = self.ctx.extractor.extract(line);
            local
                .entry(key)
                .or_default()
                .push(Occurrence::new(file.id, line_index, prefix));
            Ok(())
        })?;
        Ok((local, records))
    }
}

impl DetectionEngine for FastEngine {
    fn process(&self, inputs: &InputSet) -> Result<DetectionReport, DupeError> {
        let mut stats = DetectionStats::default();
        let mut skipped = Vec::new();

        self.ctx.phase_start("scan", inputs.len());
        let outcomes = self
            .ctx
            .pool
            .run(inputs.files(), |index, file| {
                self.ctx.phase_tick(index + 1, &file.name);
                self.scan_file(file)
            });
        self.ctx.phase_end("scan");

        self.ctx.check_interrupted()?;

        // Merge per-file maps in source order; within each key the
        // occurrences stay in encounter order.
        let mut global: HashMap<crate::key::Key, Vec<Occurrence>> = HashMap::new();
        for outcome in outcomes {
            match outcome.result {
                Ok((local, records)) => {
                    stats.files_processed += 1;
                    stats.records_scanned += records;
                    for (key, occurrences) in local {
                        global.entry(key).or_default().extend(occurrences);
                    }
                }
                Err(e) if e.is_recoverable() => {
                    log::warn!("Skipping {}: {e}", outcome.label);
                    skipped.push(SkippedFile {
                        name: outcome.label,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let mut aggregator = Aggregator::new();
        aggregator.add_key_map(global);
        let groups = aggregator.finish();

        stats.files_skipped = skipped.len();
        stats.duplicate_groups = groups.len();
        stats.duplicate_records = groups.iter().map(|g| g.len() as u64).sum();

        log::info!(
            "Fast scan complete: {} records, {} duplicate groups",
            stats.records_scanned,
            stats.duplicate_groups
        );

        Ok(DetectionReport {
            strategy: Strategy::Fast,
            groups,
            skipped,
            stats,
        })
    }

    fn strategy(&self) -> Strategy {
        Strategy::Fast
    }
}
