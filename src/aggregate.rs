//! Result aggregation: from partial results to ordered duplicate groups.
//!
//! Whatever shape an engine produces (per-file occurrence maps, survivor
//! lists, merged run groups), the aggregator reduces it to the same final
//! form: duplicate groups with at least two occurrences, occurrences in
//! encounter order, groups ordered by their first occurrence across the
//! overall input-file ordering. The ordering is deterministic and
//! reproducible: running the same strategy twice on unchanged input yields
//! byte-identical output.

use std::collections::HashMap;

use crate::input::SourceId;
use crate::key::Key;
use crate::strategy::Strategy;

/// One record's appearance under a given key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Source file id.
    pub source: SourceId,
    /// Zero-based physical line index within the source file.
    pub line_index: u64,
    /// Raw text truncated to the configured display length.
    pub display_prefix: String,
}

impl Occurrence {
    /// Create an occurrence.
    #[must_use]
    pub fn new(source: SourceId, line_index: u64, display_prefix: String) -> Self {
        Self {
            source,
            line_index,
            display_prefix,
        }
    }

    /// Encounter-order sort key: file-processing order first, then
    /// position within the file.
    fn order(&self) -> (SourceId, u64) {
        (self.source, self.line_index)
    }
}

/// Whether a group's occurrences span one file or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    /// All occurrences share one source file.
    WithinFile,
    /// Occurrences span two or more source files.
    CrossFile,
}

/// All occurrences sharing one key; only groups with two or more qualify
/// for reporting.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// The shared key.
    pub key: Key,
    /// Within-file or cross-file.
    pub kind: GroupKind,
    /// Occurrences in encounter order.
    pub occurrences: Vec<Occurrence>,
}

impl DuplicateGroup {
    /// Display prefix of the group: its first occurrence's.
    #[must_use]
    pub fn display_prefix(&self) -> &str {
        self.occurrences
            .first()
            .map_or("", |o| o.display_prefix.as_str())
    }

    /// Contributing source ids, deduplicated, in encounter order.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceId> {
        let mut seen = Vec::new();
        for occ in &self.occurrences {
            if !seen.contains(&occ.source) {
                seen.push(occ.source);
            }
        }
        seen
    }

    /// Number of occurrences in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    /// A group is never empty; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }
}

/// An input file that was skipped instead of processed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SkippedFile {
    /// File name.
    pub name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Counters describing one detection run.
#[derive(Debug, Clone, Default)]
pub struct DetectionStats {
    /// Files fully processed.
    pub files_processed: usize,
    /// Files skipped with a warning.
    pub files_skipped: usize,
    /// Records scanned (blank lines and skipped headers excluded).
    pub records_scanned: u64,
    /// Duplicate groups found.
    pub duplicate_groups: usize,
    /// Records belonging to some duplicate group.
    pub duplicate_records: u64,
}

/// The final product of an engine run, handed to the report writer.
#[derive(Debug)]
pub struct DetectionReport {
    /// Strategy that produced this report.
    pub strategy: Strategy,
    /// Ordered duplicate groups.
    pub groups: Vec<DuplicateGroup>,
    /// Inputs skipped with a warning.
    pub skipped: Vec<SkippedFile>,
    /// Run counters.
    pub stats: DetectionStats,
}

impl DetectionReport {
    /// Whether any duplicates were found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }
}

/// Merges partial results into classified, deterministically ordered
/// duplicate groups.
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: Vec<DuplicateGroup>,
}

impl Aggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all occurrences of one key. Groups with fewer than two
    /// occurrences are discarded here, so callers can feed every key.
    pub fn add_group(&mut self, key: Key, occurrences: Vec<Occurrence>) {
        if occurrences.len() < 2 {
            return;
        }
        // Kind is provisional; finish() recomputes it after sorting.
        self.groups.push(DuplicateGroup {
            key,
            kind: classify(&occurrences),
            occurrences,
        });
    }

    /// Add a whole key-to-occurrences map (Fast/Safe partial shape).
    pub fn add_key_map(&mut self, map: HashMap<Key, Vec<Occurrence>>) {
        for (key, occurrences) in map {
            self.add_group(key, occurrences);
        }
    }

    /// Number of groups accumulated so far.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Sort, classify and return the final group list.
    ///
    /// Occurrences within a group are ordered by `(source, line)`:
    /// encounter order for within-file duplicates, file-processing order
    /// across files. Groups are ordered by their first occurrence.
    #[must_use]
    pub fn finish(mut self) -> Vec<DuplicateGroup> {
        for group in &mut self.groups {
            group.occurrences.sort_by_key(Occurrence::order);
            group.kind = classify(&group.occurrences);
        }
        self.groups
            .sort_by_key(|g| g.occurrences.first().map_or((0, 0), Occurrence::order));
        self.groups
    }
}

fn classify(occurrences: &[Occurrence]) -> GroupKind {
    let first = occurrences.first().map(|o| o.source);
    if occurrences.iter().all(|o| Some(o.source) == first) {
        GroupKind::WithinFile
    } else {
        GroupKind::CrossFile
    }
}
