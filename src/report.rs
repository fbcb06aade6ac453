//! Report writers for detection results.
//!
//! The engines hand over an ordered [`DetectionReport`]; the writers here
//! only format it. Group order is the report's order, which is
//! deterministic, so repeated runs produce byte-identical output.
//!
//! # JSON Schema
//!
//! ```json
//! {
//!   "strategy": "fast",
//!   "groups": [
//!     {
//!       "key": "9f2a...",
//!       "kind": "cross-file",
//!       "display_prefix": "John;Doe;1985-01-01;Manager;Sales;New York",
//!       "occurrences": [
//!         { "file": "employees_2023.csv", "line": 3 },
//!         { "file": "employees_2024.csv", "line": 7 }
//!       ]
//!     }
//!   ],
//!   "skipped": [ { "name": "broken.csv", "reason": "..." } ],
//!   "summary": {
//!     "files_processed": 2,
//!     "files_skipped": 1,
//!     "records_scanned": 1000,
//!     "duplicate_groups": 1,
//!     "duplicate_records": 2
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::aggregate::{DetectionReport, GroupKind};
use crate::error::DupeError;
use crate::input::InputSet;
use crate::key::key_to_hex;
use crate::strategy::Strategy;

/// Output format for detection results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable text report.
    Text,
    /// Machine-readable JSON for scripting.
    Json,
}

/// One occurrence in JSON format.
#[derive(Debug, Serialize)]
struct JsonOccurrence {
    file: String,
    line: u64,
}

/// A single duplicate group in JSON format.
#[derive(Debug, Serialize)]
struct JsonGroup {
    /// Record key as hexadecimal string (32 characters)
    key: String,
    kind: GroupKind,
    display_prefix: String,
    occurrences: Vec<JsonOccurrence>,
}

/// Summary statistics in JSON format.
#[derive(Debug, Serialize)]
struct JsonSummary {
    files_processed: usize,
    files_skipped: usize,
    records_scanned: u64,
    duplicate_groups: usize,
    duplicate_records: u64,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    strategy: Strategy,
    groups: Vec<JsonGroup>,
    skipped: &'a [crate::aggregate::SkippedFile],
    summary: JsonSummary,
}

/// Write `report` to `out` in the requested format.
///
/// # Errors
///
/// Propagates I/O errors from the destination writer.
pub fn write_report(
    report: &DetectionReport,
    inputs: &InputSet,
    out: &mut dyn Write,
    format: ReportFormat,
) -> Result<(), DupeError> {
    match format {
        ReportFormat::Text => write_text(report, inputs, out),
        ReportFormat::Json => write_json(report, inputs, out),
    }
}

fn write_text(
    report: &DetectionReport,
    inputs: &InputSet,
    out: &mut dyn Write,
) -> Result<(), DupeError> {
    if report.groups.is_empty() {
        writeln!(out, "No duplicates found.")?;
    }

    for group in &report.groups {
        writeln!(out, "{}", group.display_prefix())?;
        let sources = group.sources();
        if sources.len() == 1 {
            // All occurrences share one file: name it once with the lines.
            let lines: Vec<String> = group
                .occurrences
                .iter()
                .map(|o| o.line_index.to_string())
                .collect();
            writeln!(
                out,
                "    - (within-file duplicates) {} [lines {}]",
                inputs.name_of(sources[0]),
                lines.join(", ")
            )?;
        } else {
            for occurrence in &group.occurrences {
                writeln!(
                    out,
                    "    - {}:{}",
                    inputs.name_of(occurrence.source),
                    occurrence.line_index
                )?;
            }
        }
    }

    if !report.skipped.is_empty() {
        writeln!(out)?;
        writeln!(out, "Skipped inputs:")?;
        for skipped in &report.skipped {
            writeln!(out, "    - {}: {}", skipped.name, skipped.reason)?;
        }
    }
    Ok(())
}

fn write_json(
    report: &DetectionReport,
    inputs: &InputSet,
    out: &mut dyn Write,
) -> Result<(), DupeError> {
    let groups = report
        .groups
        .iter()
        .map(|group| JsonGroup {
            key: key_to_hex(&group.key),
            kind: group.kind,
            display_prefix: group.display_prefix().to_string(),
            occurrences: group
                .occurrences
                .iter()
                .map(|o| JsonOccurrence {
                    file: inputs.name_of(o.source).to_string(),
                    line: o.line_index,
                })
                .collect(),
        })
        .collect();

    let json = JsonReport {
        strategy: report.strategy,
        groups,
        skipped: &report.skipped,
        summary: JsonSummary {
            files_processed: report.stats.files_processed,
            files_skipped: report.stats.files_skipped,
            records_scanned: report.stats.records_scanned,
            duplicate_groups: report.stats.duplicate_groups,
            duplicate_records: report.stats.duplicate_records,
        },
    };

    let rendered = serde_json::to_string_pretty(&json)
        .map_err(|e| DupeError::Config(format!("failed to serialize report: {e}")))?;
    writeln!(out, "{rendered}")?;
    Ok(())
}
