//! Error taxonomy, structured errors and exit codes.
//!
//! Errors fall into two groups: per-unit failures (an unreadable input file)
//! that are recovered by skipping the unit, and fatal classes that stop the
//! run after cleanup. Per-unit failures travel inside worker-pool outcomes;
//! fatal classes cross the pool boundary as `Err`.

use serde::Serialize;
use std::path::PathBuf;

/// Errors produced by the duplicate-detection pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DupeError {
    /// Invalid configuration. Fatal, aborts before processing starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// An input file could not be opened or read. Recovered per-file:
    /// the file is skipped with a warning and processing continues.
    #[error("cannot read {}: {source}", path.display())]
    InputAccess {
        /// Path of the unreadable input
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Disk or memory gave out mid-run (e.g. disk full while writing a
    /// sort run). Fatal; disk mode cleans up its scratch space first.
    #[error("resource exhausted while writing {}: {source}", path.display())]
    ResourceExhaustion {
        /// Path being written when the resource ran out
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A sort run is unreadable or structurally corrupt during merge.
    /// Fatal: grouping cannot be guaranteed without the full data.
    #[error("sort run {} is corrupt or unreadable: {detail}", path.display())]
    MergeConsistency {
        /// Path of the offending run file
        path: PathBuf,
        /// What the merge found wrong with it
        detail: String,
    },

    /// The run was interrupted by the user (Ctrl+C or shutdown signal).
    #[error("interrupted by user")]
    Interrupted,

    /// Any other I/O error without a more specific classification.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DupeError {
    /// Whether this error is recoverable by skipping the current unit of
    /// work. Only input-access failures qualify; everything else is fatal.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InputAccess { .. })
    }

    /// Build an input-access error for `path`.
    #[must_use]
    pub fn input_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::InputAccess {
            path: path.into(),
            source,
        }
    }

    /// Build a merge-consistency error for `path`.
    #[must_use]
    pub fn merge_consistency(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        Self::MergeConsistency {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

/// Exit codes for the LineDupe application.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Partial success (completed with some inputs skipped)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the run completed and duplicates were found.
    Success = 0,
    /// General error: an unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: the run completed but found no duplicates.
    NoDuplicates = 2,
    /// Partial success: the run completed but some inputs were skipped.
    PartialSuccess = 3,
    /// Interrupted: the run was interrupted by the user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "LD000",
            Self::GeneralError => "LD001",
            Self::NoDuplicates => "LD002",
            Self::PartialSuccess => "LD003",
            Self::Interrupted => "LD130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "LD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
