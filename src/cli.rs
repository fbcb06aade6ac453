//! Command-line interface definitions.
//!
//! All CLI arguments and options using the clap derive API. The CLI is a
//! thin collaborator of the core: it only assembles an
//! [`EngineConfig`](crate::config::EngineConfig) and names the input and
//! output locations.
//!
//! # Example
//!
//! ```bash
//! # Scan a directory, auto-selected strategy, report to stdout
//! linedupe ./input
//!
//! # Force the disk strategy with small chunks and a JSON report
//! linedupe ./input --strategy disk --chunk-size 64 --format json -o report.json
//!
//! # Key on the first 4 comma-separated fields
//! linedupe ./input --hash-fields 4 --delimiter ','
//! ```

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::key::HashBackend;
use crate::report::ReportFormat;
use crate::strategy::{Strategy, StrategyChoice};

/// Adaptive duplicate-record finder for large delimited text files.
///
/// LineDupe hashes the leading fields of every line and reports groups of
/// records sharing a key, within one file and across files, picking an
/// in-memory, streaming or on-disk strategy to match available memory.
#[derive(Debug, Parser)]
#[command(name = "linedupe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory containing the input files (.csv / .txt, non-recursive)
    #[arg(value_name = "INPUT_DIR")]
    pub input: PathBuf,

    /// Write the report to this file instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    pub format: FormatArg,

    /// Processing strategy
    #[arg(short, long, value_enum, default_value = "auto")]
    pub strategy: StrategyArg,

    /// Number of leading fields hashed into the record key
    #[arg(long, value_name = "N", default_value = "6")]
    pub hash_fields: usize,

    /// Single-character field delimiter
    #[arg(long, value_name = "CHAR", default_value = ";")]
    pub delimiter: char,

    /// Display prefix length in characters
    #[arg(long, value_name = "N", default_value = "47")]
    pub write_length: usize,

    /// Fraction (0-1) of available memory the run may plan to use
    #[arg(long, value_name = "FRACTION", default_value = "0.70")]
    pub ram_threshold: f64,

    /// Disk-mode chunk size in megabytes
    #[arg(long = "chunk-size", value_name = "MB", default_value = "256")]
    pub chunk_size_mb: u64,

    /// Upper bound on parallel workers (default: all cores but one)
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Maximum sort runs merged in one pass (disk mode)
    #[arg(long = "fan-in", value_name = "N", default_value = "64")]
    pub merge_fan_in: usize,

    /// Skip the first line of every input file (CSV header)
    #[arg(long)]
    pub skip_header: bool,

    /// Directory for disk-mode scratch space (default: system temp dir)
    #[arg(long, value_name = "PATH")]
    pub scratch_dir: Option<PathBuf>,

    /// Hash backend for record keys
    #[arg(long = "hash", value_enum, default_value = "blake3")]
    pub hash_backend: HashBackendArg,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

/// Strategy option on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Decide from input size and available memory
    Auto,
    /// In-memory, single pass (fastest, most memory)
    Fast,
    /// Two streaming passes (bounded by distinct keys)
    Safe,
    /// External sort on disk (bounded memory, slowest)
    Disk,
}

impl From<StrategyArg> for StrategyChoice {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => StrategyChoice::Auto,
            StrategyArg::Fast => StrategyChoice::Forced(Strategy::Fast),
            StrategyArg::Safe => StrategyChoice::Forced(Strategy::Safe),
            StrategyArg::Disk => StrategyChoice::Forced(Strategy::Disk),
        }
    }
}

/// Hash backend option on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HashBackendArg {
    /// Fast 128-bit BLAKE3 key
    Blake3,
    /// SHA-256 truncated to 128 bits
    Sha256,
}

impl From<HashBackendArg> for HashBackend {
    fn from(arg: HashBackendArg) -> Self {
        match arg {
            HashBackendArg::Blake3 => HashBackend::Blake3,
            HashBackendArg::Sha256 => HashBackend::Sha256,
        }
    }
}

/// Report format option on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Human-readable text report
    Text,
    /// Machine-readable JSON
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

impl Cli {
    /// Assemble the engine configuration from the parsed arguments.
    #[must_use]
    pub fn to_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default()
            .with_hash_fields(self.hash_fields)
            .with_delimiter(self.delimiter)
            .with_write_length(self.write_length)
            .with_strategy(self.strategy.into())
            .with_ram_usage_threshold(self.ram_threshold)
            .with_disk_chunk_size_mb(self.chunk_size_mb)
            .with_merge_fan_in(self.merge_fan_in)
            .with_skip_header(self.skip_header)
            .with_hash_backend(self.hash_backend.into());
        if let Some(workers) = self.max_workers {
            config = config.with_max_workers(workers);
        }
        if let Some(ref dir) = self.scratch_dir {
            config = config.with_scratch_dir(dir.clone());
        }
        config
    }
}
