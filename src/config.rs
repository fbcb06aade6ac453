//! Engine configuration.
//!
//! All tunables travel in one explicit [`EngineConfig`] handed to every
//! component at construction time; there are no process-wide mutable
//! defaults. Invalid values are a fatal [`DupeError::Config`] before any
//! processing starts.

use std::path::PathBuf;

use crate::error::DupeError;
use crate::key::HashBackend;
use crate::strategy::StrategyChoice;

/// Default number of leading fields hashed into the record key.
pub const DEFAULT_HASH_FIELDS: usize = 6;

/// Default field delimiter.
pub const DEFAULT_HASH_DELIMITER: char = ';';

/// Default display-prefix length in characters.
pub const DEFAULT_WRITE_LENGTH: usize = 47;

/// Default fraction of available memory the engines may plan to use.
pub const DEFAULT_RAM_USAGE_THRESHOLD: f64 = 0.70;

/// Default disk-mode chunk size in megabytes.
pub const DEFAULT_DISK_CHUNK_SIZE_MB: u64 = 256;

/// Default maximum number of sort runs merged in one pass.
pub const DEFAULT_MERGE_FAN_IN: usize = 64;

/// Configuration for a duplicate-detection run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of leading delimiter-separated fields hashed into the key.
    pub hash_fields: usize,
    /// Single-character field delimiter.
    pub hash_delimiter: char,
    /// Display prefix length in characters (0 disables prefixes).
    pub write_length: usize,
    /// Requested strategy, or `Auto` to let the selector decide.
    pub strategy: StrategyChoice,
    /// Fraction (0-1) of available memory the run may plan to use.
    pub ram_usage_threshold: f64,
    /// Approximate disk-mode chunk size in megabytes.
    pub disk_chunk_size_mb: u64,
    /// Upper bound on parallel workers.
    pub max_workers: usize,
    /// Maximum sort runs merged in a single pass; more runs trigger a
    /// hierarchical pre-merge.
    pub merge_fan_in: usize,
    /// Skip the first line of every input file (CSV header).
    pub skip_header: bool,
    /// Directory for disk-mode scratch space; system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    /// Hash backend used by every engine in this run.
    pub hash_backend: HashBackend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hash_fields: DEFAULT_HASH_FIELDS,
            hash_delimiter: DEFAULT_HASH_DELIMITER,
            write_length: DEFAULT_WRITE_LENGTH,
            strategy: StrategyChoice::Auto,
            ram_usage_threshold: DEFAULT_RAM_USAGE_THRESHOLD,
            disk_chunk_size_mb: DEFAULT_DISK_CHUNK_SIZE_MB,
            max_workers: default_workers(),
            merge_fan_in: DEFAULT_MERGE_FAN_IN,
            skip_header: false,
            scratch_dir: None,
            hash_backend: HashBackend::default(),
        }
    }
}

/// Default worker count: all cores but one, at least one.
#[must_use]
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(2);
    cpus.saturating_sub(1).max(1)
}

impl EngineConfig {
    /// Set the number of key fields.
    #[must_use]
    pub fn with_hash_fields(mut self, hash_fields: usize) -> Self {
        self.hash_fields = hash_fields;
        self
    }

    /// Set the field delimiter.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.hash_delimiter = delimiter;
        self
    }

    /// Set the display prefix length.
    #[must_use]
    pub fn with_write_length(mut self, write_length: usize) -> Self {
        self.write_length = write_length;
        self
    }

    /// Set the strategy choice.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyChoice) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the RAM usage threshold.
    #[must_use]
    pub fn with_ram_usage_threshold(mut self, threshold: f64) -> Self {
        self.ram_usage_threshold = threshold;
        self
    }

    /// Set the disk-mode chunk size in megabytes.
    #[must_use]
    pub fn with_disk_chunk_size_mb(mut self, mb: u64) -> Self {
        self.disk_chunk_size_mb = mb;
        self
    }

    /// Set the worker cap.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    /// Set the merge fan-in.
    #[must_use]
    pub fn with_merge_fan_in(mut self, fan_in: usize) -> Self {
        self.merge_fan_in = fan_in;
        self
    }

    /// Enable or disable header skipping.
    #[must_use]
    pub fn with_skip_header(mut self, skip: bool) -> Self {
        self.skip_header = skip;
        self
    }

    /// Set the scratch directory for disk mode.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    /// Set the hash backend.
    #[must_use]
    pub fn with_hash_backend(mut self, backend: HashBackend) -> Self {
        self.hash_backend = backend;
        self
    }

    /// Disk-mode chunk size in bytes.
    #[must_use]
    pub fn chunk_bytes(&self) -> u64 {
        self.disk_chunk_size_mb * 1024 * 1024
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DupeError::Config`] for any out-of-range value. Validation
    /// runs once, before processing starts.
    pub fn validate(&self) -> Result<(), DupeError> {
        if self.hash_fields == 0 {
            return Err(DupeError::Config(
                "hash_fields must be a positive integer".into(),
            ));
        }
        if self.hash_delimiter == '\n' || self.hash_delimiter == '\r' {
            return Err(DupeError::Config(
                "hash_delimiter must not be a line terminator".into(),
            ));
        }
        if self.hash_delimiter == crate::key::FIELD_SEPARATOR as char {
            return Err(DupeError::Config(
                "hash_delimiter collides with the internal field separator (0x1F)".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.ram_usage_threshold) {
            return Err(DupeError::Config(format!(
                "ram_usage_threshold must be within 0..=1, got {}",
                self.ram_usage_threshold
            )));
        }
        if self.disk_chunk_size_mb == 0 {
            return Err(DupeError::Config(
                "disk_chunk_size_mb must be a positive integer".into(),
            ));
        }
        if self.max_workers == 0 {
            return Err(DupeError::Config(
                "max_workers must be a positive integer".into(),
            ));
        }
        if self.merge_fan_in < 2 {
            return Err(DupeError::Config(
                "merge_fan_in must be at least 2".into(),
            ));
        }
        Ok(())
    }
}
