//! The three duplicate-detection engines behind one trait.
//!
//! A [`StrategyDecision`] names an engine; [`build_engine`] constructs it.
//! Every engine consumes the same ordered [`InputSet`], uses the same
//! [`KeyExtractor`], and produces the same [`DetectionReport`] shape, so
//! the strategies are interchangeable in everything but cost.

mod disk;
mod fast;
mod safe;

pub use disk::DiskEngine;
pub use fast::FastEngine;
pub use safe::SafeEngine;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregate::DetectionReport;
use crate::config::EngineConfig;
use crate::error::DupeError;
use crate::input::InputSet;
use crate::key::{select_hasher, KeyExtractor};
use crate::pool::WorkerPool;
use crate::progress::ProgressCallback;
use crate::strategy::{Strategy, StrategyDecision};

/// Check the shutdown flag once per this many records inside hot loops.
const SHUTDOWN_CHECK_INTERVAL: u64 = 8192;

impl crate::pool::WorkUnit for crate::input::InputFile {
    fn label(&self) -> String {
        self.name.clone()
    }
}

/// A duplicate-detection engine.
///
/// Implementations must honor cross-strategy key equality: for the same
/// inputs and configuration, every engine reports the same groups with the
/// same classification and occurrences.
pub trait DetectionEngine: Send + Sync {
    /// Process the ordered input set into a detection report.
    ///
    /// # Errors
    ///
    /// Fatal taxonomy classes only; unreadable files are skipped and
    /// recorded in the report instead.
    fn process(&self, inputs: &InputSet) -> Result<DetectionReport, DupeError>;

    /// The strategy this engine implements.
    fn strategy(&self) -> Strategy;
}

/// Shared state handed to every engine at construction.
pub struct EngineContext {
    /// The run configuration.
    pub config: EngineConfig,
    /// Key extractor shared by all workers.
    pub extractor: Arc<KeyExtractor>,
    /// The worker pool sized by the strategy decision.
    pub pool: WorkerPool,
    /// Cooperative cancellation flag.
    pub shutdown: Option<Arc<AtomicBool>>,
    /// Optional progress sink.
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl EngineContext {
    /// Whether the user asked for cancellation.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Bail out with [`DupeError::Interrupted`] when cancellation was
    /// requested. Cheap enough for per-interval use in record loops.
    pub fn check_interrupted(&self) -> Result<(), DupeError> {
        if self.is_shutdown_requested() {
            Err(DupeError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub(crate) fn phase_start(&self, phase: &str, total: usize) {
        if let Some(ref progress) = self.progress {
            progress.on_phase_start(phase, total);
        }
    }

    pub(crate) fn phase_tick(&self, current: usize, label: &str) {
        if let Some(ref progress) = self.progress {
            progress.on_progress(current, label);
        }
    }

    pub(crate) fn phase_end(&self, phase: &str) {
        if let Some(ref progress) = self.progress {
            progress.on_phase_end(phase);
        }
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("shutdown", &self.shutdown.is_some())
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Build the engine named by `decision`.
pub fn build_engine(
    decision: &StrategyDecision,
    config: EngineConfig,
    shutdown: Option<Arc<AtomicBool>>,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Box<dyn DetectionEngine> {
    let extractor = Arc::new(KeyExtractor::new(
        &config,
        select_hasher(config.hash_backend),
    ));
    log::info!(
        "Engine '{}' with {} workers, hash backend '{}'",
        decision.strategy,
        decision.workers,
        extractor.hasher_name()
    );
    let ctx = EngineContext {
        config,
        extractor,
        pool: WorkerPool::new(decision.workers),
        shutdown,
        progress,
    };
    match decision.strategy {
        Strategy::Fast => Box::new(FastEngine::new(ctx)),
        Strategy::Safe => Box::new(SafeEngine::new(ctx)),
        Strategy::Disk => Box::new(DiskEngine::new(ctx, decision.chunk_bytes)),
    }
}

/// Stream the records of one file through `visit`.
///
/// Lines are decoded permissively (undecodable bytes become replacement
/// characters) and trimmed; lines empty after trimming and, when
/// `skip_header` is set, the first physical line produce no record. The
/// callback receives the zero-based physical line index, so indexes are
/// stable regardless of blank lines.
///
/// Returns the number of records visited.
///
/// # Errors
///
/// [`DupeError::InputAccess`] when the file cannot be opened or read, or
/// whatever `visit` itself returns.
pub(crate) fn for_each_record<F>(
    path: &Path,
    skip_header: bool,
    mut visit: F,
) -> Result<u64, DupeError>
where
    F: FnMut(u64, &str) -> Result<(), DupeError>,
{
    let file = File::open(path).map_err(|e| DupeError::input_access(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut raw = Vec::new();
    let mut line_index: u64 = 0;
    let mut records: u64 = 0;

    loop {
        raw.clear();
        let n = reader
            .read_until(b'\n', &mut raw)
            .map_err(|e| DupeError::input_access(path, e))?;
        if n == 0 {
            break;
        }
        if !(skip_header && line_index == 0) {
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim();
            if !line.is_empty() {
                visit(line_index, line)?;
                records += 1;
            }
        }
        line_index += 1;
    }
    Ok(records)
}

/// Shutdown probe for record loops: checks the flag every
/// [`SHUTDOWN_CHECK_INTERVAL`] records.
pub(crate) fn check_interval(
    shutdown: Option<&Arc<AtomicBool>>,
    records: u64,
) -> Result<(), DupeError> {
    if records % SHUTDOWN_CHECK_INTERVAL == 0 {
        if let Some(flag) = shutdown {
            if flag.load(Ordering::SeqCst) {
                return Err(DupeError::Interrupted);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_for_each_record_skips_blanks_and_counts_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "first;row").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "   ").unwrap();
        writeln!(f, "second;row").unwrap();
        drop(f);

        let mut seen = Vec::new();
        let records = for_each_record(&path, false, |idx, line| {
            seen.push((idx, line.to_string()));
            Ok(())
        })
        .unwrap();

        assert_eq!(records, 2);
        assert_eq!(
            seen,
            vec![(0, "first;row".to_string()), (3, "second;row".to_string())]
        );
    }

    #[test]
    fn test_for_each_record_skip_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "header;line\ndata;line\n").unwrap();

        let mut seen = Vec::new();
        let records = for_each_record(&path, true, |idx, line| {
            seen.push((idx, line.to_string()));
            Ok(())
        })
        .unwrap();

        assert_eq!(records, 1);
        assert_eq!(seen, vec![(1, "data;line".to_string())]);
    }

    #[test]
    fn test_for_each_record_handles_missing_trailing_newline() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "only;line").unwrap();

        let records = for_each_record(&path, false, |_, _| Ok(())).unwrap();
        assert_eq!(records, 1);
    }

    #[test]
    fn test_for_each_record_decodes_invalid_utf8_permissively() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, b"bad\xFFbytes;x\n").unwrap();

        let mut seen = Vec::new();
        for_each_record(&path, false, |_, line| {
            seen.push(line.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains('\u{FFFD}'));
    }

    #[test]
    fn test_for_each_record_missing_file_is_input_access() {
        let err = for_each_record(Path::new("/no/such/file.csv"), false, |_, _| Ok(()))
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
