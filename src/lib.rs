//! LineDupe - Adaptive Duplicate-Record Finder
//!
//! Detects duplicate records (lines keyed on their leading delimited
//! fields) within and across large text files, choosing an in-memory,
//! two-pass streaming or external-sort strategy to match the input size
//! and the memory available on the host.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod key;
pub mod logging;
pub mod pool;
pub mod progress;
pub mod report;
pub mod signal;
pub mod strategy;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::Cli;
use crate::error::{DupeError, ExitCode};
use crate::input::InputSet;
use crate::progress::{Progress, ProgressCallback};
use crate::signal::ShutdownHandler;
use crate::strategy::StrategySelector;

/// Run the application: discover inputs, pick a strategy, detect
/// duplicates and write the report.
///
/// # Errors
///
/// Fatal [`DupeError`] classes (configuration, resource exhaustion, merge
/// consistency, interruption) abort the run; skipped inputs do not.
pub fn run_app(cli: Cli, shutdown: &ShutdownHandler) -> anyhow::Result<ExitCode> {
    let started = std::time::Instant::now();

    let config = cli.to_config();
    config.validate()?;

    let inputs = InputSet::discover(&cli.input)?;
    if inputs.is_empty() {
        log::warn!("No processable files (.csv/.txt) in {}", cli.input.display());
        return Ok(ExitCode::NoDuplicates);
    }
    log::info!(
        "Found {} input files, {} total",
        inputs.len(),
        bytesize::ByteSize(inputs.total_bytes())
    );

    let decision = StrategySelector::new(&config).select(inputs.total_bytes());

    let progress: Option<Arc<dyn ProgressCallback>> = if cli.quiet {
        None
    } else {
        Some(Arc::new(Progress::new(false)))
    };

    let engine = engine::build_engine(
        &decision,
        config,
        Some(shutdown.get_flag()),
        progress,
    );
    let report = engine.process(&inputs)?;

    match cli.output {
        Some(ref path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create report file {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            report::write_report(&report, &inputs, &mut writer, cli.format.into())?;
            writer.flush()?;
            log::info!("Report written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            report::write_report(&report, &inputs, &mut handle, cli.format.into())?;
        }
    }

    log::info!(
        "Run complete in {:.2?}: {} duplicate groups, {} files skipped",
        started.elapsed(),
        report.stats.duplicate_groups,
        report.stats.files_skipped
    );

    Ok(if !report.skipped.is_empty() {
        ExitCode::PartialSuccess
    } else if report.has_duplicates() {
        ExitCode::Success
    } else {
        ExitCode::NoDuplicates
    })
}

/// Map a fatal error to its exit code.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err
        .downcast_ref::<DupeError>()
        .is_some_and(|e| matches!(e, DupeError::Interrupted))
    {
        ExitCode::Interrupted
    } else {
        ExitCode::GeneralError
    }
}
