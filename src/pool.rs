//! Fixed-size worker pool with tagged outcomes.
//!
//! Engines hand the pool a batch of disjoint work units (files or chunks)
//! and a pure-ish worker function; the pool runs them in parallel and
//! returns one tagged outcome per unit, in submission order. A failing
//! unit produces an `Err` outcome without terminating its siblings; the
//! engine decides what failure means (policy here: tolerate recoverable
//! failures, always report them).

use rayon::prelude::*;

use crate::error::DupeError;

/// A unit of work with a human-readable label for logs and outcomes.
pub trait WorkUnit: Sync {
    /// Label naming this unit (typically the file name, plus a chunk
    /// ordinal in disk mode).
    fn label(&self) -> String;
}

impl<T: WorkUnit> WorkUnit for &T {
    fn label(&self) -> String {
        (*self).label()
    }
}

/// The tagged result of one unit of work.
#[derive(Debug)]
pub struct UnitOutcome<R> {
    /// Label of the unit that produced this outcome.
    pub label: String,
    /// The unit's partial result, or its failure.
    pub result: Result<R, DupeError>,
}

/// Fixed-size pool of parallel executors.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Build a pool with `workers` threads.
    ///
    /// If the dedicated pool cannot be built, falls back to a default one
    /// with a warning rather than failing the run.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("linedupe-worker-{i}"))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to create worker pool ({e}), using default pool");
                rayon::ThreadPoolBuilder::new().build().expect("default thread pool")
            });
        Self { pool, workers }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every unit in parallel and collect one outcome per
    /// unit, in the order the units were submitted.
    ///
    /// Outcomes carry failures as values; nothing escapes the pool
    /// boundary as a panic or early return.
    pub fn run<U, R, F>(&self, units: &[U], work: F) -> Vec<UnitOutcome<R>>
    where
        U: WorkUnit,
        R: Send,
        F: Fn(usize, &U) -> Result<R, DupeError> + Sync,
    {
        self.pool.install(|| {
            units
                .par_iter()
                .enumerate()
                .map(|(index, unit)| UnitOutcome {
                    label: unit.label(),
                    result: work(index, unit),
                })
                .collect()
        })
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}
