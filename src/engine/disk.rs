//! Disk strategy: external sort + k-way merge.
//!
//! Memory is bounded by chunk size and merge fan-in only, independent of
//! total input size:
//!
//! 1. **Partition**: each file is cut into chunk descriptors of roughly
//!    the configured size, aligned to line boundaries, each knowing its
//!    starting byte offset and line index.
//! 2. **Local sort**: one worker per chunk extracts occurrences, sorts
//!    them by key (stable, so ties keep encounter order) and writes one
//!    run file into the scratch directory.
//! 3. **Merge**: a min-heap keyed on `(key, run ordinal, position)` pulls
//!    the smallest unread element across all open runs; consecutive equal
//!    keys stream into one group. When the run count exceeds the fan-in,
//!    consecutive batches are pre-merged into intermediate runs first, so
//!    a group spanning more runs than the fan-in is still grouped.
//! 4. **Cleanup**: runs are deleted as they are exhausted and the scratch
//!    directory is removed on every exit path, success or failure.
//!
//! Run record layout (internal contract between sort and merge):
//! `[key: 16][source len: u16 LE][source bytes][line index: u64 LE]`
//! `[prefix len: u32 LE][prefix bytes]`, sorted by key ascending.

use std::collections::{BinaryHeap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::aggregate::{
    Aggregator, DetectionReport, DetectionStats, Occurrence, SkippedFile,
};
use crate::error::DupeError;
use crate::input::{InputFile, InputSet, SourceId};
use crate::key::{Key, KEY_WIDTH};
use crate::pool::WorkUnit;
use crate::strategy::Strategy;

use super::{check_interval, DetectionEngine, EngineContext};

/// External-sort duplicate detector.
pub struct DiskEngine {
    ctx: EngineContext,
    chunk_bytes: u64,
}

/// A line-aligned slice of one input file, the unit of work for the sort
/// phase.
#[derive(Debug, Clone)]
struct ChunkSpec {
    source: SourceId,
    source_name: String,
    path: PathBuf,
    /// Chunk ordinal within its file.
    seq: u32,
    start_offset: u64,
    byte_len: u64,
    start_line: u64,
}

impl WorkUnit for ChunkSpec {
    fn label(&self) -> String {
        format!("{}#{}", self.source_name, self.seq)
    }
}

/// A sorted run on disk, ready to merge.
#[derive(Debug)]
struct RunHandle {
    path: PathBuf,
    /// Creation order; the merge tie-break after the key.
    ordinal: u32,
    records: u64,
}

/// One decoded run record.
#[derive(Debug)]
struct RunRecord {
    key: Key,
    source_name: String,
    line_index: u64,
    prefix: String,
}

impl DiskEngine {
    /// Create the engine with its shared context and chunk size.
    #[must_use]
    pub fn new(ctx: EngineContext, chunk_bytes: u64) -> Self {
        Self { ctx, chunk_bytes }
    }

    // ------------------------------------------------------------------
    // Phase 1: partition
    // ------------------------------------------------------------------

    /// Cut one file into line-aligned chunk descriptors.
    ///
    /// Reads the file once to locate boundaries; a record is never split
    /// across chunks.
    fn scan_chunks(&self, file: &InputFile) -> Result<Vec<ChunkSpec>, DupeError> {
        let handle = File::open(&file.path).map_err(|e| DupeError::input_access(&file.path, e))?;
        let mut reader = BufReader::with_capacity(64 * 1024, handle);
        let mut raw = Vec::new();

        let mut chunks = Vec::new();
        let mut seq: u32 = 0;
        let mut start_offset: u64 = 0;
        let mut start_line: u64 = 0;
        let mut chunk_len: u64 = 0;
        let mut chunk_lines: u64 = 0;

        loop {
            raw.clear();
            let n = reader
                .read_until(b'\n', &mut raw)
                .map_err(|e| DupeError::input_access(&file.path, e))?;
            if n == 0 {
                break;
            }
            check_interval(self.ctx.shutdown.as_ref(), start_line + chunk_lines)?;
            chunk_len += n as u64;
            chunk_lines += 1;
            if chunk_len >= self.chunk_bytes {
                chunks.push(ChunkSpec {
                    source: file.id,
                    source_name: file.name.clone(),
                    path: file.path.clone(),
                    seq,
                    start_offset,
                    byte_len: chunk_len,
                    start_line,
                });
                seq += 1;
                start_offset += chunk_len;
                start_line += chunk_lines;
                chunk_len = 0;
                chunk_lines = 0;
            }
        }
        if chunk_len > 0 {
            chunks.push(ChunkSpec {
                source: file.id,
                source_name: file.name.clone(),
                path: file.path.clone(),
                seq,
                start_offset,
                byte_len: chunk_len,
                start_line,
            });
        }
        Ok(chunks)
    }

    // ------------------------------------------------------------------
    // Phase 2: local sort
    // ------------------------------------------------------------------

    /// Extract, sort and persist one chunk as a run.
    ///
    /// Returns `None` for a chunk that produced no records (all blank).
    fn write_run(
        &self,
        chunk: &ChunkSpec,
        ordinal: u32,
        scratch: &ScratchDir,
    ) -> Result<Option<RunHandle>, DupeError> {
        let mut entries: Vec<(Key, u64, String)> = Vec::new();

        let mut handle =
            File::open(&chunk.path).map_err(|e| DupeError::input_access(&chunk.path, e))?;
        handle
            .seek(SeekFrom::Start(chunk.start_offset))
            .map_err(|e| DupeError::input_access(&chunk.path, e))?;
        let mut reader = BufReader::with_capacity(64 * 1024, handle.take(chunk.byte_len));

        let mut raw = Vec::new();
        let mut line_index = chunk.start_line;
        loop {
            raw.clear();
            let n = reader
                .read_until(b'\n', &mut raw)
                .map_err(|e| DupeError::input_access(&chunk.path, e))?;
            if n == 0 {
                break;
            }
            check_interval(self.ctx.shutdown.as_ref(), line_index)?;
            if !(self.ctx.config.skip_header && line_index == 0) {
                let decoded = String::from_utf8_lossy(&raw);
                let line = decoded.trim();
                if !line.is_empty() {
                    let (key, prefix) = self.ctx.extractor.extract(line);
                    entries.push((key, line_index, prefix));
                }
            }
            line_index += 1;
        }

        if entries.is_empty() {
            return Ok(None);
        }

        // Stable sort keeps equal keys in encounter order.
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let run_path = scratch.join(&format!("run_{ordinal:06}.run"));
        let file = File::create(&run_path).map_err(|e| DupeError::ResourceExhaustion {
            path: run_path.clone(),
            source: e,
        })?;
        let mut writer = BufWriter::with_capacity(64 * 1024, file);
        let records = entries.len() as u64;
        for (key, line, prefix) in entries {
            write_record(&mut writer, &run_path, &key, &chunk.source_name, line, &prefix)?;
        }
        writer.flush().map_err(|e| DupeError::ResourceExhaustion {
            path: run_path.clone(),
            source: e,
        })?;

        log::debug!(
            "Run {} written: {} records from {}",
            run_path.display(),
            records,
            chunk.label()
        );
        Ok(Some(RunHandle {
            path: run_path,
            ordinal,
            records,
        }))
    }

    // ------------------------------------------------------------------
    // Phase 3: merge
    // ------------------------------------------------------------------

    /// Pre-merge consecutive batches of runs until at most `fan_in`
    /// remain. Ordinals are reassigned per level in batch order, which
    /// preserves the global tie-break ordering.
    fn reduce_runs(
        &self,
        mut runs: Vec<RunHandle>,
        scratch: &ScratchDir,
    ) -> Result<Vec<RunHandle>, DupeError> {
        let fan_in = self.ctx.config.merge_fan_in;
        let mut level = 0u32;
        while runs.len() > fan_in {
            level += 1;
            log::info!(
                "Merge level {level}: {} runs exceed fan-in {fan_in}, pre-merging",
                runs.len()
            );
            let mut next = Vec::new();
            let mut batch_idx: u32 = 0;
            while !runs.is_empty() {
                let rest = runs.split_off(fan_in.min(runs.len()));
                let batch = std::mem::replace(&mut runs, rest);
                self.ctx.check_interrupted()?;
                if batch.len() == 1 {
                    // Nothing to merge; just takes its place in the new level.
                    let mut only = batch.into_iter().next().expect("single-run batch");
                    only.ordinal = batch_idx;
                    next.push(only);
                } else {
                    let records: u64 = batch.iter().map(|r| r.records).sum();
                    let merged_path = scratch.join(&format!("merge_{level:02}_{batch_idx:05}.run"));
                    let file =
                        File::create(&merged_path).map_err(|e| DupeError::ResourceExhaustion {
                            path: merged_path.clone(),
                            source: e,
                        })?;
                    let mut writer = BufWriter::with_capacity(64 * 1024, file);
                    merge_streams(batch, |record| {
                        write_record(
                            &mut writer,
                            &merged_path,
                            &record.key,
                            &record.source_name,
                            record.line_index,
                            &record.prefix,
                        )
                    })?;
                    writer.flush().map_err(|e| DupeError::ResourceExhaustion {
                        path: merged_path.clone(),
                        source: e,
                    })?;
                    next.push(RunHandle {
                        path: merged_path,
                        ordinal: batch_idx,
                        records,
                    });
                }
                batch_idx += 1;
            }
            runs = next;
        }
        Ok(runs)
    }

    /// Final grouping merge: stream consecutive equal keys into duplicate
    /// groups.
    fn merge_into_groups(
        &self,
        runs: Vec<RunHandle>,
        inputs: &InputSet,
        aggregator: &mut Aggregator,
    ) -> Result<(), DupeError> {
        let ids = inputs.ids_by_name();
        let mut current: Option<(Key, Vec<Occurrence>)> = None;
        let mut merged: u64 = 0;

        merge_streams(runs, |record| {
            merged += 1;
            check_interval(self.ctx.shutdown.as_ref(), merged)?;

            let source = *ids.get(record.source_name.as_str()).ok_or_else(|| {
                DupeError::merge_consistency(
                    record.source_name.as_str(),
                    "run references an unknown source file",
                )
            })?;
            let occurrence = Occurrence::new(source, record.line_index, record.prefix);

            let unmatched = match current.as_mut() {
                Some((key, buffer)) if *key == record.key => {
                    buffer.push(occurrence);
                    None
                }
                _ => Some(occurrence),
            };
            if let Some(occurrence) = unmatched {
                if let Some((key, buffer)) = current.take() {
                    aggregator.add_group(key, buffer);
                }
                current = Some((record.key, vec![occurrence]));
            }
            Ok(())
        })?;

        if let Some((key, buffer)) = current.take() {
            aggregator.add_group(key, buffer);
        }
        Ok(())
    }
}

impl DetectionEngine for DiskEngine {
    fn process(&self, inputs: &InputSet) -> Result<DetectionReport, DupeError> {
        let mut stats = DetectionStats::default();
        let mut skipped = Vec::new();

        // The scratch directory owns every run file; dropping it on any
        // exit path removes them all, so a failed merge leaves no orphans.
        let scratch = ScratchDir::create(self.ctx.config.scratch_dir.as_deref())?;
        log::info!("Disk mode scratch directory: {}", scratch.path().display());

        // Phase 1: partition files into line-aligned chunks.
        self.ctx.phase_start("partition", inputs.len());
        let outcomes = self.ctx.pool.run(inputs.files(), |index, file| {
            self.ctx.phase_tick(index + 1, &file.name);
            self.scan_chunks(file)
        });
        self.ctx.phase_end("partition");
        self.ctx.check_interrupted()?;

        let mut chunks: Vec<ChunkSpec> = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(file_chunks) => {
                    stats.files_processed += 1;
                    chunks.extend(file_chunks);
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
        log::info!(
            "Partitioned {} files into {} chunks (~{} each)",
            stats.files_processed,
            chunks.len(),
            bytesize::ByteSize(self.chunk_bytes)
        );

        // Phase 2: sort each chunk into a run.
        self.ctx.phase_start("sort", chunks.len());
        let outcomes = self.ctx.pool.run(&chunks, |index, chunk| {
            self.ctx.phase_tick(index + 1, &chunk.label());
            self.write_run(chunk, index as u32, &scratch)
        });
        self.ctx.phase_end("sort");
        self.ctx.check_interrupted()?;

        let mut runs: Vec<RunHandle> = Vec::new();
        let mut failed_sources: HashSet<SourceId> = HashSet::new();
        for (chunk, outcome) in chunks.iter().zip(outcomes) {
            match outcome.result {
                Ok(Some(run)) => {
                    stats.records_scanned += run.records;
                    runs.push(run);
                }
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    // The file was readable during partitioning but not
                    // now; drop the whole source so half a file can never
                    // masquerade as complete.
                    log::warn!("Skipping {}: {e}", outcome.label);
                    if failed_sources.insert(chunk.source) {
                        skipped.push(SkippedFile {
                            name: chunk.source_name.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if !failed_sources.is_empty() {
            stats.files_processed -= failed_sources.len();
            runs.retain(|run| {
                let keep = run_source(run, &chunks).is_none_or(|s| !failed_sources.contains(&s));
                if !keep {
                    stats.records_scanned -= run.records;
                    if let Err(e) = fs::remove_file(&run.path) {
                        log::warn!("Failed to drop run {}: {e}", run.path.display());
                    }
                }
                keep
            });
        }
        stats.files_skipped = skipped.len();

        // Phase 3: hierarchical reduction, then the grouping merge.
        self.ctx.phase_start("merge", runs.len());
        let runs = self.reduce_runs(runs, &scratch)?;
        let mut aggregator = Aggregator::new();
        self.merge_into_groups(runs, inputs, &mut aggregator)?;
        self.ctx.phase_end("merge");

        let groups = aggregator.finish();
        stats.duplicate_groups = groups.len();
        stats.duplicate_records = groups.iter().map(|g| g.len() as u64).sum();

        log::info!(
            "Disk scan complete: {} records, {} duplicate groups",
            stats.records_scanned,
            stats.duplicate_groups
        );

        Ok(DetectionReport {
            strategy: Strategy::Disk,
            groups,
            skipped,
            stats,
        })
    }

    fn strategy(&self) -> Strategy {
        Strategy::Disk
    }
}

/// Map a run back to its source id via the chunk it came from.
///
/// Ordinals are the chunk indexes at creation, so the lookup is direct.
fn run_source(run: &RunHandle, chunks: &[ChunkSpec]) -> Option<SourceId> {
    chunks.get(run.ordinal as usize).map(|c| c.source)
}

// ----------------------------------------------------------------------
// Run record I/O
// ----------------------------------------------------------------------

fn write_record(
    writer: &mut impl Write,
    run_path: &Path,
    key: &Key,
    source_name: &str,
    line_index: u64,
    prefix: &str,
) -> Result<(), DupeError> {
    let io_err = |e: std::io::Error| DupeError::ResourceExhaustion {
        path: run_path.to_path_buf(),
        source: e,
    };
    writer.write_all(key).map_err(io_err)?;
    let name = source_name.as_bytes();
    writer
        .write_all(&(name.len() as u16).to_le_bytes())
        .map_err(io_err)?;
    writer.write_all(name).map_err(io_err)?;
    writer.write_all(&line_index.to_le_bytes()).map_err(io_err)?;
    let prefix = prefix.as_bytes();
    writer
        .write_all(&(prefix.len() as u32).to_le_bytes())
        .map_err(io_err)?;
    writer.write_all(prefix).map_err(io_err)?;
    Ok(())
}

fn read_record(
    reader: &mut BufReader<File>,
    run_path: &Path,
) -> Result<Option<RunRecord>, DupeError> {
    // Clean end of run: no bytes left at a record boundary.
    let at_eof = reader
        .fill_buf()
        .map_err(|e| DupeError::merge_consistency(run_path, e.to_string()))?
        .is_empty();
    if at_eof {
        return Ok(None);
    }

    let truncated =
        |_: std::io::Error| DupeError::merge_consistency(run_path, "truncated record");

    let mut key = [0u8; KEY_WIDTH];
    reader.read_exact(&mut key).map_err(truncated)?;

    let mut len2 = [0u8; 2];
    reader.read_exact(&mut len2).map_err(truncated)?;
    let mut name = vec![0u8; u16::from_le_bytes(len2) as usize];
    reader.read_exact(&mut name).map_err(truncated)?;
    let source_name = String::from_utf8(name)
        .map_err(|_| DupeError::merge_consistency(run_path, "source name is not UTF-8"))?;

    let mut idx8 = [0u8; 8];
    reader.read_exact(&mut idx8).map_err(truncated)?;
    let line_index = u64::from_le_bytes(idx8);

    let mut len4 = [0u8; 4];
    reader.read_exact(&mut len4).map_err(truncated)?;
    let mut prefix = vec![0u8; u32::from_le_bytes(len4) as usize];
    reader.read_exact(&mut prefix).map_err(truncated)?;
    let prefix = String::from_utf8(prefix)
        .map_err(|_| DupeError::merge_consistency(run_path, "display prefix is not UTF-8"))?;

    Ok(Some(RunRecord {
        key,
        source_name,
        line_index,
        prefix,
    }))
}

// ----------------------------------------------------------------------
// K-way merge
// ----------------------------------------------------------------------

struct RunCursor {
    path: PathBuf,
    ordinal: u32,
    reader: BufReader<File>,
    /// Records read so far; the final tie-break, preserving encounter
    /// order within a run.
    pos: u64,
}

impl RunCursor {
    fn open(run: &RunHandle) -> Result<Self, DupeError> {
        let file = File::open(&run.path)
            .map_err(|e| DupeError::merge_consistency(&run.path, e.to_string()))?;
        Ok(Self {
            path: run.path.clone(),
            ordinal: run.ordinal,
            reader: BufReader::with_capacity(64 * 1024, file),
            pos: 0,
        })
    }

    fn next_record(&mut self) -> Result<Option<RunRecord>, DupeError> {
        let record = read_record(&mut self.reader, &self.path)?;
        if record.is_some() {
            self.pos += 1;
        }
        Ok(record)
    }
}

/// Remove an exhausted run file; consumed runs never outlive the merge.
fn retire_cursor(cursor: RunCursor) {
    let path = cursor.path.clone();
    drop(cursor);
    match fs::remove_file(&path) {
        Ok(()) => log::debug!("Run {} consumed and deleted", path.display()),
        Err(e) => log::warn!("Failed to delete consumed run {}: {e}", path.display()),
    }
}

/// Stream the union of `runs` through `sink` in `(key, run ordinal,
/// position)` order. Memory is O(open runs): one pending record each.
fn merge_streams(
    runs: Vec<RunHandle>,
    mut sink: impl FnMut(RunRecord) -> Result<(), DupeError>,
) -> Result<(), DupeError> {
    let mut cursors: Vec<Option<RunCursor>> = Vec::with_capacity(runs.len());
    let mut pending: Vec<Option<RunRecord>> = Vec::with_capacity(runs.len());
    let mut heap: BinaryHeap<std::cmp::Reverse<(Key, u32, u64, usize)>> =
        BinaryHeap::with_capacity(runs.len());

    for (slot, run) in runs.iter().enumerate() {
        let mut cursor = RunCursor::open(run)?;
        match cursor.next_record()? {
            Some(record) => {
                heap.push(std::cmp::Reverse((record.key, cursor.ordinal, cursor.pos, slot)));
                cursors.push(Some(cursor));
                pending.push(Some(record));
            }
            None => {
                // Empty run; nothing to merge, retire immediately.
                retire_cursor(cursor);
                cursors.push(None);
                pending.push(None);
            }
        }
    }

    while let Some(std::cmp::Reverse((_, _, _, slot))) = heap.pop() {
        let record = pending[slot].take().expect("heap entry without pending record");
        sink(record)?;

        let cursor = cursors[slot].as_mut().expect("heap entry without cursor");
        match cursor.next_record()? {
            Some(next) => {
                heap.push(std::cmp::Reverse((next.key, cursor.ordinal, cursor.pos, slot)));
                pending[slot] = Some(next);
            }
            None => {
                let cursor = cursors[slot].take().expect("cursor double-take");
                retire_cursor(cursor);
            }
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------
// Scratch directory
// ----------------------------------------------------------------------

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Owns the temp-directory namespace for one disk-mode run; removal on
/// drop covers success, fatal errors and interruption alike.
pub(crate) struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub(crate) fn create(base: Option<&Path>) -> Result<Self, DupeError> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let path = base.join(format!(
            "linedupe-{}-{}",
            std::process::id(),
            SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&path).map_err(|e| DupeError::ResourceExhaustion {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self { path })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => log::debug!("Scratch directory {} removed", self.path.display()),
            Err(e) if self.path.exists() => {
                log::warn!(
                    "Failed to remove scratch directory {}: {e}",
                    self.path.display()
                );
            }
            Err(_) => {}
        }
    }
}
