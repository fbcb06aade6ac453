//! Input discovery and the ordered input set.
//!
//! Inputs are plain text files (`.csv` / `.txt`) found by a shallow scan of
//! the input directory. Files are ordered by size ascending (name as tie
//! break, so a rescan of the same directory is reproducible) and each gets
//! a stable numeric source id in that order. Everything downstream refers
//! to files by id; names are only resolved back for reporting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DupeError;

/// Index of an input file in discovery order.
pub type SourceId = u32;

/// One input file with its stable id.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Position in the ordered input set.
    pub id: SourceId,
    /// Full path on disk.
    pub path: PathBuf,
    /// File name used as the external identifier in reports and runs.
    pub name: String,
    /// Size in bytes at discovery time.
    pub size: u64,
}

/// The ordered set of input files for one run.
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    files: Vec<InputFile>,
}

impl InputSet {
    /// Discover processable files in `dir` (non-recursive).
    ///
    /// Only regular files with a `.csv` or `.txt` extension
    /// (case-insensitive) qualify. An unreadable directory is fatal; an
    /// unreadable entry inside it is skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`DupeError::InputAccess`] when `dir` is missing or not a
    /// directory.
    pub fn discover(dir: &Path) -> Result<Self, DupeError> {
        if !dir.is_dir() {
            return Err(DupeError::input_access(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "input directory not found"),
            ));
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable directory entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !has_processable_extension(path) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => candidates.push((path.to_path_buf(), meta.len())),
                Err(e) => log::warn!("Skipping {}: cannot stat: {e}", path.display()),
            }
        }

        // Size ascending; name tie break keeps rescans reproducible.
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        Ok(Self::assign_ids(candidates))
    }

    /// Build an input set from explicit paths, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`DupeError::InputAccess`] for a path that cannot be stat'd.
    pub fn from_paths(paths: Vec<PathBuf>) -> Result<Self, DupeError> {
        let mut candidates = Vec::with_capacity(paths.len());
        for path in paths {
            let size = std::fs::metadata(&path)
                .map_err(|e| DupeError::input_access(&path, e))?
                .len();
            candidates.push((path, size));
        }
        Ok(Self::assign_ids(candidates))
    }

    fn assign_ids(candidates: Vec<(PathBuf, u64)>) -> Self {
        let files = candidates
            .into_iter()
            .enumerate()
            .map(|(id, (path, size))| {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string_lossy().into_owned());
                InputFile {
                    id: id as SourceId,
                    path,
                    name,
                    size,
                }
            })
            .collect();
        Self { files }
    }

    /// The ordered files.
    #[must_use]
    pub fn files(&self) -> &[InputFile] {
        &self.files
    }

    /// Number of input files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all inputs in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Resolve a source id back to its file name.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this set.
    #[must_use]
    pub fn name_of(&self, id: SourceId) -> &str {
        &self.files[id as usize].name
    }

    /// Map file names back to their ids, for the disk-mode merge which
    /// reads names out of run files.
    #[must_use]
    pub fn ids_by_name(&self) -> HashMap<&str, SourceId> {
        self.files
            .iter()
            .map(|f| (f.name.as_str(), f.id))
            .collect()
    }
}

fn has_processable_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv") || e.eq_ignore_ascii_case("txt"))
}
