//! Progress reporting utilities using indicatif.
//!
//! Engines report through the [`ProgressCallback`] trait; the [`Progress`]
//! implementation renders one bar per phase. Phases run strictly one at a
//! time (scan; count then extract; partition, sort then merge), so a
//! single active bar is enough.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress callback for duplicate-detection phases.
///
/// Implement this trait to receive progress updates during a run.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "count", "merge")
    /// * `total` - Total number of units in the phase (0 when unknown)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called as units complete.
    ///
    /// # Arguments
    ///
    /// * `current` - Current unit number (1-based)
    /// * `label` - Label of the unit being processed
    fn on_progress(&self, current: usize, label: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called with a free-form status message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter rendering an indicatif bar per phase.
pub struct Progress {
    active: Mutex<Option<(String, ProgressBar)>>,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            active: Mutex::new(None),
            quiet,
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} units")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = if total == 0 {
            let pb = ProgressBar::new_spinner();
            pb.set_style(Self::spinner_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(Self::bar_style());
            pb
        };
        pb.set_message(phase.to_string());
        let mut active = self.active.lock().unwrap();
        if let Some((_, old)) = active.take() {
            old.finish_and_clear();
        }
        *active = Some((phase.to_string(), pb));
    }

    fn on_progress(&self, current: usize, label: &str) {
        if self.quiet {
            return;
        }
        if let Some((_, pb)) = self.active.lock().unwrap().as_ref() {
            pb.set_position(current as u64);
            pb.set_message(truncate_label(label, 32));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        let mut active = self.active.lock().unwrap();
        if let Some((name, pb)) = active.take() {
            if name == phase {
                pb.finish_with_message(format!("{phase} complete"));
            } else {
                pb.finish_and_clear();
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Some((_, pb)) = self.active.lock().unwrap().as_ref() {
            pb.set_message(message.to_string());
        }
    }
}

/// Truncate a unit label for display in the progress bar.
fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() <= max_len {
        return label.to_string();
    }
    let tail: String = label
        .chars()
        .rev()
        .take(max_len.saturating_sub(3))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{tail}")
}
