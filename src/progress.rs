//! Progress counters and terminal rendering.
//!
//! [`ProgressTracker`] is the engine-side counter owned by a run session. It
//! produces [`ProgressSnapshot`] values that travel to the front end as
//! events, where a [`ProgressRenderer`] draws them with indicatif.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Counters at one moment of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Entries processed so far
    pub processed: u64,
    /// Entries expected in total; grows when archives are expanded
    pub total: u64,
    /// Seconds since the run started
    pub elapsed_secs: f64,
    /// Estimated seconds remaining; zero when nothing is processed yet
    pub eta_secs: f64,
}

/// Remaining time from `elapsed * (total / processed) - elapsed`.
///
/// Returns zero when `processed` is zero or the estimate would be negative.
#[must_use]
pub fn estimate_remaining(elapsed_secs: f64, processed: u64, total: u64) -> f64 {
    if processed == 0 {
        return 0.0;
    }
    let projected = elapsed_secs * (total as f64 / processed as f64);
    (projected - elapsed_secs).max(0.0)
}

/// Running counters for one run.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    started: Instant,
    processed: u64,
    total: u64,
}

impl ProgressTracker {
    /// Start the clock with an initial expected total.
    #[must_use]
    pub fn new(total: u64) -> Self {
        Self {
            started: Instant::now(),
            processed: 0,
            total,
        }
    }

    /// Grow the expected total, e.g. after an archive expanded.
    pub fn add_expected(&mut self, additional: u64) {
        self.total = self.total.saturating_add(additional);
    }

    /// Count one processed entry and return the new snapshot.
    pub fn record_processed(&mut self) -> ProgressSnapshot {
        self.processed += 1;
        self.total = self.total.max(self.processed);
        self.snapshot()
    }

    /// Entries processed so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Entries expected in total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Time since [`ProgressTracker::new`].
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed_secs = self.elapsed().as_secs_f64();
        ProgressSnapshot {
            processed: self.processed,
            total: self.total,
            elapsed_secs,
            eta_secs: estimate_remaining(elapsed_secs, self.processed, self.total),
        }
    }
}

/// Terminal progress bar fed by [`ProgressSnapshot`]s.
pub struct ProgressRenderer {
    bar: Option<ProgressBar>,
}

impl ProgressRenderer {
    /// Create a renderer; `quiet` draws nothing.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        if quiet {
            return Self { bar: None };
        }
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-"),
        );
        Self { bar: Some(bar) }
    }

    /// Apply new counters.
    pub fn update(&self, snapshot: &ProgressSnapshot) {
        if let Some(bar) = &self.bar {
            bar.set_length(snapshot.total);
            bar.set_position(snapshot.processed);
            if snapshot.processed > 0 {
                bar.set_message(format!("ETA {}s", snapshot.eta_secs.round() as u64));
            }
        }
    }

    /// Show a status line above the bar.
    pub fn status(&self, message: &str) {
        match &self.bar {
            Some(bar) => bar.set_message(truncate_path(message, 60)),
            None => log::debug!("{}", message),
        }
    }

    /// Hide the bar while `f` writes to the terminal.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }

    /// Remove the bar.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Truncate a status line, keeping the file name where possible.
fn truncate_path(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let file_name = std::path::Path::new(text)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let chars: Vec<char> = file_name.chars().collect();
    if chars.len() + 4 >= max_len {
        let tail: String = chars[chars.len().saturating_sub(max_len - 3)..].iter().collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
