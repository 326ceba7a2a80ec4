//! Per-run state and the artifacts a run leaves behind.
//!
//! A [`RunSession`] is created by the worker at the start of a run and
//! dropped at its end. It owns everything that would otherwise be global:
//! the fingerprint table, progress counters, error log and tallies.
//!
//! * [`manifest`]: fingerprint to surviving-path manifest.
//! * [`errorlog`]: append-only failure log.
//! * [`report`]: checksummed JSON report of a finished run.

pub mod errorlog;
pub mod manifest;
pub mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duplicates::{Observation, SeenTable};
use crate::events::{EngineEvent, EventSender};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::scanner::TrackedFile;

pub use errorlog::{ErrorKind, ErrorLog};
pub use manifest::{ManifestEntry, RunManifest};
pub use report::{ReportGroup, RunReport, REPORT_VERSION};

/// Tallies kept while a run progresses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Entries classified, including archives and failures
    pub processed: u64,
    /// Files fingerprinted
    pub tracked: u64,
    /// Files routed to the unsupported directory
    pub unsupported: u64,
    /// Archives expanded in place
    pub archives_expanded: u64,
    /// Archives that failed to expand and were quarantined
    pub archives_quarantined: u64,
    /// Bytes written by archive expansion
    pub expanded_bytes: u64,
}

/// State for exactly one run.
#[derive(Debug)]
pub struct RunSession {
    root: PathBuf,
    table: SeenTable,
    progress: ProgressTracker,
    error_log: ErrorLog,
    counters: RunCounters,
    events: EventSender,
    surface_errors: bool,
}

impl RunSession {
    /// Start a session over `root` expecting `expected` entries.
    ///
    /// With `surface_errors` set, every logged failure is also sent to the
    /// front end as a user-facing error event.
    #[must_use]
    pub fn new(
        root: PathBuf,
        min_size: u64,
        expected: u64,
        error_log: ErrorLog,
        events: EventSender,
        surface_errors: bool,
    ) -> Self {
        Self {
            root,
            table: SeenTable::new(min_size),
            progress: ProgressTracker::new(expected),
            error_log,
            counters: RunCounters::default(),
            events,
            surface_errors,
        }
    }

    /// Canonical root of the run.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fingerprint table.
    #[must_use]
    pub fn table(&self) -> &SeenTable {
        &self.table
    }

    /// Feed a fingerprinted file into the table.
    pub fn observe(&mut self, file: &TrackedFile) -> Observation {
        self.counters.tracked += 1;
        self.table.observe(file)
    }

    /// Count one processed entry and publish the new progress.
    pub fn record_processed(&mut self) -> ProgressSnapshot {
        self.counters.processed += 1;
        let snapshot = self.progress.record_processed();
        self.events.send(EngineEvent::Progress(snapshot));
        snapshot
    }

    /// Grow the expected total after an expansion added entries.
    pub fn add_expected(&mut self, additional: u64) {
        self.progress.add_expected(additional);
    }

    /// Current progress counters.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Log a failure and, if configured, tell the user.
    pub fn report_error(&mut self, kind: ErrorKind, path: &Path, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.error_log.append(kind, path, message);
        self.events.error(
            format!("{}: {}", path.display(), message),
            self.surface_errors,
        );
    }

    /// Send a status line to the front end.
    pub fn status(&self, message: impl Into<String>) {
        self.events.status(message);
    }

    /// Tallies so far.
    #[must_use]
    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Mutable tallies.
    pub fn counters_mut(&mut self) -> &mut RunCounters {
        &mut self.counters
    }

    /// Failures logged so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.error_log.count()
    }

    /// Time since the session started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.progress.elapsed()
    }

    /// Event channel shared with the resolver.
    #[must_use]
    pub fn events(&self) -> &EventSender {
        &self.events
    }
}
