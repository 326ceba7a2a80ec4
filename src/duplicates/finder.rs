//! Run orchestration.
//!
//! # Overview
//!
//! A [`DuplicateFinder`] executes one run on a single worker:
//!
//! 1. **Prepare** - validate the policy, create destinations, canonicalize the root
//! 2. **Count** - pre-count files in parallel to seed the progress total
//! 3. **Walk** - classify every entry, expanding archives inline; out-of-policy
//!    files and quarantined archives are routed to the unsupported directory,
//!    tracked files feed the [`SeenTable`](super::SeenTable)
//! 4. **Resolve** - decide every duplicate group and move discarded members
//!    into the duplicates directory (skipped when cancelled)
//! 5. **Finalize** - package and recycle the duplicates directory; this step
//!    also runs if the worker unwinds
//! 6. **Persist** - append the manifest, write the optional report, emit
//!    [`EngineEvent::Finished`]
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::duplicates::{DuplicateFinder, FinderConfig};
//! use dupesweep::events::EventSender;
//! use dupesweep::scanner::PolicyConfig;
//! use std::path::Path;
//!
//! let policy = PolicyConfig::new("/data/dups", "/data/unsupported");
//! let finder = DuplicateFinder::new(FinderConfig::new(policy));
//! let summary = finder.run(Path::new("/data/inbox"), &EventSender::disconnected()).unwrap();
//! println!("Moved {} duplicate(s)", summary.files_moved);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::actions::{route_file, Recycler, RoutingMode};
use crate::events::{EngineEvent, EventSender};
use crate::finalize::{FinalizeReport, Finalizer};
use crate::scanner::{
    count_files, ClassifiedEntry, PolicyConfig, PolicyError, Walker, WalkerConfig,
};
use crate::session::{ErrorKind, ErrorLog, ReportGroup, RunManifest, RunReport, RunSession};

use super::{DuplicateGroup, Resolution, Resolver};

/// Configuration for one run.
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Classification, destinations and resolution settings
    pub policy: PolicyConfig,
    /// Where expanded archives and the packaged duplicates go
    pub recycler: Recycler,
    /// Manifest file; appended at run end
    pub manifest_path: Option<PathBuf>,
    /// Error log file; appended per failure
    pub error_log_path: Option<PathBuf>,
    /// Optional checksummed JSON report
    pub report_path: Option<PathBuf>,
    /// Package and recycle the duplicates directory at the end
    pub package_duplicates: bool,
    /// Mark error events as user-facing
    pub surface_errors: bool,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl FinderConfig {
    /// Defaults around `policy`: system trash, no artifact files, packaging on.
    #[must_use]
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy,
            recycler: Recycler::default(),
            manifest_path: None,
            error_log_path: None,
            report_path: None,
            package_duplicates: true,
            surface_errors: false,
            shutdown_flag: None,
        }
    }

    /// Set the recycler.
    #[must_use]
    pub fn with_recycler(mut self, recycler: Recycler) -> Self {
        self.recycler = recycler;
        self
    }

    /// Set the manifest file.
    #[must_use]
    pub fn with_manifest_path(mut self, path: Option<PathBuf>) -> Self {
        self.manifest_path = path;
        self
    }

    /// Set the error log file.
    #[must_use]
    pub fn with_error_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.error_log_path = path;
        self
    }

    /// Set the report file.
    #[must_use]
    pub fn with_report_path(mut self, path: Option<PathBuf>) -> Self {
        self.report_path = path;
        self
    }

    /// Enable or disable end-of-run packaging.
    #[must_use]
    pub fn with_package_duplicates(mut self, enabled: bool) -> Self {
        self.package_duplicates = enabled;
        self
    }

    /// Surface errors to the user.
    #[must_use]
    pub fn with_surface_errors(mut self, enabled: bool) -> Self {
        self.surface_errors = enabled;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Check if shutdown has been requested.
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Canonical root
    pub root: PathBuf,
    /// Entries classified
    pub processed: u64,
    /// Files fingerprinted
    pub tracked: u64,
    /// Distinct fingerprints
    pub unique: u64,
    /// Files routed to the unsupported directory
    pub unsupported: u64,
    /// Archives expanded
    pub archives_expanded: u64,
    /// Archives quarantined
    pub archives_quarantined: u64,
    /// Duplicate groups found
    pub groups: usize,
    /// Files moved into the duplicates directory
    pub files_moved: u64,
    /// Groups left untouched
    pub groups_cancelled: usize,
    /// Bytes moved out of the tree
    pub bytes_reclaimed: u64,
    /// Failures logged
    pub errors: usize,
    /// Whether the run was cancelled
    pub interrupted: bool,
    /// Wall-clock time
    pub duration_secs: f64,
    /// Manifest written, if any
    pub manifest_path: Option<PathBuf>,
    /// Error log, if any
    pub error_log_path: Option<PathBuf>,
    /// Report written, if any
    pub report_path: Option<PathBuf>,
    /// What the finalizer did; `None` when packaging is disabled
    pub finalize: Option<FinalizeReport>,
}

impl RunSummary {
    /// Whether any duplicate group was found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.groups > 0
    }

    /// Whether any non-fatal failure was logged.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Reclaimed bytes as a human-readable string.
    #[must_use]
    pub fn reclaimed_display(&self) -> String {
        ByteSize::b(self.bytes_reclaimed).to_string()
    }
}

/// Errors that stop a run before it starts.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The policy or destinations are unusable.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The worker thread could not be started.
    #[error("Cannot start worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread panicked.
    #[error("Worker thread panicked")]
    WorkerPanicked,
}

/// A run executing on its own thread.
#[derive(Debug)]
pub struct RunHandle {
    /// Events from the worker; ends after [`EngineEvent::Finished`]
    pub events: Receiver<EngineEvent>,
    join: JoinHandle<Result<RunSummary, FinderError>>,
}

impl RunHandle {
    /// Wait for the worker.
    ///
    /// # Errors
    ///
    /// The worker's own error, or [`FinderError::WorkerPanicked`].
    pub fn join(self) -> Result<RunSummary, FinderError> {
        self.join.join().map_err(|_| FinderError::WorkerPanicked)?
    }
}

/// Runs the finalizer on drop unless it already ran.
struct FinalizeGuard {
    finalizer: Option<(Finalizer, PathBuf)>,
}

impl FinalizeGuard {
    fn new(enabled: bool, recycler: &Recycler, duplicates_dir: &Path) -> Self {
        Self {
            finalizer: enabled
                .then(|| (Finalizer::new(recycler.clone()), duplicates_dir.to_path_buf())),
        }
    }

    fn finish(mut self) -> Option<FinalizeReport> {
        self.finalizer
            .take()
            .map(|(finalizer, dir)| finalizer.finalize(&dir))
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if let Some((finalizer, dir)) = self.finalizer.take() {
            log::warn!("Run aborted; packaging {} anyway", dir.display());
            let report = finalizer.finalize(&dir);
            for error in &report.errors {
                log::error!("Finalize: {}", error);
            }
        }
    }
}

/// Runs the walk, resolution and cleanup for one root.
#[derive(Debug, Clone)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Run on a dedicated worker thread.
    ///
    /// Events, including interactive resolution requests, arrive on the
    /// returned handle's receiver.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Spawn`] if the thread cannot be started.
    pub fn spawn(self, root: PathBuf) -> Result<RunHandle, FinderError> {
        let (events, rx) = EventSender::channel();
        let join = std::thread::Builder::new()
            .name("dupesweep-worker".to_string())
            .spawn(move || self.run(&root, &events))
            .map_err(FinderError::Spawn)?;
        Ok(RunHandle { events: rx, join })
    }

    /// Run to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError::Policy`] when the policy is rejected; nothing
    /// on disk has been touched in that case. Every later failure is logged
    /// and counted in the summary instead.
    pub fn run(&self, root: &Path, events: &EventSender) -> Result<RunSummary, FinderError> {
        let mut policy = self.config.policy.clone();
        let root = policy.prepare(root)?;
        log::info!("Sweeping {}", root.display());

        let walker_config = WalkerConfig::from_policy(&policy);
        let mut excluded = walker_config.excluded_dirs.clone();
        excluded.extend(self.config.recycler.holding_dir().map(Path::to_path_buf));
        let expected = count_files(&root, policy.skip_hidden, &excluded);
        log::debug!("Expecting about {} entries", expected);

        let mut session = RunSession::new(
            root.clone(),
            policy.min_size,
            expected,
            ErrorLog::new(self.config.error_log_path.clone()),
            events.clone(),
            self.config.surface_errors,
        );
        let guard = FinalizeGuard::new(
            self.config.package_duplicates,
            &self.config.recycler,
            &policy.duplicates_dir,
        );

        self.walk(&root, &policy, walker_config, &mut session);

        let interrupted = self.config.is_shutdown_requested();
        let (resolutions, mut survivors, moved, reclaimed) = if interrupted {
            log::warn!("Run cancelled; skipping resolution");
            (Vec::new(), HashMap::new(), 0, 0)
        } else {
            self.resolve(&policy, &mut session)
        };

        let finalize = guard.finish();
        if let Some(report) = &finalize {
            for error in &report.errors {
                session.report_error(ErrorKind::Finalize, &policy.duplicates_dir, error);
            }
            // survivors that were packaged now only exist inside the zip
            for survivor in survivors.values_mut() {
                if let Some(location) = report.archived_location(survivor) {
                    *survivor = location;
                }
            }
        }

        let manifest = build_manifest(&session, &survivors);
        if let Some(path) = &self.config.manifest_path {
            match manifest.write_to(path) {
                Ok(()) => log::info!("Manifest: {} entries -> {}", manifest.len(), path.display()),
                Err(e) => session.report_error(ErrorKind::Io, path, e.to_string()),
            }
        }

        let counters = *session.counters();
        let table = session.table();
        let mut summary = RunSummary {
            root: root.clone(),
            processed: counters.processed,
            tracked: counters.tracked,
            unique: table.len() as u64,
            unsupported: counters.unsupported,
            archives_expanded: counters.archives_expanded,
            archives_quarantined: counters.archives_quarantined,
            groups: table.groups().len(),
            files_moved: moved,
            groups_cancelled: resolutions.iter().filter(|r| r.cancelled).count(),
            bytes_reclaimed: reclaimed,
            errors: 0,
            interrupted,
            duration_secs: 0.0,
            manifest_path: self.config.manifest_path.clone(),
            error_log_path: self.config.error_log_path.clone(),
            report_path: None,
            finalize,
        };

        if let Some(path) = &self.config.report_path {
            let groups = table
                .groups()
                .iter()
                .map(|group| {
                    let resolution = resolutions
                        .iter()
                        .find(|r| r.group_id == group.id)
                        .cloned()
                        .unwrap_or_else(|| Resolution::untouched(group));
                    ReportGroup::new(group, resolution)
                })
                .collect();
            summary.report_path = Some(path.clone());
            summary.errors = session.error_count();
            summary.duration_secs = session.elapsed().as_secs_f64();
            if let Err(e) = RunReport::new(summary.clone(), groups).save(path) {
                summary.report_path = None;
                session.report_error(ErrorKind::Io, path, format!("{e:#}"));
            }
        }

        summary.errors = session.error_count();
        summary.duration_secs = session.elapsed().as_secs_f64();
        log::info!(
            "Run finished: {} processed, {} group(s), {} moved, {} error(s)",
            summary.processed,
            summary.groups,
            summary.files_moved,
            summary.errors
        );
        events.send(EngineEvent::Finished(Box::new(summary.clone())));
        Ok(summary)
    }

    fn walk(
        &self,
        root: &Path,
        policy: &PolicyConfig,
        walker_config: WalkerConfig,
        session: &mut RunSession,
    ) {
        let mut walker = Walker::new(root, walker_config)
            .with_recycler(self.config.recycler.clone())
            .with_events(session.events().clone());
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }

        let mut walk = walker.walk();
        for entry in walk.by_ref() {
            match entry {
                ClassifiedEntry::Tracked(file) => {
                    session.observe(&file);
                }
                ClassifiedEntry::OutOfPolicy(entry) => {
                    route_unsupported(session, policy, &entry.path);
                }
                ClassifiedEntry::Expanded(expansion) => {
                    let counters = session.counters_mut();
                    counters.archives_expanded += 1;
                    counters.expanded_bytes += expansion.bytes_written;

                    let added = count_files(&expansion.dest_dir, policy.skip_hidden, &[]);
                    session.add_expected(added);
                    if let Some(error) = &expansion.recycle_error {
                        session.report_error(
                            ErrorKind::Io,
                            &expansion.archive,
                            format!("expanded but not recycled: {error}"),
                        );
                    }
                }
                ClassifiedEntry::Quarantined { archive, error } => {
                    if error.is_cancelled() {
                        log::debug!("Expansion of {} cancelled", archive.path.display());
                    } else {
                        session.counters_mut().archives_quarantined += 1;
                        session.report_error(ErrorKind::Extract, &archive.path, error.to_string());
                        route_unsupported(session, policy, &archive.path);
                    }
                }
                ClassifiedEntry::Failed(error) => {
                    if !error.is_interrupted() {
                        session.report_error(ErrorKind::Io, error.path(), error.to_string());
                    }
                }
            }
            session.record_processed();
        }
        log::debug!("Walk done, {} bytes expanded", walk.expanded_bytes());
    }

    /// Decide every group and move discarded members.
    ///
    /// Returns resolutions, surviving paths of relocated originals, files
    /// moved and bytes reclaimed.
    fn resolve(
        &self,
        policy: &PolicyConfig,
        session: &mut RunSession,
    ) -> (Vec<Resolution>, HashMap<PathBuf, PathBuf>, u64, u64) {
        let groups: Vec<DuplicateGroup> = session.table().groups().to_vec();
        let resolver = Resolver::new(policy.resolution, policy.criterion, session.events().clone());

        let mut resolutions = Vec::with_capacity(groups.len());
        let mut survivors = HashMap::new();
        let mut moved = 0;
        let mut reclaimed = 0;

        for group in &groups {
            if self.config.is_shutdown_requested() {
                log::warn!("Cancelled during resolution; remaining groups untouched");
                resolutions.push(Resolution::untouched(group));
                continue;
            }

            session.status(format!(
                "resolving group {} of {}",
                group.id + 1,
                groups.len()
            ));
            let resolution = resolver.resolve(group);
            if resolution.cancelled {
                session.report_error(
                    ErrorKind::Cancelled,
                    &group.original().path,
                    format!("group {} left untouched", group.id),
                );
                resolutions.push(resolution);
                continue;
            }

            let mut relocated = HashMap::new();
            for path in &resolution.discarded {
                match route_file(path, &policy.duplicates_dir, RoutingMode::Move) {
                    Ok(target) => {
                        moved += 1;
                        reclaimed += group.size;
                        relocated.insert(path.clone(), target);
                    }
                    Err(e) => session.report_error(ErrorKind::Route, path, e.to_string()),
                }
            }

            let original = &group.original().path;
            if let Some(new_home) = relocated.get(original) {
                let survivor = resolution.kept.first().unwrap_or(new_home);
                survivors.insert(original.clone(), survivor.clone());
            }
            resolutions.push(resolution);
        }

        (resolutions, survivors, moved, reclaimed)
    }
}

fn route_unsupported(session: &mut RunSession, policy: &PolicyConfig, path: &Path) {
    match route_file(path, &policy.unsupported_dir, policy.unsupported_routing) {
        Ok(target) => {
            log::debug!("Unsupported: {} -> {}", path.display(), target.display());
            session.counters_mut().unsupported += 1;
        }
        Err(e) => session.report_error(ErrorKind::Route, path, e.to_string()),
    }
}

fn build_manifest(session: &RunSession, survivors: &HashMap<PathBuf, PathBuf>) -> RunManifest {
    let mut manifest = RunManifest::new();
    for (fingerprint, original) in session.table().entries() {
        let survivor = survivors.get(original).map_or(original, PathBuf::as_path);
        manifest.push(fingerprint.to_hex(), survivor);
    }
    manifest
}
