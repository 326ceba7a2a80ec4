//! Depth-first tree walker with inline archive expansion.
//!
//! # Overview
//!
//! [`Walker::walk`] returns a lazy [`Walk`] iterator of [`ClassifiedEntry`]
//! values. Directory entries are visited in file-name order so runs are
//! deterministic and first-seen-wins is reproducible. Each file is handled
//! in this order of precedence:
//!
//! 1. A container is expanded into a sibling directory, which is walked
//!    right away, before the archive's remaining siblings.
//! 2. A file passing the extension allow-list is fingerprinted (*tracked*).
//! 3. Anything else is *out-of-policy* and left for the caller to route.
//!
//! Failures are per entry: they are yielded as values and the walk goes on.
//!
//! A walk is not restartable; calling [`Walker::walk`] again starts over.
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::scanner::{ClassifiedEntry, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Downloads"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         ClassifiedEntry::Tracked(file) => println!("{}", file.entry.path.display()),
//!         ClassifiedEntry::Failed(e) => eprintln!("Warning: {e}"),
//!         _ => {}
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::actions::Recycler;
use crate::archive::{self, ArchiveFormat, ArchiveTask, Expander, ExpansionLimits, ExtractError};
use crate::events::EventSender;

use super::{
    ExtensionFilter, FileEntry, Fingerprint, HashAlgorithm, Hasher, PolicyConfig, ScanError,
};

/// Walk settings derived from the run policy.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Allow-list; `None` tracks every file.
    pub extensions: Option<ExtensionFilter>,
    /// Expand containers before classifying.
    pub expand_archives: bool,
    /// Depth and size caps for expansion.
    pub limits: ExpansionLimits,
    /// Digest used for tracked files.
    pub hash_algorithm: HashAlgorithm,
    /// Skip dot-files and dot-directories.
    pub skip_hidden: bool,
    /// Gitignore-style patterns.
    pub ignore_patterns: Vec<String>,
    /// Directories never entered (destinations, holding area).
    pub excluded_dirs: Vec<PathBuf>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            extensions: None,
            expand_archives: true,
            limits: ExpansionLimits::default(),
            hash_algorithm: HashAlgorithm::default(),
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            excluded_dirs: Vec::new(),
        }
    }
}

impl WalkerConfig {
    /// Copy the walk-relevant parts of a policy; destinations become exclusions.
    #[must_use]
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self {
            extensions: policy.extensions.clone(),
            expand_archives: policy.expand_archives,
            limits: policy.limits,
            hash_algorithm: policy.hash_algorithm,
            skip_hidden: policy.skip_hidden,
            ignore_patterns: policy.ignore_patterns.clone(),
            excluded_dirs: vec![policy.duplicates_dir.clone(), policy.unsupported_dir.clone()],
        }
    }

    /// Add another directory to skip.
    #[must_use]
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded_dirs.push(dir.into());
        self
    }

    fn is_tracked(&self, path: &Path) -> bool {
        self.extensions.as_ref().is_none_or(|f| f.matches(path))
    }
}

/// A tracked file and its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Path, size and mtime
    pub entry: FileEntry,
    /// Content digest
    pub fingerprint: Fingerprint,
}

/// A container that was expanded in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// Original archive path
    pub archive: PathBuf,
    /// Decoder used
    pub format: ArchiveFormat,
    /// Directory that now holds the contents
    pub dest_dir: PathBuf,
    /// Nesting level (1 for archives found directly in the tree)
    pub depth: usize,
    /// Bytes written to `dest_dir`
    pub bytes_written: u64,
    /// Where the archive was recycled to, when known
    pub recycled_to: Option<PathBuf>,
    /// Set when the archive could not be recycled
    pub recycle_error: Option<String>,
}

/// Outcome of visiting one file.
#[derive(Debug)]
pub enum ClassifiedEntry {
    /// Hash-eligible file, fingerprinted.
    Tracked(TrackedFile),
    /// Fails the extension policy; never hashed.
    OutOfPolicy(FileEntry),
    /// Container expanded; its contents follow in the walk.
    Expanded(Expansion),
    /// Container that could not be expanded.
    Quarantined {
        /// The archive, still at its original path
        archive: FileEntry,
        /// Why expansion failed
        error: ExtractError,
    },
    /// Per-entry failure.
    Failed(ScanError),
}

/// Tree walker for one root.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    recycler: Recycler,
    events: EventSender,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given root.
    #[must_use]
    pub fn new(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
            recycler: Recycler::default(),
            events: EventSender::disconnected(),
            shutdown_flag: None,
        }
    }

    /// Where expanded archives are recycled to.
    #[must_use]
    pub fn with_recycler(mut self, recycler: Recycler) -> Self {
        self.recycler = recycler;
        self
    }

    /// Receive "currently extracting" status events.
    #[must_use]
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is raised the walk ends at the next entry and any
    /// in-flight hash or extraction is abandoned.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Build gitignore matcher from config patterns.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }
        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Start a fresh walk.
    #[must_use]
    pub fn walk(self) -> Walk {
        let gitignore = self.build_gitignore();
        let mut hasher = Hasher::new(self.config.hash_algorithm);
        let mut expander = Expander::new(self.config.limits, self.recycler.clone());
        if let Some(flag) = &self.shutdown_flag {
            hasher = hasher.with_cancel_flag(Arc::clone(flag));
            expander = expander.with_cancel_flag(Arc::clone(flag));
        }

        let mut excluded_dirs = self.config.excluded_dirs.clone();
        if let Some(holding) = self.recycler.holding_dir() {
            excluded_dirs.push(holding.to_path_buf());
        }

        let root_frame = Frame {
            iter: directory_iter(&self.root),
            archive_depth: 0,
        };

        Walk {
            config: self.config,
            excluded_dirs,
            gitignore,
            hasher,
            expander,
            events: self.events,
            shutdown_flag: self.shutdown_flag,
            stack: vec![root_frame],
        }
    }
}

fn directory_iter(dir: &Path) -> walkdir::IntoIter {
    walkdir::WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
}

struct Frame {
    iter: walkdir::IntoIter,
    archive_depth: usize,
}

/// Lazy, finite sequence of classified entries.
pub struct Walk {
    config: WalkerConfig,
    excluded_dirs: Vec<PathBuf>,
    gitignore: Option<Gitignore>,
    hasher: Hasher,
    expander: Expander,
    events: EventSender,
    shutdown_flag: Option<Arc<AtomicBool>>,
    stack: Vec<Frame>,
}

impl std::fmt::Debug for Walk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Walk")
            .field("pending_frames", &self.stack.len())
            .field("expanded_bytes", &self.expander.consumed())
            .finish_non_exhaustive()
    }
}

impl Walk {
    /// Bytes written by archive expansion so far.
    #[must_use]
    pub fn expanded_bytes(&self) -> u64 {
        self.expander.consumed()
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excluded_dirs.iter().any(|dir| path.starts_with(dir))
    }

    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.gitignore
            .as_ref()
            .is_some_and(|gi| gi.matched(path, is_dir).is_ignore())
    }

    fn classify(&mut self, path: PathBuf, archive_depth: usize) -> ClassifiedEntry {
        if self.config.expand_archives {
            match archive::detect_format(&path) {
                Ok(Some(format)) => return self.expand(path, format, archive_depth + 1),
                Ok(None) => {}
                Err(e) => return ClassifiedEntry::Failed(ScanError::from_io(&path, e)),
            }
        }

        let entry = match FileEntry::from_path(&path) {
            Ok(entry) => entry,
            Err(e) => return ClassifiedEntry::Failed(e),
        };

        if !self.config.is_tracked(&path) {
            log::trace!("Out of policy: {}", path.display());
            return ClassifiedEntry::OutOfPolicy(entry);
        }

        match self.hasher.fingerprint(&path) {
            Ok(fingerprint) => ClassifiedEntry::Tracked(TrackedFile { entry, fingerprint }),
            Err(e) => ClassifiedEntry::Failed(e.into()),
        }
    }

    fn expand(&mut self, path: PathBuf, format: ArchiveFormat, depth: usize) -> ClassifiedEntry {
        let archive_entry = match FileEntry::from_path(&path) {
            Ok(entry) => entry,
            Err(e) => return ClassifiedEntry::Failed(e),
        };
        let name = archive_entry.file_name();
        self.events.status(format!("currently extracting: {name}"));

        let task = ArchiveTask::new(&path, format, depth);
        match self.expander.expand(&task) {
            Ok(outcome) => {
                log::info!(
                    "Expanded {} ({}, {} bytes)",
                    path.display(),
                    format,
                    outcome.bytes_written
                );
                self.stack.push(Frame {
                    iter: directory_iter(&outcome.dest_dir),
                    archive_depth: depth,
                });
                ClassifiedEntry::Expanded(Expansion {
                    archive: path,
                    format,
                    dest_dir: outcome.dest_dir,
                    depth,
                    bytes_written: outcome.bytes_written,
                    recycled_to: outcome.recycled_to,
                    recycle_error: outcome.recycle_error,
                })
            }
            Err(error) => {
                log::warn!("Cannot expand {}: {}", path.display(), error);
                ClassifiedEntry::Quarantined {
                    archive: archive_entry,
                    error,
                }
            }
        }
    }
}

impl Iterator for Walk {
    type Item = ClassifiedEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                self.stack.clear();
                return None;
            }

            let frame = self.stack.last_mut()?;
            let archive_depth = frame.archive_depth;
            let entry = match frame.iter.next() {
                None => {
                    self.stack.pop();
                    continue;
                }
                Some(Err(e)) => {
                    let path = e
                        .path()
                        .map_or_else(PathBuf::new, std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    let scan_error = match e.into_io_error() {
                        Some(io) => ScanError::from_io(&path, io),
                        None => ScanError::Io {
                            path,
                            source: std::io::Error::other("filesystem loop detected"),
                        },
                    };
                    return Some(ClassifiedEntry::Failed(scan_error));
                }
                Some(Ok(entry)) => entry,
            };

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            let is_dir = file_type.is_dir();
            let path = entry.path();

            let hidden = self.config.skip_hidden
                && entry.file_name().to_string_lossy().starts_with('.');
            if self.is_excluded(path) || hidden || self.is_ignored(path, is_dir) {
                log::trace!("Skipping: {}", path.display());
                if is_dir {
                    if let Some(frame) = self.stack.last_mut() {
                        frame.iter.skip_current_dir();
                    }
                }
                continue;
            }

            if is_dir {
                continue;
            }
            if file_type.is_symlink() {
                log::trace!("Skipping symlink: {}", path.display());
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let path = entry.into_path();
            return Some(self.classify(path, archive_depth));
        }
    }
}

/// Count regular files under `root` in parallel, skipping `excluded` dirs.
///
/// Used to seed the progress total; the figure is an estimate since ignore
/// patterns are not applied and archives are counted as single files.
#[must_use]
pub fn count_files(root: &Path, skip_hidden: bool, excluded: &[PathBuf]) -> u64 {
    let excluded: Arc<Vec<PathBuf>> = Arc::new(excluded.to_vec());
    jwalk::WalkDir::new(root)
        .skip_hidden(skip_hidden)
        .follow_links(false)
        .process_read_dir(move |_depth, _path, _state, children| {
            children.retain(|child| {
                child
                    .as_ref()
                    .map_or(true, |e| !excluded.iter().any(|x| e.path().starts_with(x)))
            });
        })
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count() as u64
}
