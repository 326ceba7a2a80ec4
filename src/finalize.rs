//! End-of-run packaging of the duplicates directory.
//!
//! After walking and resolution the [`Finalizer`] zips whatever sits in the
//! duplicates directory into a timestamped sibling archive, removes the
//! loose files, and recycles the archive so the user can still restore it.
//! Nothing here can fail a run: every problem is captured in the returned
//! [`FinalizeReport`].

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::actions::{unique_destination, Recycler};
use crate::archive::package_directory;

/// What the finalizer did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeReport {
    /// Archive written, at its location before recycling
    pub archive: Option<PathBuf>,
    /// Files packaged
    pub files_packaged: usize,
    /// Uncompressed bytes packaged
    pub bytes_packaged: u64,
    /// Where the archive went; `None` for the system trash or on failure
    pub recycled_to: Option<PathBuf>,
    /// Whether the archive left its original location
    pub recycled: bool,
    /// Nothing to package
    pub skipped: bool,
    /// Failures, in order
    pub errors: Vec<String>,
    /// Loose file to entry name, for files that now only exist in the archive
    #[serde(skip)]
    pub archived: HashMap<PathBuf, String>,
}

impl FinalizeReport {
    /// Whether every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// The archive as it stands after the run: the recycled copy when the
    /// recycler reports one, otherwise the path it was written to.
    #[must_use]
    pub fn final_archive(&self) -> Option<&Path> {
        self.recycled_to.as_deref().or(self.archive.as_deref())
    }

    /// Where a packaged file lives now, as `<archive>!/<entry name>`.
    ///
    /// `None` when `path` was not packaged or is still on disk.
    #[must_use]
    pub fn archived_location(&self, path: &Path) -> Option<PathBuf> {
        let name = self.archived.get(path)?;
        let archive = self.final_archive()?;
        Some(archive_member_path(archive, name))
    }
}

/// `<archive>!/<name>`, the notation used for files stored inside a zip.
#[must_use]
pub fn archive_member_path(archive: &Path, name: &str) -> PathBuf {
    let mut joined = OsString::from(archive.as_os_str());
    joined.push("!/");
    joined.push(name);
    PathBuf::from(joined)
}

/// Packages and recycles the duplicates directory.
#[derive(Debug, Clone, Default)]
pub struct Finalizer {
    recycler: Recycler,
}

impl Finalizer {
    /// Finalizer that sends the archive to `recycler`.
    #[must_use]
    pub fn new(recycler: Recycler) -> Self {
        Self { recycler }
    }

    /// Package, clear and recycle `duplicates_dir`.
    ///
    /// The directory itself is kept. If packaging fails the loose files are
    /// left in place; if recycling fails the archive is left beside the
    /// directory.
    pub fn finalize(&self, duplicates_dir: &Path) -> FinalizeReport {
        let mut report = FinalizeReport::default();

        if !has_files(duplicates_dir) {
            log::debug!("Nothing to package in {}", duplicates_dir.display());
            report.skipped = true;
            return report;
        }

        let output = archive_path(duplicates_dir);
        let packed = match package_directory(duplicates_dir, &output) {
            Ok(packed) => packed,
            Err(e) => {
                log::error!("Packaging {} failed: {}", duplicates_dir.display(), e);
                report.errors.push(e.to_string());
                return report;
            }
        };
        log::info!(
            "Packaged {} duplicate(s) into {}",
            packed.files.len(),
            packed.path.display()
        );
        report.archive = Some(packed.path.clone());
        report.files_packaged = packed.files.len();
        report.bytes_packaged = packed.bytes;

        for file in packed.files {
            match fs::remove_file(&file.source) {
                Ok(()) => {
                    report.archived.insert(file.source, file.name);
                }
                Err(e) => {
                    log::warn!("Cannot remove packaged file {}: {}", file.source.display(), e);
                    report.errors.push(format!("{}: {}", file.source.display(), e));
                }
            }
        }
        remove_empty_dirs(duplicates_dir);

        match self.recycler.recycle(&packed.path) {
            Ok(target) => {
                report.recycled = true;
                report.recycled_to = target;
            }
            Err(e) => {
                log::error!("Cannot recycle {}: {}", packed.path.display(), e);
                report.errors.push(e.to_string());
            }
        }
        report
    }
}

fn has_files(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .any(|e| e.file_type().is_file())
}

/// `<parent>/<dirname>-<YYYYmmdd-HHMMSS>.zip`, uniquified.
fn archive_path(duplicates_dir: &Path) -> PathBuf {
    let parent = duplicates_dir.parent().unwrap_or(duplicates_dir);
    let base = duplicates_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "duplicates".to_string());
    let name = format!("{}-{}.zip", base, Local::now().format("%Y%m%d-%H%M%S"));
    unique_destination(parent, std::ffi::OsStr::new(&name))
}

fn remove_empty_dirs(root: &Path) {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_dir() {
            // fails harmlessly when not empty
            let _ = fs::remove_dir(entry.path());
        }
    }
}
