//! Moving and copying files into destination directories.
//!
//! Nothing is ever overwritten: when the target name is taken a numeric
//! suffix is appended (`photo.jpg`, `photo_1.jpg`, `photo_2.jpg`, ...).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a file reaches its destination.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Relocate the file; the source no longer exists afterwards.
    #[default]
    Move,
    /// Leave the source in place and write a copy.
    Copy,
}

impl std::fmt::Display for RoutingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

/// Error type for routing operations.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The source vanished before it could be routed.
    #[error("source not found: {0}")]
    NotFound(PathBuf),

    /// The source has no file name component.
    #[error("cannot route a path without a file name: {0}")]
    NoFileName(PathBuf),

    /// Copy, rename or removal failed.
    #[error("failed to route {from} to {to}: {source}")]
    Io {
        /// Source path
        from: PathBuf,
        /// Intended destination
        to: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl RouteError {
    /// Source path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::NoFileName(p) => p,
            Self::Io { from, .. } => from,
        }
    }
}

/// First free path for `file_name` inside `dir`.
#[must_use]
pub fn unique_destination(dir: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n: u64 = 1;
    loop {
        let candidate = dir.join(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Rename `from` to `to`, copying across filesystems when rename fails.
///
/// # Errors
///
/// Returns [`RouteError`] if neither the rename nor the copy fallback
/// succeeds. A partially written copy is removed.
pub fn move_file(from: &Path, to: &Path) -> Result<(), RouteError> {
    let io_err = |source| RouteError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && !from.exists() => {
            Err(RouteError::NotFound(from.to_path_buf()))
        }
        Err(rename_err) => {
            log::debug!(
                "Rename {} -> {} failed ({}), falling back to copy",
                from.display(),
                to.display(),
                rename_err
            );
            if let Err(e) = fs::copy(from, to) {
                let _ = fs::remove_file(to);
                return Err(io_err(e));
            }
            fs::remove_file(from).map_err(io_err)
        }
    }
}

/// Route `path` into `dest_dir` and return where it landed.
///
/// # Errors
///
/// Returns [`RouteError`] if the source is missing or the transfer fails.
pub fn route_file(path: &Path, dest_dir: &Path, mode: RoutingMode) -> Result<PathBuf, RouteError> {
    if fs::symlink_metadata(path).is_err() {
        return Err(RouteError::NotFound(path.to_path_buf()));
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| RouteError::NoFileName(path.to_path_buf()))?;
    let target = unique_destination(dest_dir, file_name);

    match mode {
        RoutingMode::Move => move_file(path, &target)?,
        RoutingMode::Copy => {
            fs::copy(path, &target).map_err(|source| RouteError::Io {
                from: path.to_path_buf(),
                to: target.clone(),
                source,
            })?;
        }
    }

    log::debug!("Routed ({mode}) {} -> {}", path.display(), target.display());
    Ok(target)
}
