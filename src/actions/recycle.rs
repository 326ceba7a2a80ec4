//! Recoverable removal.
//!
//! Nothing the engine removes is permanently deleted. Expanded archives and
//! the final duplicates package go through a [`Recycler`], which is either
//! the platform trash (via the `trash` crate) or a plain holding directory.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::route::{move_file, unique_destination, RouteError};

/// Error type for recycle operations.
#[derive(Debug, Error)]
pub enum RecycleError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// File that could not be trashed
        path: PathBuf,
        /// Platform message
        message: String,
    },

    /// The holding directory could not be created.
    #[error("cannot create holding directory {path}: {source}")]
    HoldingDir {
        /// Holding directory
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Moving into the holding directory failed.
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Where removed files go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Recycler {
    /// The operating system's trash / recycle bin.
    #[default]
    SystemTrash,
    /// A directory the caller can restore from.
    Directory(PathBuf),
}

impl Recycler {
    /// Holding directory, if this recycler uses one.
    #[must_use]
    pub fn holding_dir(&self) -> Option<&Path> {
        match self {
            Self::SystemTrash => None,
            Self::Directory(dir) => Some(dir),
        }
    }

    /// Move `path` out of the way.
    ///
    /// Returns the new location when it is known (holding directory) and
    /// `None` for the system trash.
    ///
    /// # Errors
    ///
    /// Returns [`RecycleError`] if the file is missing or cannot be moved.
    pub fn recycle(&self, path: &Path) -> Result<Option<PathBuf>, RecycleError> {
        if std::fs::symlink_metadata(path).is_err() {
            return Err(RecycleError::NotFound(path.to_path_buf()));
        }

        match self {
            Self::SystemTrash => {
                trash::delete(path).map_err(|e| {
                    log::error!("Trash operation failed for {}: {}", path.display(), e);
                    RecycleError::TrashFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                })?;
                log::info!("Moved to trash: {}", path.display());
                Ok(None)
            }
            Self::Directory(dir) => {
                std::fs::create_dir_all(dir).map_err(|source| RecycleError::HoldingDir {
                    path: dir.clone(),
                    source,
                })?;
                let file_name = path
                    .file_name()
                    .ok_or_else(|| RouteError::NoFileName(path.to_path_buf()))?;
                let target = unique_destination(dir, file_name);
                move_file(path, &target)?;
                log::info!("Moved to holding area: {}", target.display());
                Ok(Some(target))
            }
        }
    }
}
