//! Scanner module for tree traversal, classification and fingerprinting.
//!
//! This module provides:
//! - A depth-first, name-ordered walk that expands archives inline
//! - Extension and size policy ([`policy`])
//! - Streaming content fingerprints ([`hasher`])
//!
//! # Architecture
//!
//! - [`walker`]: traversal and per-entry classification
//! - [`hasher`]: fingerprinting with a selectable digest
//! - [`policy`]: the immutable per-run routing policy
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::scanner::{ClassifiedEntry, PolicyConfig, Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let policy = PolicyConfig::new("dupes", "unsupported");
//! let walker = Walker::new(Path::new("."), WalkerConfig::from_policy(&policy));
//! for entry in walker.walk() {
//!     if let ClassifiedEntry::Tracked(file) = entry {
//!         println!("{} {}", file.fingerprint, file.entry.path.display());
//!     }
//! }
//! ```

pub mod hasher;
pub mod policy;
pub mod walker;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub use hasher::{Fingerprint, HashAlgorithm, Hasher, CHUNK_SIZE};
pub use policy::{ExtensionFilter, PolicyConfig, PolicyError};
pub use walker::{count_files, ClassifiedEntry, Expansion, TrackedFile, Walker, WalkerConfig};

/// Metadata for a discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }

    /// Read size and mtime for `path` without following symlinks.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the metadata cannot be read.
    pub fn from_path(path: &Path) -> Result<Self, ScanError> {
        let metadata =
            std::fs::symlink_metadata(path).map_err(|e| ScanError::from_io(path, e))?;
        Ok(Self::new(
            path.to_path_buf(),
            metadata.len(),
            metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        ))
    }

    /// File name as a string, lossily converted.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Errors that can occur for a single entry while scanning.
///
/// These are per-entry failures: the walk logs them and continues.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Fingerprinting failed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(p) | Self::NotFound(p) | Self::NotADirectory(p) => p,
            Self::Io { path, .. } => path,
            Self::Hash(e) => e.path(),
        }
    }

    /// Whether this error came from a cancellation rather than the filesystem.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Hash(HashError::Interrupted(_)))
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Cancellation was observed while reading.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),
}

impl HashError {
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p) | Self::PermissionDenied(p) | Self::Interrupted(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}
