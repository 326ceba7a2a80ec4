//! First-seen-wins fingerprint table and duplicate groups.
//!
//! # Overview
//!
//! Every tracked file is fed to [`SeenTable::observe`] in walk order. The
//! first path seen for a fingerprint becomes its *original*; a later path
//! with the same fingerprint and size joins (or creates) that
//! fingerprint's [`DuplicateGroup`]. Per fingerprint the table moves through
//! [`SeenState::Unseen`], [`SeenState::SeenOnce`] and
//! [`SeenState::SeenMultiple`], never backwards.
//!
//! Files under the size threshold are recorded as originals when they are
//! first, but never promoted into a group.
//!
//! # Example
//!
//! ```
//! use dupesweep::duplicates::{Observation, SeenTable};
//! use dupesweep::scanner::{FileEntry, HashAlgorithm, Hasher, TrackedFile};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let fp = Hasher::new(HashAlgorithm::Blake3).fingerprint_bytes(b"X");
//! let file = |p: &str| TrackedFile {
//!     entry: FileEntry::new(PathBuf::from(p), 1, SystemTime::now()),
//!     fingerprint: fp.clone(),
//! };
//!
//! let mut table = SeenTable::new(0);
//! assert_eq!(table.observe(&file("/a.txt")), Observation::FirstSeen);
//! assert_eq!(table.observe(&file("/b.txt")), Observation::Duplicate { group_id: 0 });
//! assert_eq!(table.groups()[0].files.len(), 2);
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::scanner::{FileEntry, Fingerprint, TrackedFile};

/// Per-fingerprint lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenState {
    /// Never observed.
    Unseen,
    /// Observed once; the path is the original.
    SeenOnce,
    /// At least one duplicate joined the original.
    SeenMultiple,
}

/// What [`SeenTable::observe`] did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First file with this fingerprint.
    FirstSeen,
    /// Appended to a duplicate group.
    Duplicate {
        /// Group the file joined
        group_id: usize,
    },
    /// Matching fingerprint, but the file is below the size threshold.
    Exempt,
    /// Matching fingerprint with a different size. Never grouped.
    SizeMismatch,
}

/// An ordered set of files sharing one fingerprint, original first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Position of this group in discovery order
    pub id: usize,
    /// Content fingerprint shared by every member
    pub fingerprint: Fingerprint,
    /// Size shared by every member
    pub size: u64,
    /// Original first, then duplicates in walk order
    pub files: Vec<FileEntry>,
}

impl DuplicateGroup {
    /// The first-seen member.
    #[must_use]
    pub fn original(&self) -> &FileEntry {
        &self.files[0]
    }

    /// Members after the original.
    #[must_use]
    pub fn duplicates(&self) -> &[FileEntry] {
        &self.files[1..]
    }

    /// Member paths in group order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Groups always hold at least two files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Bytes used by every copy except one.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * (self.files.len() as u64).saturating_sub(1)
    }
}

#[derive(Debug, Clone)]
struct SeenRecord {
    original: FileEntry,
    group: Option<usize>,
}

/// Fingerprint table for one run.
#[derive(Debug, Clone, Default)]
pub struct SeenTable {
    min_size: u64,
    records: HashMap<Fingerprint, SeenRecord>,
    order: Vec<Fingerprint>,
    groups: Vec<DuplicateGroup>,
}

impl SeenTable {
    /// Empty table; files smaller than `min_size` are never grouped.
    #[must_use]
    pub fn new(min_size: u64) -> Self {
        Self {
            min_size,
            ..Self::default()
        }
    }

    /// Record a tracked file.
    pub fn observe(&mut self, file: &TrackedFile) -> Observation {
        let Some(record) = self.records.get_mut(&file.fingerprint) else {
            self.records.insert(
                file.fingerprint.clone(),
                SeenRecord {
                    original: file.entry.clone(),
                    group: None,
                },
            );
            self.order.push(file.fingerprint.clone());
            return Observation::FirstSeen;
        };

        if file.entry.size < self.min_size {
            log::trace!("Below threshold, not grouped: {}", file.entry.path.display());
            return Observation::Exempt;
        }
        if file.entry.size != record.original.size {
            log::warn!(
                "Fingerprint collision with different sizes: {} ({} bytes) vs {} ({} bytes)",
                record.original.path.display(),
                record.original.size,
                file.entry.path.display(),
                file.entry.size
            );
            return Observation::SizeMismatch;
        }

        let group_id = match record.group {
            Some(id) => {
                self.groups[id].files.push(file.entry.clone());
                id
            }
            None => {
                let id = self.groups.len();
                self.groups.push(DuplicateGroup {
                    id,
                    fingerprint: file.fingerprint.clone(),
                    size: file.entry.size,
                    files: vec![record.original.clone(), file.entry.clone()],
                });
                record.group = Some(id);
                id
            }
        };
        log::debug!(
            "Duplicate of {}: {}",
            record.original.path.display(),
            file.entry.path.display()
        );
        Observation::Duplicate { group_id }
    }

    /// Lifecycle state of `fingerprint`.
    #[must_use]
    pub fn state(&self, fingerprint: &Fingerprint) -> SeenState {
        match self.records.get(fingerprint) {
            None => SeenState::Unseen,
            Some(SeenRecord { group: None, .. }) => SeenState::SeenOnce,
            Some(SeenRecord { group: Some(_), .. }) => SeenState::SeenMultiple,
        }
    }

    /// The original path recorded for `fingerprint`.
    #[must_use]
    pub fn original(&self, fingerprint: &Fingerprint) -> Option<&Path> {
        self.records.get(fingerprint).map(|r| r.original.path.as_path())
    }

    /// Every fingerprint with its original path, in first-seen order.
    pub fn entries(&self) -> impl Iterator<Item = (&Fingerprint, &Path)> + '_ {
        self.order.iter().filter_map(|fp| {
            self.records
                .get(fp)
                .map(|r| (fp, r.original.path.as_path()))
        })
    }

    /// Duplicate groups in creation order.
    #[must_use]
    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    /// Number of distinct fingerprints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
