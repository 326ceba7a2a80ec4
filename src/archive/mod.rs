//! Container detection and expansion.
//!
//! # Overview
//!
//! A file is a container when its header carries a known archive signature.
//! Extension is only consulted for legacy formats whose signature can be
//! missing or damaged (`.tar`, `.rar`), and zip-based document formats such
//! as `.docx` are never treated as containers even though they start with a
//! zip header.
//!
//! Expansion itself lives in [`extract`]; packaging the duplicates folder
//! at the end of a run lives in [`pack`].

pub mod extract;
pub mod pack;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use extract::{Expander, ExpansionOutcome};
pub use pack::{package_directory, PackError, PackedArchive, PackedEntry};

/// Bytes read from the start of a file when sniffing its format.
pub const SNIFF_LEN: usize = 512;

/// Default expansion depth cap.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Default cumulative decompressed-size budget (32 GiB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 32 * 1024 * 1024 * 1024;

/// Zip containers that are really documents and stay leaf files.
pub const ZIP_BASED_DOCUMENTS: &[&str] = &[
    ".docx", ".xlsx", ".pptx", ".odt", ".ods", ".odp", ".epub", ".jar", ".apk",
];

const ZIP_SIGNATURES: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];
const SEVENZ_SIGNATURE: &[u8] = b"7z\xBC\xAF\x27\x1C";
const RAR_SIGNATURE: &[u8] = b"Rar!\x1A\x07";
const GZIP_SIGNATURE: &[u8] = b"\x1F\x8B";
const ZSTD_SIGNATURE: &[u8] = b"\x28\xB5\x2F\xFD";
const USTAR_OFFSET: usize = 257;

/// Container formats the expander can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// PKZIP
    Zip,
    /// POSIX / GNU tar
    Tar,
    /// gzip-compressed tar
    TarGz,
    /// zstd-compressed tar
    TarZst,
    /// 7-Zip
    SevenZ,
    /// RAR 4 / RAR 5
    Rar,
}

impl ArchiveFormat {
    /// File name suffixes conventionally used by this format.
    #[must_use]
    pub fn suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Zip => &[".zip"],
            Self::Tar => &[".tar"],
            Self::TarGz => &[".tar.gz", ".tgz"],
            Self::TarZst => &[".tar.zst", ".tzst"],
            Self::SevenZ => &[".7z"],
            Self::Rar => &[".rar"],
        }
    }

    /// Human-friendly name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::TarZst => "tar.zst",
            Self::SevenZ => "7z",
            Self::Rar => "rar",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

fn has_suffix(name: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|s| name.ends_with(s))
}

/// Decide the format from a file's leading bytes and its name.
///
/// Suffixes are compared case-insensitively. Returns `None` for anything
/// ambiguous.
#[must_use]
pub fn classify_header(header: &[u8], file_name: &str) -> Option<ArchiveFormat> {
    let lower_name = file_name.to_ascii_lowercase();
    let lower_name = lower_name.as_str();
    if ZIP_SIGNATURES.iter().any(|sig| header.starts_with(sig)) {
        if has_suffix(lower_name, ZIP_BASED_DOCUMENTS) {
            return None;
        }
        return Some(ArchiveFormat::Zip);
    }
    if header.starts_with(SEVENZ_SIGNATURE) {
        return Some(ArchiveFormat::SevenZ);
    }
    if header.starts_with(RAR_SIGNATURE) {
        return Some(ArchiveFormat::Rar);
    }
    if header.len() >= USTAR_OFFSET + 5 && &header[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar" {
        return Some(ArchiveFormat::Tar);
    }
    if header.starts_with(GZIP_SIGNATURE) && has_suffix(lower_name, ArchiveFormat::TarGz.suffixes())
    {
        return Some(ArchiveFormat::TarGz);
    }
    if header.starts_with(ZSTD_SIGNATURE)
        && has_suffix(lower_name, ArchiveFormat::TarZst.suffixes())
    {
        return Some(ArchiveFormat::TarZst);
    }

    // Legacy formats: old tar has no magic and a damaged RAR head should
    // still reach the decoder so it fails loudly.
    if lower_name.ends_with(".tar") {
        return Some(ArchiveFormat::Tar);
    }
    if lower_name.ends_with(".rar") {
        return Some(ArchiveFormat::Rar);
    }
    None
}

/// Read up to [`SNIFF_LEN`] bytes from the start of `path`.
///
/// # Errors
///
/// Propagates open and read errors.
pub fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Detect the container format of the file at `path`.
///
/// # Errors
///
/// Propagates I/O errors from reading the header.
pub fn detect_format(path: &Path) -> io::Result<Option<ArchiveFormat>> {
    let header = read_header(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(classify_header(&header, &name))
}

/// Whether `path` is an expandable container. Unreadable files are not.
#[must_use]
pub fn is_container(path: &Path) -> bool {
    matches!(detect_format(path), Ok(Some(_)))
}

/// A pending extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTask {
    /// Archive being expanded.
    pub archive: PathBuf,
    /// Sibling directory receiving the contents.
    pub dest_dir: PathBuf,
    /// Decoder to use.
    pub format: ArchiveFormat,
    /// Nesting level; archives found in the scanned tree are depth 1.
    pub depth: usize,
}

impl ArchiveTask {
    /// Build a task, deriving a free sibling directory from the archive name.
    #[must_use]
    pub fn new(archive: &Path, format: ArchiveFormat, depth: usize) -> Self {
        let parent = archive.parent().unwrap_or_else(|| Path::new("."));
        let base = expansion_dir_name(archive, format);
        Self {
            archive: archive.to_path_buf(),
            dest_dir: unique_dir(parent, &base),
            format,
            depth,
        }
    }
}

/// Directory name for an archive's contents: the file name minus its
/// archive suffix.
#[must_use]
pub fn expansion_dir_name(archive: &Path, format: ArchiveFormat) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_ascii_lowercase();

    let stripped = format
        .suffixes()
        .iter()
        .find(|s| lower.ends_with(*s))
        .map(|s| name[..name.len() - s.len()].to_string())
        .or_else(|| {
            archive
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| *s != name)
        })
        .unwrap_or_default();

    if stripped.is_empty() {
        format!("{name}_extracted")
    } else {
        stripped
    }
}

fn unique_dir(parent: &Path, base: &str) -> PathBuf {
    let candidate = parent.join(base);
    if !candidate.exists() {
        return candidate;
    }
    let mut n: u64 = 1;
    loop {
        let candidate = parent.join(format!("{base}_{n}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Hardening caps checked before and after each extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionLimits {
    /// Deepest nesting level that may be expanded; `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Cumulative bytes all expansions in a run may write; `None` is unbounded.
    pub max_total_bytes: Option<u64>,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_depth: Some(DEFAULT_MAX_DEPTH),
            max_total_bytes: Some(DEFAULT_MAX_TOTAL_BYTES),
        }
    }
}

impl ExpansionLimits {
    /// No caps at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_depth: None,
            max_total_bytes: None,
        }
    }
}

/// Why an archive could not be expanded.
///
/// Every variant is non-fatal to the run: the archive is quarantined and
/// the walk continues.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    /// The decoder rejected the data.
    #[error("corrupt {format} archive {path}: {reason}")]
    Corrupt {
        /// Archive path
        path: PathBuf,
        /// Format that was attempted
        format: ArchiveFormat,
        /// Decoder message
        reason: String,
    },

    /// Entries are encrypted and no password is available.
    #[error("password-protected archive: {0}")]
    Encrypted(PathBuf),

    /// No decoder matches the file.
    #[error("unknown archive format: {0}")]
    UnknownFormat(PathBuf),

    /// The archive sits deeper than the configured cap.
    #[error("nesting depth {depth} exceeds limit {limit}: {path}")]
    DepthExceeded {
        /// Archive path
        path: PathBuf,
        /// Depth of this archive
        depth: usize,
        /// Configured cap
        limit: usize,
    },

    /// Expanding would exceed the decompressed-size budget.
    #[error("expanding {path} needs {needed} bytes but only {remaining} remain in the budget")]
    BudgetExceeded {
        /// Archive path
        path: PathBuf,
        /// Declared or measured size
        needed: u64,
        /// Budget left before this archive
        remaining: u64,
    },

    /// Cancellation was observed mid-extraction.
    #[error("extraction cancelled: {0}")]
    Cancelled(PathBuf),

    /// Writing the extracted data failed.
    #[error("I/O error expanding {path}: {source}")]
    Io {
        /// Path being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    /// Archive or file the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Corrupt { path, .. }
            | Self::DepthExceeded { path, .. }
            | Self::BudgetExceeded { path, .. }
            | Self::Io { path, .. } => path,
            Self::Encrypted(p) | Self::UnknownFormat(p) | Self::Cancelled(p) => p,
        }
    }

    /// Whether the failure came from cancellation rather than the archive.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
