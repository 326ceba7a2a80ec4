//! Fingerprint to surviving-path manifest.
//!
//! One line per fingerprint, `<hex digest>\t<path>`. Files are opened in
//! append mode so repeated runs accumulate rather than overwrite.
//!
//! Paths are escaped so every entry stays on one line: backslash, tab,
//! newline and carriage return become `\\`, `\t`, `\n` and `\r`. On Unix
//! bytes that are not UTF-8 are written as `\xNN`; elsewhere such paths are
//! written lossily. A survivor inside the packaged duplicates archive is
//! written as `<zip path>!/<entry name>`.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Lowercase hex digest
    pub fingerprint: String,
    /// Where the surviving copy lives after the run
    pub path: PathBuf,
}

/// Append-only record of every fingerprint observed in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    entries: Vec<ManifestEntry>,
}

impl RunManifest {
    /// Empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, fingerprint: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.push(ManifestEntry {
            fingerprint: fingerprint.into(),
            path: path.into(),
        });
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Order-insensitive view for comparing runs.
    #[must_use]
    pub fn as_set(&self) -> BTreeSet<&ManifestEntry> {
        self.entries.iter().collect()
    }

    /// Append every entry to the file at `path`, creating it and its
    /// parent directories if needed.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            writeln!(writer, "{}\t{}", entry.fingerprint, escape_path(&entry.path))?;
        }
        writer.flush()
    }

    /// Parse a manifest file. Malformed lines are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Propagates open and read errors.
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut manifest = Self::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = line.split_once('\t').and_then(|(fp, p)| {
                let valid = !fp.is_empty() && fp.chars().all(|c| c.is_ascii_hexdigit());
                valid.then_some(fp).zip(unescape_path(p))
            });
            match parsed {
                Some((fp, p)) => manifest.push(fp, p),
                None => log::warn!(
                    "Skipping malformed manifest line {} in {}",
                    number + 1,
                    path.display()
                ),
            }
        }
        Ok(manifest)
    }
}

/// Escape a path for a single manifest line.
#[must_use]
pub fn escape_path(path: &Path) -> String {
    let mut out = String::new();
    for chunk in path_bytes(path).utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\t' => out.push_str("\\t"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                c => out.push(c),
            }
        }
        for byte in chunk.invalid() {
            out.push_str(&format!("\\x{byte:02x}"));
        }
    }
    out
}

/// Reverse [`escape_path`]. `None` when an escape sequence is malformed.
#[must_use]
pub fn unescape_path(text: &str) -> Option<PathBuf> {
    let mut bytes = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next()? {
            '\\' => bytes.push(b'\\'),
            't' => bytes.push(b'\t'),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                if hex.len() != 2 {
                    return None;
                }
                bytes.push(u8::from_str_radix(&hex, 16).ok()?);
            }
            _ => return None,
        }
    }
    Some(PathBuf::from(bytes_to_os(bytes)))
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    match path.to_string_lossy() {
        std::borrow::Cow::Borrowed(s) => std::borrow::Cow::Borrowed(s.as_bytes()),
        std::borrow::Cow::Owned(s) => std::borrow::Cow::Owned(s.into_bytes()),
    }
}

#[cfg(unix)]
fn bytes_to_os(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn bytes_to_os(bytes: Vec<u8>) -> OsString {
    OsString::from(String::from_utf8_lossy(&bytes).into_owned())
}
