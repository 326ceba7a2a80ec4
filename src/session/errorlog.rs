//! Append-only error log.
//!
//! Each failure becomes one line:
//! `<rfc3339 timestamp>\t<kind>\t<path>\t<message>`.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Category of a logged failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Reading or stat-ing an entry failed.
    Io,
    /// An archive could not be expanded.
    Extract,
    /// A group was left untouched by the user.
    Cancelled,
    /// Moving or copying a file failed.
    Route,
    /// Packaging the duplicates folder failed.
    Finalize,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Io => "io",
            Self::Extract => "extract",
            Self::Cancelled => "cancelled",
            Self::Route => "route",
            Self::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Writer for the persisted error log.
///
/// Without a path, failures are only counted and sent to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    path: Option<PathBuf>,
    count: usize,
}

impl ErrorLog {
    /// Log to `path`, or nowhere if `None`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path, count: 0 }
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Record one failure.
    ///
    /// A failure to write the log itself is reported through `log::error!`
    /// and otherwise ignored.
    pub fn append(&mut self, kind: ErrorKind, path: &Path, message: &str) {
        self.count += 1;
        log::warn!("[{}] {}: {}", kind, path.display(), message);

        let Some(log_path) = &self.path else {
            return;
        };
        let line = format_line(kind, path, message);
        if let Err(e) = append_line(log_path, &line) {
            log::error!("Cannot write error log {}: {}", log_path.display(), e);
        }
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}

fn format_line(kind: ErrorKind, path: &Path, message: &str) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        kind,
        sanitize(&path.display().to_string()),
        sanitize(message)
    )
}

fn append_line(log_path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;
    writeln!(file, "{line}")
}
