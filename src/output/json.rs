//! JSON output for scripting.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "summary": { "root": "/inbox", "processed": 12, "groups": 1, ... },
//!   "groups": [
//!     {
//!       "fingerprint": "af13...",
//!       "size": 1024,
//!       "files": ["/inbox/a.txt", "/inbox/b.txt"],
//!       "kept": ["/inbox/a.txt"],
//!       "discarded": ["/inbox/b.txt"],
//!       "cancelled": false
//!     }
//!   ],
//!   "exit_code": 0,
//!   "exit_code_name": "DS000"
//! }
//! ```

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::duplicates::RunSummary;
use crate::error::ExitCode;
use crate::session::{ReportGroup, RunReport};

/// One group in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// Hex fingerprint
    pub fingerprint: String,
    /// Member size in bytes
    pub size: u64,
    /// Members, original first
    pub files: Vec<PathBuf>,
    /// Members left in place
    pub kept: Vec<PathBuf>,
    /// Members moved to the duplicates directory
    pub discarded: Vec<PathBuf>,
    /// Whether the group was left untouched
    pub cancelled: bool,
}

impl From<&ReportGroup> for JsonGroup {
    fn from(group: &ReportGroup) -> Self {
        Self {
            fingerprint: group.fingerprint.clone(),
            size: group.size,
            files: group.files.clone(),
            kept: group.resolution.kept.clone(),
            discarded: group.resolution.discarded.clone(),
            cancelled: group.resolution.cancelled,
        }
    }
}

/// Top-level JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Run totals
    pub summary: RunSummary,
    /// Groups, when known
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<JsonGroup>,
    /// Process exit code
    pub exit_code: i32,
    /// Machine-readable exit code
    pub exit_code_name: String,
}

impl JsonOutput {
    /// Summary of a run that just finished.
    #[must_use]
    pub fn from_summary(summary: &RunSummary, exit_code: ExitCode) -> Self {
        Self {
            summary: summary.clone(),
            groups: Vec::new(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Summary and groups from a saved report.
    #[must_use]
    pub fn from_report(report: &RunReport, exit_code: ExitCode) -> Self {
        Self {
            groups: report.groups.iter().map(JsonGroup::from).collect(),
            ..Self::from_summary(&report.summary, exit_code)
        }
    }

    /// Compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write followed by a newline.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors from JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// Serialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing failed.
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
