//! Run report persistence.
//!
//! The report is a pretty-printed JSON envelope holding the run summary,
//! every duplicate group and the resolution applied to it. A SHA-256
//! checksum over the compact serialization of the report guards against
//! hand edits and truncation.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::duplicates::{DuplicateGroup, Resolution, RunSummary};

/// Current report format version.
pub const REPORT_VERSION: u32 = 1;

/// One duplicate group as recorded in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportGroup {
    /// Group id in discovery order
    pub id: usize,
    /// Hex fingerprint shared by every member
    pub fingerprint: String,
    /// Size of each member in bytes
    pub size: u64,
    /// Members, original first
    pub files: Vec<PathBuf>,
    /// What happened to the members
    pub resolution: Resolution,
}

impl ReportGroup {
    /// Pair a group with its resolution.
    #[must_use]
    pub fn new(group: &DuplicateGroup, resolution: Resolution) -> Self {
        Self {
            id: group.id,
            fingerprint: group.fingerprint.to_hex(),
            size: group.size,
            files: group.paths(),
            resolution,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Format version
    pub version: u32,
    /// When the report was written
    pub created_at: DateTime<Utc>,
    /// Counters and artifact paths
    pub summary: RunSummary,
    /// Duplicate groups with their resolutions
    pub groups: Vec<ReportGroup>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReportEnvelope {
    checksum: String,
    report: RunReport,
}

fn checksum_of(report: &RunReport) -> Result<String> {
    let compact =
        serde_json::to_string(report).context("Failed to serialize report for checksum")?;
    let mut hasher = Sha256::new();
    hasher.update(compact.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

impl RunReport {
    /// Build a report stamped with the current time.
    #[must_use]
    pub fn new(summary: RunSummary, groups: Vec<ReportGroup>) -> Self {
        Self {
            version: REPORT_VERSION,
            created_at: Utc::now(),
            summary,
            groups,
        }
    }

    /// Serialize inside a checksummed envelope.
    pub fn to_json(&self) -> Result<String> {
        let envelope = ReportEnvelope {
            checksum: checksum_of(self)?,
            report: self.clone(),
        };
        serde_json::to_string_pretty(&envelope).context("Failed to serialize report envelope")
    }

    /// Write the report to `path`, replacing any previous report.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create report directory: {}", parent.display())
            })?;
        }
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create report file: {}", path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write report to: {}", path.display()))?;
        Ok(())
    }

    /// Read a report back, verifying checksum and version.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read report file: {}", path.display()))?;
        let envelope: ReportEnvelope = serde_json::from_str(&content)
            .context("Failed to parse report envelope. The file might be corrupted.")?;

        if checksum_of(&envelope.report)? != envelope.checksum {
            anyhow::bail!("Report integrity check failed: checksum mismatch");
        }
        if envelope.report.version != REPORT_VERSION {
            anyhow::bail!(
                "Unsupported report version: {}. Current version is {}.",
                envelope.report.version,
                REPORT_VERSION
            );
        }
        Ok(envelope.report)
    }
}
