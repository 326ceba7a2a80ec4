//! Human-readable run summaries.
//!
//! Colors come from yansi and vanish when it is disabled, so the rendered
//! strings are safe to pipe.

use std::fmt::Write as _;

use bytesize::ByteSize;
use yansi::Paint;

use crate::duplicates::RunSummary;
use crate::session::RunReport;

/// Render the closing summary of a run.
#[must_use]
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    let headline = if summary.interrupted {
        "Run interrupted".yellow().bold().to_string()
    } else {
        "Run complete".green().bold().to_string()
    };
    let _ = writeln!(out, "{} for {}", headline, summary.root.display());
    let _ = writeln!(
        out,
        "  Processed {} entries in {:.1}s ({} tracked, {} unique, {} unsupported)",
        summary.processed,
        summary.duration_secs,
        summary.tracked,
        summary.unique,
        summary.unsupported
    );
    if summary.archives_expanded > 0 || summary.archives_quarantined > 0 {
        let _ = writeln!(
            out,
            "  Archives: {} expanded, {} quarantined",
            summary.archives_expanded, summary.archives_quarantined
        );
    }

    if summary.has_duplicates() {
        let _ = writeln!(
            out,
            "  Duplicates: {} groups, {} files moved, {} reclaimed",
            summary.groups.cyan(),
            summary.files_moved.cyan(),
            summary.reclaimed_display().cyan()
        );
        if summary.groups_cancelled > 0 {
            let _ = writeln!(out, "  {} groups left untouched", summary.groups_cancelled);
        }
    } else {
        let _ = writeln!(out, "  No duplicates found");
    }

    if let Some(finalize) = &summary.finalize {
        if let Some(archive) = &finalize.archive {
            let _ = writeln!(
                out,
                "  Packaged {} files ({}) into {}",
                finalize.files_packaged,
                ByteSize(finalize.bytes_packaged),
                archive.display()
            );
        }
        if let Some(recycled) = &finalize.recycled_to {
            let _ = writeln!(out, "  Package recycled to {}", recycled.display());
        } else if finalize.recycled {
            let _ = writeln!(out, "  Package moved to the system trash");
        }
    }

    if let Some(path) = &summary.manifest_path {
        let _ = writeln!(out, "  Manifest: {}", path.display());
    }
    if let Some(path) = &summary.report_path {
        let _ = writeln!(out, "  Report: {}", path.display());
    }
    if summary.has_errors() {
        let location = summary
            .error_log_path
            .as_ref()
            .map(|p| format!(", see {}", p.display()))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {}{}",
            format!("{} errors", summary.errors).red().bold(),
            location
        );
    }
    out
}

/// Render a saved report: summary first, then every group.
#[must_use]
pub fn render_report(report: &RunReport) -> String {
    let mut out = render_summary(&report.summary);
    let _ = writeln!(
        out,
        "\nReport written {}",
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    for group in &report.groups {
        let _ = writeln!(
            out,
            "\nGroup {} ({} each, {})",
            group.id + 1,
            ByteSize(group.size),
            &group.fingerprint[..group.fingerprint.len().min(16)]
        );
        if group.resolution.cancelled {
            let _ = writeln!(out, "  {}", "left untouched".dim());
        }
        for path in &group.files {
            let marker = if group.resolution.discarded.contains(path) {
                "moved".red().to_string()
            } else {
                "kept ".green().to_string()
            };
            let _ = writeln!(out, "  [{}] {}", marker, path.display());
        }
    }
    out
}
