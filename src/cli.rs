//! Command-line interface definitions.
//!
//! # Example
//!
//! ```bash
//! # Sweep a folder, moving duplicates and unsupported files aside
//! dupesweep run ~/Inbox --duplicates ~/Sorted/dups --unsupported ~/Sorted/other
//!
//! # Only track photos, decide every group by hand
//! dupesweep run ~/Inbox --media --interactive
//!
//! # Print the effective configuration
//! dupesweep config
//!
//! # Inspect a saved report as JSON
//! dupesweep report ~/sweep-report.json --output json
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::actions::RoutingMode;
use crate::duplicates::{DuplicateCriterion, ResolutionMode};
use crate::scanner::policy::MEDIA_EXTENSIONS;
use crate::scanner::HashAlgorithm;

/// Archive-aware duplicate sweeper.
#[derive(Debug, Parser)]
#[command(name = "dupesweep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deduplicate and classify a directory tree
    Run(RunArgs),
    /// Show a saved run report
    Report(ReportArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

/// Arguments for `run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Root directory to sweep
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Where discarded duplicates are moved
    #[arg(long = "duplicates", value_name = "DIR")]
    pub duplicates_dir: Option<PathBuf>,

    /// Where out-of-policy files and broken archives go
    #[arg(long = "unsupported", value_name = "DIR")]
    pub unsupported_dir: Option<PathBuf>,

    /// Allow-list of suffixes, e.g. ".jpg,.png"
    #[arg(short, long, value_name = "LIST", conflicts_with_all = ["extensions_file", "media"])]
    pub extensions: Option<String>,

    /// File with one suffix per line
    #[arg(long, value_name = "FILE", conflicts_with = "media")]
    pub extensions_file: Option<PathBuf>,

    /// Track common image formats only
    #[arg(long)]
    pub media: bool,

    /// Smaller files are never treated as duplicates (e.g. 1MB, 4KiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Ask which members of each group to keep
    #[arg(short, long)]
    pub interactive: bool,

    /// What besides equal content makes a duplicate
    #[arg(long, value_enum)]
    pub criterion: Option<DuplicateCriterion>,

    /// Copy unsupported files instead of moving them
    #[arg(long)]
    pub copy_unsupported: bool,

    /// Fingerprint digest
    #[arg(long = "hash", value_enum)]
    pub hash_algorithm: Option<HashAlgorithm>,

    /// Treat archives as plain files
    #[arg(long)]
    pub no_expand: bool,

    /// Maximum archive nesting (0 = unlimited)
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Maximum bytes written by expansion (0 = unlimited)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_expanded: Option<u64>,

    /// Skip dot-files and dot-directories
    #[arg(long)]
    pub skip_hidden: bool,

    /// Gitignore-style pattern to skip (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Manifest file (appended)
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Error log file (appended)
    #[arg(long, value_name = "FILE")]
    pub error_log: Option<PathBuf>,

    /// Write a checksummed JSON report
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Recycle into this directory instead of the system trash
    #[arg(long, value_name = "DIR")]
    pub holding_dir: Option<PathBuf>,

    /// Leave the duplicates directory as loose files
    #[arg(long)]
    pub no_package: bool,

    /// Show every non-fatal error, not just the summary
    #[arg(long)]
    pub show_errors: bool,

    /// Summary format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `report`.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Report file written by `run --report`
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for `config`.
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Print the config file location instead
    #[arg(long)]
    pub path: bool,
}

/// Summary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Colored human-readable text
    Text,
    /// JSON on stdout
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Command-line settings that override lower config layers.
///
/// Only flags that were given are serialized, so figment keeps the file or
/// environment value for everything else.
#[derive(Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicates_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unsupported_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<ResolutionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    criterion: Option<DuplicateCriterion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unsupported_routing: Option<RoutingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_algorithm: Option<HashAlgorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expand_archives: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_expanded_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ignore_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_log_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    holding_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    package_duplicates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface_errors: Option<bool>,
}

impl RunArgs {
    /// Flags that were actually given.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        let extensions = if self.media {
            Some(MEDIA_EXTENSIONS.iter().map(|s| (*s).to_string()).collect())
        } else {
            self.extensions.as_deref().map(split_list)
        };
        CliOverrides {
            duplicates_dir: self.duplicates_dir.clone(),
            unsupported_dir: self.unsupported_dir.clone(),
            extensions,
            extensions_file: self.extensions_file.clone(),
            min_size: self.min_size,
            resolution: self.interactive.then_some(ResolutionMode::Interactive),
            criterion: self.criterion,
            unsupported_routing: self.copy_unsupported.then_some(RoutingMode::Copy),
            hash_algorithm: self.hash_algorithm,
            expand_archives: self.no_expand.then_some(false),
            max_depth: self.max_depth,
            max_expanded_bytes: self.max_expanded,
            skip_hidden: self.skip_hidden.then_some(true),
            ignore_patterns: (!self.ignore_patterns.is_empty())
                .then(|| self.ignore_patterns.clone()),
            manifest_path: self.manifest.clone(),
            error_log_path: self.error_log.clone(),
            report_path: self.report.clone(),
            holding_dir: self.holding_dir.clone(),
            package_duplicates: self.no_package.then_some(false),
            surface_errors: self.show_errors.then_some(true),
        }
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a human-readable size.
///
/// Decimal suffixes (`KB`, `MB`, `GB`, `TB`) use powers of 1000, binary
/// suffixes (`KiB`, `MiB`, `GiB`, `TiB`) powers of 1024. Case-insensitive.
///
/// # Errors
///
/// Returns a message for empty, negative or unknown input.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
