//! Summary formatters.
//!
//! - [`json`]: machine-readable output for `--output json`
//! - [`text`]: colored human-readable summary
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::duplicates::RunSummary;
//! use dupesweep::error::ExitCode;
//! use dupesweep::output::JsonOutput;
//!
//! let summary = RunSummary::default();
//! let output = JsonOutput::from_summary(&summary, ExitCode::for_summary(&summary));
//! println!("{}", output.to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod text;

pub use json::{JsonGroup, JsonOutput, JsonOutputError};
pub use text::{render_report, render_summary};
