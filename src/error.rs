//! Exit codes and structured error output.

use serde::Serialize;

/// Process exit codes.
///
/// - 0: run completed and duplicates were handled
/// - 1: unexpected failure
/// - 2: run completed, no duplicates found
/// - 3: run completed with non-fatal errors (see the error log)
/// - 4: configuration rejected before the run started
/// - 130: cancelled with Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Duplicates were found and resolved.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Nothing to deduplicate.
    NoDuplicates = 2,
    /// Completed, but some entries failed.
    PartialSuccess = 3,
    /// Bad configuration; nothing was touched.
    ConfigError = 4,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DS000",
            Self::GeneralError => "DS001",
            Self::NoDuplicates => "DS002",
            Self::PartialSuccess => "DS003",
            Self::ConfigError => "DS004",
            Self::Interrupted => "DS130",
        }
    }

    /// Exit code for a finished run.
    #[must_use]
    pub fn for_summary(summary: &crate::duplicates::RunSummary) -> Self {
        if summary.interrupted {
            Self::Interrupted
        } else if summary.has_errors() {
            Self::PartialSuccess
        } else if summary.has_duplicates() {
            Self::Success
        } else {
            Self::NoDuplicates
        }
    }

    /// Exit code for an error that escaped `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let is_config = err.chain().any(|cause| {
            cause.is::<crate::scanner::PolicyError>()
                || cause
                    .downcast_ref::<crate::duplicates::FinderError>()
                    .is_some_and(|e| matches!(e, crate::duplicates::FinderError::Policy(_)))
        });
        if is_config {
            Self::ConfigError
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DS004")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
