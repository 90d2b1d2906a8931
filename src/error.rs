//! Engine-level errors, exit codes and structured error output.
//!
//! Per-item problems ([`crate::scanner::ScanError`],
//! [`crate::scanner::HashError`]) never reach this level: the coordinator
//! logs them and carries on. What remains here is configuration rejected up
//! front and the fatal failures that end a scan.

use serde::Serialize;

use crate::duplicates::ScanResult;

/// Errors that stop a scan (or prevent it from starting).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The options were rejected before the scan started.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// An unrecoverable failure inside the scan worker.
    #[error("Fatal scan failure: {0}")]
    Fatal(String),
}

/// Invalid scan options.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Similarity must lie in `1..=100`.
    #[error("similarity_percent must be between 1 and 100, got {0}")]
    SimilarityOutOfRange(u32),

    /// Hash side must be a multiple of 4 in `4..=32`.
    #[error("hash_side must be a multiple of 4 between 4 and 32, got {0}")]
    InvalidHashSide(u32),

    /// No roots to scan.
    #[error("at least one root directory is required")]
    NoRoots,

    /// No extensions to accept.
    #[error("valid_extensions must not be empty")]
    NoExtensions,

    /// The pixel cap must be positive.
    #[error("max_pixels must be greater than zero")]
    ZeroPixelCap,

    /// The configuration sources could not be merged.
    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Exit codes for the imgdupe binary.
///
/// - 0: Success (completed normally, duplicates found)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (completed normally, no duplicates)
/// - 3: Partial success (completed, but some files or roots were skipped)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Scan completed and duplicates were found.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: Scan completed but no duplicates were found.
    NoDuplicates = 2,
    /// Partial success: Scan completed but skipped some files or roots.
    PartialSuccess = 3,
    /// Interrupted: Scan was cancelled by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for a finished (or cancelled) scan.
    #[must_use]
    pub fn from_result(result: &ScanResult) -> Self {
        if result.cancelled {
            Self::Interrupted
        } else if !result.has_duplicates() {
            Self::NoDuplicates
        } else if result.failed_files > 0 || result.skipped_roots > 0 {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "ID000",
            Self::GeneralError => "ID001",
            Self::NoDuplicates => "ID002",
            Self::PartialSuccess => "ID003",
            Self::Interrupted => "ID130",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "ID001")
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
            message: err.to_string(),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
