//! JSON output formatter for scan results.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "groups": [
//!     {
//!       "representative": "/photos/a.jpg",
//!       "members": ["/photos/a_small.jpg"],
//!       "reclaimable_bytes": 20480
//!     }
//!   ],
//!   "summary": {
//!     "total_files": 100,
//!     "hashes_computed": 98,
//!     "failed_files": 2,
//!     "skipped_roots": 0,
//!     "duplicate_groups": 1,
//!     "duplicate_files": 1,
//!     "reclaimable_space": 20480,
//!     "max_distance": 6,
//!     "strategy": "exhaustive",
//!     "comparisons": 4753,
//!     "scan_duration_ms": 1234,
//!     "interrupted": false,
//!     "exit_code": 3,
//!     "exit_code_name": "ID003"
//!   }
//! }
//! ```

use std::io::Write;

use serde::Serialize;

use crate::duplicates::{ClusterStrategy, DuplicateGroup, ScanResult};
use crate::error::ExitCode;

/// A single duplicate group in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// Path of the representative
    pub representative: String,
    /// Paths of the other members, in canonical order
    pub members: Vec<String>,
    /// Bytes freed by removing every member
    pub reclaimable_bytes: u64,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            representative: group.representative.path.to_string_lossy().into_owned(),
            members: group
                .members
                .iter()
                .map(|m| m.path.to_string_lossy().into_owned())
                .collect(),
            reclaimable_bytes: group.reclaimable_bytes(),
        }
    }
}

/// Summary statistics in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Candidate files found
    pub total_files: usize,
    /// Files fingerprinted successfully
    pub hashes_computed: usize,
    /// Files that failed to decode
    pub failed_files: usize,
    /// Roots that could not be walked
    pub skipped_roots: usize,
    /// Number of groups
    pub duplicate_groups: usize,
    /// Files in groups, excluding representatives
    pub duplicate_files: usize,
    /// Bytes freed by removing every member
    pub reclaimable_space: u64,
    /// Hamming distance bound used
    pub max_distance: u32,
    /// Strategy used for clustering, if clustering ran
    pub strategy: Option<ClusterStrategy>,
    /// Fingerprint comparisons performed
    pub comparisons: u64,
    /// Wall time of the scan in milliseconds
    pub scan_duration_ms: u64,
    /// Whether the scan was cancelled
    pub interrupted: bool,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "ID000")
    pub exit_code_name: String,
}

impl JsonSummary {
    /// Build the summary for a result and the exit code it maps to.
    #[must_use]
    pub fn new(result: &ScanResult, exit_code: ExitCode) -> Self {
        Self {
            total_files: result.total_files,
            hashes_computed: result.hashes_computed,
            failed_files: result.failed_files,
            skipped_roots: result.skipped_roots,
            duplicate_groups: result.group_count(),
            duplicate_files: result.duplicate_files(),
            reclaimable_space: result.reclaimable_bytes(),
            max_distance: result.max_distance,
            strategy: result.strategy,
            comparisons: result.comparisons,
            scan_duration_ms: result.elapsed.as_millis() as u64,
            interrupted: result.cancelled,
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Duplicate groups in production order
    pub groups: Vec<JsonDuplicateGroup>,
    /// Scan summary statistics
    pub summary: JsonSummary,
}

impl JsonOutput {
    /// Create the JSON view of a result.
    ///
    /// # Example
    ///
    /// ```
    /// use imgdupe::duplicates::ScanResult;
    /// use imgdupe::error::ExitCode;
    /// use imgdupe::output::JsonOutput;
    ///
    /// let output = JsonOutput::new(&ScanResult::default(), ExitCode::NoDuplicates);
    /// assert!(output.groups.is_empty());
    /// assert_eq!(output.summary.exit_code, 2);
    /// ```
    #[must_use]
    pub fn new(result: &ScanResult, exit_code: ExitCode) -> Self {
        Self {
            groups: result.groups.values().map(JsonDuplicateGroup::from).collect(),
            summary: JsonSummary::new(result, exit_code),
        }
    }

    /// Serialize to compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), OutputError> {
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

/// Errors that can occur while writing a report.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error while writing report: {0}")]
    Io(#[from] std::io::Error),
}
