//! Scanner module for candidate collection and image fingerprinting.
//!
//! This module provides functionality for:
//! - Directory walking over several roots using jwalk
//! - Extension filtering and canonical ordering of candidates
//! - Perceptual fingerprinting of decoded images
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Root traversal and candidate discovery
//! - [`perceptual`]: Fingerprint type and the hash calculator
//!
//! # Example
//!
//! ```no_run
//! use imgdupe::scanner::{Collector, CollectorConfig};
//! use imgdupe::signal::CancelToken;
//! use std::path::PathBuf;
//!
//! let collector = Collector::new(CollectorConfig::default());
//! let collection = collector.collect(&[PathBuf::from("Pictures")], &CancelToken::new());
//! for file in &collection.files {
//!     println!("{} {}: {} bytes", file.order_index, file.path.display(), file.size_bytes);
//! }
//! ```

pub mod perceptual;
pub mod walker;

use serde::Serialize;
use std::path::PathBuf;

// Re-export main types
pub use perceptual::{
    Fingerprint, HashCalculator, HashConfig, HashError, PerceptualAlgorithm, SimilarityIndex,
    DEFAULT_HASH_SIDE, DEFAULT_MAX_PIXELS,
};
pub use walker::{Collection, Collector};

/// Extensions accepted when no explicit list is configured.
#[cfg(not(feature = "avif"))]
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// Extensions accepted when no explicit list is configured.
#[cfg(feature = "avif")]
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "avif"];

/// A candidate image discovered during collection.
///
/// `order_index` is the file's position in canonical (path-sorted) order and
/// is what makes clustering deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImageFile {
    /// Path to the file, unique within one scan
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Position in canonical scan order
    pub order_index: usize,
}

impl ImageFile {
    /// Create a new ImageFile.
    #[must_use]
    pub fn new(path: PathBuf, size_bytes: u64, order_index: usize) -> Self {
        Self {
            path,
            size_bytes,
            order_index,
        }
    }
}

/// Configuration for candidate collection.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Descend into subdirectories of each root.
    pub include_subdirectories: bool,

    /// Accepted extensions, lowercase without the dot.
    pub valid_extensions: Vec<String>,

    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            include_subdirectories: true,
            valid_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_symlinks: false,
            skip_hidden: false,
        }
    }
}

impl CollectorConfig {
    /// Check whether a path carries one of the accepted extensions.
    ///
    /// Matching is case-insensitive and tolerates a leading dot in the
    /// configured list.
    #[must_use]
    pub fn accepts(&self, path: &std::path::Path) -> bool {
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            return false;
        };
        self.valid_extensions
            .iter()
            .any(|valid| valid.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// Errors that can occur during candidate collection.
///
/// All of them are per-root or per-entry and never abort a scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::PermissionDenied(p) | Self::PathNotFound(p) | Self::NotADirectory(p) => p,
            Self::Io { path, .. } => path,
        }
    }
}
