//! Candidate collection using jwalk for parallel traversal.
//!
//! # Overview
//!
//! This module provides the [`Collector`] which walks an ordered list of root
//! directories, keeps files whose extension is accepted and returns them in
//! canonical order (sorted by path) with their `order_index` assigned.
//!
//! Bad roots (missing, unreadable, not a directory) are recorded as
//! [`ScanError`]s and skipped; the remaining roots are still walked.
//!
//! # Example
//!
//! ```no_run
//! use imgdupe::scanner::{Collector, CollectorConfig};
//! use imgdupe::signal::CancelToken;
//! use std::path::PathBuf;
//!
//! let config = CollectorConfig {
//!     include_subdirectories: false,
//!     ..Default::default()
//! };
//!
//! let collection = Collector::new(config).collect(&[PathBuf::from(".")], &CancelToken::new());
//! println!("Found {} images", collection.files.len());
//! for err in &collection.errors {
//!     eprintln!("Warning: {}", err);
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use super::{CollectorConfig, ImageFile, ScanError};
use crate::signal::CancelToken;

/// Result of walking all roots.
#[derive(Debug, Default)]
pub struct Collection {
    /// Accepted files in canonical order.
    pub files: Vec<ImageFile>,
    /// Non-fatal errors, in the order they were encountered.
    pub errors: Vec<ScanError>,
    /// Number of roots skipped because they could not be walked.
    pub skipped_roots: usize,
    /// Whether collection stopped early because of cancellation.
    pub cancelled: bool,
}

/// Candidate collector over several roots.
#[derive(Debug, Clone)]
pub struct Collector {
    config: CollectorConfig,
}

impl Collector {
    /// Create a new collector.
    #[must_use]
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Walk every root in order and return the accepted files.
    ///
    /// The cancel token is polled once per directory entry. On cancellation
    /// the files found so far are still returned, sorted and indexed.
    pub fn collect(&self, roots: &[PathBuf], cancel: &CancelToken) -> Collection {
        let mut collection = Collection::default();
        let mut found: Vec<(PathBuf, u64)> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for root in roots {
            if cancel.is_cancelled() {
                collection.cancelled = true;
                break;
            }

            if let Err(e) = validate_root(root) {
                log::warn!("Skipping root: {}", e);
                collection.errors.push(e);
                collection.skipped_roots += 1;
                continue;
            }

            log::debug!("Collecting from {}", root.display());
            let completed = self.walk_root(root, cancel, &mut found, &mut seen, &mut collection.errors);
            if !completed {
                collection.cancelled = true;
                break;
            }
        }

        // Canonical order: by path, independent of enumeration order
        found.sort_by(|a, b| a.0.cmp(&b.0));
        collection.files = found
            .into_iter()
            .enumerate()
            .map(|(idx, (path, size))| ImageFile::new(path, size, idx))
            .collect();

        log::info!(
            "Collected {} candidate images ({} roots skipped)",
            collection.files.len(),
            collection.skipped_roots
        );

        collection
    }

    /// Walk one root. Returns `false` if cancelled mid-way.
    fn walk_root(
        &self,
        root: &Path,
        cancel: &CancelToken,
        found: &mut Vec<(PathBuf, u64)>,
        seen: &mut HashSet<PathBuf>,
        errors: &mut Vec<ScanError>,
    ) -> bool {
        let max_depth = if self.config.include_subdirectories {
            usize::MAX
        } else {
            1
        };

        let walk_dir = WalkDir::new(root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .max_depth(max_depth)
            .sort(true);

        for entry_result in walk_dir {
            if cancel.is_cancelled() {
                log::debug!("Collector: cancellation requested, stopping iteration");
                return false;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    errors.push(handle_jwalk_error(path, e));
                    continue;
                }
            };

            let path = entry.path();
            if path == root {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            if file_type.is_symlink() && !self.config.follow_symlinks {
                log::trace!("Skipping symlink: {}", path.display());
                continue;
            }

            if !self.config.accepts(&path) {
                log::trace!("Skipping file due to extension filter: {}", path.display());
                continue;
            }

            let metadata = match std::fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    errors.push(handle_io_error(&path, e));
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }

            // Overlapping roots must not produce the same file twice
            let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                log::trace!("Already collected: {}", path.display());
                continue;
            }

            found.push((path, metadata.len()));
        }

        true
    }
}

/// Check that a root exists, is a directory and can be listed.
fn validate_root(root: &Path) -> Result<(), ScanError> {
    let metadata = std::fs::metadata(root).map_err(|e| classify_io_error(root, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|e| classify_io_error(root, e))?;
    Ok(())
}

fn classify_io_error(path: &Path, error: std::io::Error) -> ScanError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::PermissionDenied => ScanError::PermissionDenied(path.to_path_buf()),
        ErrorKind::NotFound => ScanError::PathNotFound(path.to_path_buf()),
        _ => ScanError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}

/// Handle I/O errors during file access.
fn handle_io_error(path: &Path, error: std::io::Error) -> ScanError {
    let err = classify_io_error(path, error);
    match &err {
        ScanError::PathNotFound(_) => {
            log::debug!("File vanished during scan: {}", path.display());
        }
        _ => log::warn!("{}", err),
    }
    err
}

/// Handle jwalk errors.
fn handle_jwalk_error(path: PathBuf, error: jwalk::Error) -> ScanError {
    log::warn!("Walker error for {}: {}", path.display(), error);
    let permission_denied = error
        .io_error()
        .is_some_and(|io| io.kind() == std::io::ErrorKind::PermissionDenied);
    if permission_denied {
        ScanError::PermissionDenied(path)
    } else {
        ScanError::Io {
            path,
            source: std::io::Error::other(error.to_string()),
        }
    }
}
