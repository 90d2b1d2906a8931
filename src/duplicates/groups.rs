//! Duplicate groups and scan results.
//!
//! # Overview
//!
//! A [`DuplicateGroup`] is one representative image plus the members judged
//! close enough to it. A [`ScanResult`] collects the groups of one scan keyed
//! by representative path, in the order they were discovered, together with
//! the scan counters.
//!
//! # Example
//!
//! ```
//! use imgdupe::duplicates::{DuplicateGroup, ScanResult};
//! use imgdupe::scanner::ImageFile;
//! use std::path::PathBuf;
//!
//! let rep = ImageFile::new(PathBuf::from("/a.jpg"), 2048, 0);
//! let copy = ImageFile::new(PathBuf::from("/b.jpg"), 1024, 1);
//! let group = DuplicateGroup::new(rep, vec![copy]);
//!
//! let mut result = ScanResult::default();
//! result.insert_group(group);
//!
//! assert_eq!(result.group_count(), 1);
//! assert_eq!(result.duplicate_files(), 1);
//! assert_eq!(result.reclaimable_bytes(), 1024);
//! ```

use bytesize::ByteSize;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::finder::ClusterStrategy;
use crate::scanner::ImageFile;

/// Groups keyed by representative path, in discovery order.
pub type GroupMap = IndexMap<PathBuf, DuplicateGroup>;

/// One representative image and the images found similar to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// The file that opened the group
    pub representative: ImageFile,
    /// Files assigned to the group, in insertion order (excludes the representative)
    pub members: Vec<ImageFile>,
}

impl DuplicateGroup {
    /// Create a new duplicate group.
    #[must_use]
    pub fn new(representative: ImageFile, members: Vec<ImageFile>) -> Self {
        Self {
            representative,
            members,
        }
    }

    /// Number of files in this group, representative included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len() + 1
    }

    /// A group always holds its representative.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All files, representative first.
    pub fn files(&self) -> impl Iterator<Item = &ImageFile> {
        std::iter::once(&self.representative).chain(self.members.iter())
    }

    /// Paths of all files, representative first.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().map(|f| f.path.clone()).collect()
    }

    /// Check whether the group holds the given path.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files().any(|f| f.path == path)
    }

    /// Bytes taken by the members (what removing them would free).
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.members.iter().map(|f| f.size_bytes).sum()
    }
}

/// Aggregated outcome of one scan.
///
/// Built incrementally by the coordinator and finalized when the scan
/// completes or is cancelled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    /// Number of candidate images collected
    pub total_files: usize,
    /// Number of images successfully fingerprinted
    pub hashes_computed: usize,
    /// Number of images that could not be fingerprinted
    pub failed_files: usize,
    /// Number of roots skipped because they could not be walked
    pub skipped_roots: usize,
    /// Hamming distance bound used for clustering
    pub max_distance: u32,
    /// Clustering strategy that ran, if clustering was reached
    pub strategy: Option<ClusterStrategy>,
    /// Fingerprint comparisons performed during clustering
    pub comparisons: u64,
    /// Duplicate groups keyed by representative path
    pub groups: GroupMap,
    /// Wall-clock duration of the scan
    pub elapsed: Duration,
    /// Whether the scan was cancelled before completing
    pub cancelled: bool,
}

impl ScanResult {
    /// Add a finalized group.
    pub fn insert_group(&mut self, group: DuplicateGroup) {
        self.groups
            .insert(group.representative.path.clone(), group);
    }

    /// Number of duplicate groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether any duplicates were found.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Number of duplicate files, representatives excluded.
    #[must_use]
    pub fn duplicate_files(&self) -> usize {
        self.groups.values().map(|g| g.members.len()).sum()
    }

    /// Bytes held by all group members.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.groups.values().map(DuplicateGroup::reclaimable_bytes).sum()
    }

    /// Reclaimable bytes as a human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_bytes()).to_string()
    }

    /// Find the group holding the given path.
    #[must_use]
    pub fn group_for(&self, path: &Path) -> Option<&DuplicateGroup> {
        self.groups.values().find(|g| g.contains(path))
    }
}
