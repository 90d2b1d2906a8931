//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Similarity-threshold conversion (percent to Hamming distance)
//! - Greedy and transitive clustering of fingerprints
//! - Duplicate group and scan result management

pub mod finder;
pub mod groups;

pub use finder::{
    max_distance, ClusterPolicy, ClusterStrategy, DuplicateFinder, FindOutcome, FinderConfig,
    HashedImage, StrategyChoice, DEFAULT_EXHAUSTIVE_LIMIT,
};
pub use groups::{DuplicateGroup, GroupMap, ScanResult};
