//! Command-line interface definitions for imgdupe.
//!
//! Flags given here override the layered [`Config`]; anything left unset
//! falls through to the config file, environment and defaults.
//!
//! # Example
//!
//! ```bash
//! # Near-duplicates at 90% similarity (default)
//! imgdupe scan ~/Pictures
//!
//! # Exact perceptual matches only, JSON for scripting
//! imgdupe scan ~/Pictures /mnt/backup --similarity 100 --output json
//!
//! # Large library: exact BK-tree search, connected groups
//! imgdupe -v scan ~/Pictures --strategy bk-tree --policy transitive
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;
use crate::duplicates::{ClusterPolicy, StrategyChoice};
use crate::scanner::PerceptualAlgorithm;

/// Find visually similar images across directory trees.
///
/// imgdupe fingerprints every image with a perceptual hash and groups the
/// ones whose fingerprints differ by at most a few bits. Files are only
/// read, never modified.
#[derive(Debug, Parser)]
#[command(name = "imgdupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan directories for near-duplicate images
    Scan(ScanArgs),
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Directories to scan
    #[arg(value_name = "ROOT", required = true)]
    pub roots: Vec<PathBuf>,

    /// Minimum similarity in percent (1-100); 100 means identical fingerprints
    #[arg(short, long, value_name = "PERCENT")]
    pub similarity: Option<u32>,

    /// Only scan the top level of each root
    #[arg(long)]
    pub no_recursive: bool,

    /// File extension to accept (can be specified multiple times)
    #[arg(short, long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Clustering strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyChoice>,

    /// Grouping policy
    #[arg(long, value_enum)]
    pub policy: Option<ClusterPolicy>,

    /// Perceptual hash algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<PerceptualAlgorithm>,

    /// Number of hashing threads (default: one per core)
    #[arg(long, value_name = "N")]
    pub hash_threads: Option<usize>,

    /// Follow symbolic links during scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Configuration file (default: platform config directory)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ScanArgs {
    /// Apply the flags that were given on top of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(similarity) = self.similarity {
            config.similarity_percent = similarity;
        }
        if self.no_recursive {
            config.include_subdirectories = false;
        }
        if !self.extensions.is_empty() {
            config.valid_extensions = self.extensions.clone();
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if let Some(algorithm) = self.algorithm {
            config.algorithm = algorithm;
        }
        if let Some(threads) = self.hash_threads {
            config.hash_threads = threads;
        }
        if self.follow_symlinks {
            config.follow_symlinks = true;
        }
        if self.skip_hidden {
            config.skip_hidden = true;
        }
    }
}

/// Output format for scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    Text,
    /// JSON for scripting
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
