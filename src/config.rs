//! Layered configuration.
//!
//! Sources merge in this order, later ones winning:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform config directory, or the file given with
//!    `--config`
//! 3. `IMGDUPE_*` environment variables
//! 4. Command-line flags (applied by the caller)
//!
//! ```toml
//! similarity_percent = 95
//! valid_extensions = ["jpg", "png"]
//! strategy = "bk-tree"
//! policy = "transitive"
//! hash_threads = 4
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::coordinator::{ScanOptions, DEFAULT_SIMILARITY};
use crate::duplicates::{
    ClusterPolicy, ClusterStrategy, FinderConfig, StrategyChoice, DEFAULT_EXHAUSTIVE_LIMIT,
};
use crate::error::ConfigError;
use crate::scanner::{
    HashConfig, PerceptualAlgorithm, DEFAULT_EXTENSIONS, DEFAULT_HASH_SIDE, DEFAULT_MAX_PIXELS,
};

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "IMGDUPE_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Similarity percentage in `1..=100`.
    pub similarity_percent: u32,
    /// Descend into subdirectories.
    pub include_subdirectories: bool,
    /// Accepted extensions.
    pub valid_extensions: Vec<String>,
    /// Follow symbolic links.
    pub follow_symlinks: bool,
    /// Skip hidden entries.
    pub skip_hidden: bool,
    /// Clustering strategy.
    pub strategy: StrategyChoice,
    /// Strategy `auto` uses for large inputs.
    pub large_input_strategy: ClusterStrategy,
    /// Largest input `auto` still compares exhaustively.
    pub exhaustive_limit: usize,
    /// Grouping policy.
    pub policy: ClusterPolicy,
    /// Fingerprint algorithm.
    pub algorithm: PerceptualAlgorithm,
    /// Fingerprint side.
    pub hash_side: u32,
    /// Pixel cap checked before decoding.
    pub max_pixels: u64,
    /// Hashing threads (0 = one per core).
    pub hash_threads: usize,
    /// Progress cadence in files.
    pub progress_every: usize,
    /// Stream groups as they are found.
    pub stream_groups: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_percent: DEFAULT_SIMILARITY,
            include_subdirectories: true,
            valid_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            follow_symlinks: false,
            skip_hidden: false,
            strategy: StrategyChoice::Auto,
            large_input_strategy: ClusterStrategy::SortedSweep,
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
            policy: ClusterPolicy::RepresentativeOnly,
            algorithm: PerceptualAlgorithm::Phash,
            hash_side: DEFAULT_HASH_SIDE,
            max_pixels: DEFAULT_MAX_PIXELS,
            hash_threads: 0,
            progress_every: 1,
            stream_groups: false,
        }
    }
}

impl Config {
    /// Load from defaults, the config file and the environment.
    ///
    /// `path` overrides the platform config file; unlike the default file it
    /// must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(p) = path {
            if !p.is_file() {
                return Err(ConfigError::Load(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
        }
        let config: Self = Self::figment(path)
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Defaults merged with the TOML file only.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(file) => {
                log::debug!("Reading configuration from {}", file.display());
                figment.merge(Toml::file(file))
            }
            None => figment,
        }
    }

    /// Platform-specific configuration file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "imgdupe", "imgdupe")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Build validated scan options for `roots`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] the options fail on.
    pub fn into_scan_options(self, roots: Vec<PathBuf>) -> Result<ScanOptions, ConfigError> {
        let options = ScanOptions {
            roots,
            include_subdirectories: self.include_subdirectories,
            similarity_percent: self.similarity_percent,
            valid_extensions: self.valid_extensions,
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
            hash: HashConfig {
                algorithm: self.algorithm,
                hash_side: self.hash_side,
                max_pixels: self.max_pixels,
            },
            finder: FinderConfig::default()
                .with_strategy(self.strategy)
                .with_large_input_strategy(self.large_input_strategy)
                .with_exhaustive_limit(self.exhaustive_limit)
                .with_policy(self.policy),
            hash_threads: self.hash_threads,
            progress_every: self.progress_every.max(1),
            stream_groups: self.stream_groups,
        };
        options.validate()?;
        Ok(options)
    }
}
