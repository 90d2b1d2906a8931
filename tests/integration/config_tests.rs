use figment::providers::{Env, Serialized};
use figment::Figment;
use imgdupe::config::{Config, ENV_PREFIX};
use imgdupe::duplicates::{ClusterPolicy, ClusterStrategy, StrategyChoice};
use imgdupe::error::ConfigError;
use imgdupe::scanner::PerceptualAlgorithm;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

// Environment variables are process-wide
static ENV_MUTEX: Mutex<()> = Mutex::new(());

#[test]
fn test_config_load_defaults() {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config.similarity_percent, 90);
    assert_eq!(config.strategy, StrategyChoice::Auto);
    assert_eq!(config.large_input_strategy, ClusterStrategy::SortedSweep);
    assert_eq!(config.exhaustive_limit, 1000);
    assert_eq!(config.hash_side, 8);
}

#[test]
fn test_config_load_from_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    std::env::set_var("IMGDUPE_SIMILARITY_PERCENT", "75");
    std::env::set_var("IMGDUPE_POLICY", "transitive");
    std::env::set_var("IMGDUPE_HASH_THREADS", "2");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .unwrap();

    std::env::remove_var("IMGDUPE_SIMILARITY_PERCENT");
    std::env::remove_var("IMGDUPE_POLICY");
    std::env::remove_var("IMGDUPE_HASH_THREADS");

    assert_eq!(config.similarity_percent, 75);
    assert_eq!(config.policy, ClusterPolicy::TransitiveClosure);
    assert_eq!(config.hash_threads, 2);
}

#[test]
fn test_env_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "similarity_percent = 95\nalgorithm = \"ahash\"\n").unwrap();

    std::env::set_var("IMGDUPE_SIMILARITY_PERCENT", "60");
    let loaded = Config::load(Some(&path));
    std::env::remove_var("IMGDUPE_SIMILARITY_PERCENT");

    let config = loaded.unwrap();
    assert_eq!(config.similarity_percent, 60);
    assert_eq!(config.algorithm, PerceptualAlgorithm::Ahash);
}

#[test]
fn test_config_load_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
similarity_percent = 98
include_subdirectories = false
valid_extensions = ["jpg", "jpeg"]
strategy = "sorted-sweep"
large_input_strategy = "bk-tree"
exhaustive_limit = 50
hash_side = 16
stream_groups = true
"#,
    )
    .unwrap();

    let config: Config = Config::figment(Some(&path)).extract().unwrap();
    assert_eq!(config.similarity_percent, 98);
    assert!(!config.include_subdirectories);
    assert_eq!(config.valid_extensions, vec!["jpg", "jpeg"]);
    assert_eq!(config.strategy, StrategyChoice::SortedSweep);
    assert_eq!(config.large_input_strategy, ClusterStrategy::BkTree);
    assert_eq!(config.exhaustive_limit, 50);
    assert!(config.stream_groups);

    let options = config
        .into_scan_options(vec![PathBuf::from("/photos")])
        .unwrap();
    assert_eq!(options.hash.bit_len(), 256);
    assert_eq!(options.max_distance(), 5);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "similarity_percent = \"very\"").unwrap();

    let result: Result<Config, _> = Config::figment(Some(&path)).extract();
    assert!(result.is_err());
}

#[test]
fn test_invalid_hash_side_rejected() {
    let config = Config {
        hash_side: 10,
        ..Default::default()
    };
    assert_eq!(
        config
            .into_scan_options(vec![PathBuf::from("/photos")])
            .unwrap_err(),
        ConfigError::InvalidHashSide(10)
    );
}

#[test]
fn test_no_roots_rejected() {
    assert_eq!(
        Config::default().into_scan_options(Vec::new()).unwrap_err(),
        ConfigError::NoRoots
    );
}
