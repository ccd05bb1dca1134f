//! Configuration loading and generation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::export::DEFAULT_BATCH_SIZE;
use crate::engine::policy::{BoostPolicy, ScoringConfig, Weights};
use crate::error::CouplingError;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging to file
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    /// Combiner weights and strong-coupling threshold
    pub scoring: Weights,

    /// Multiplicative boosts
    pub boost: BoostPolicy,

    /// Run parameters
    pub run: RunConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            scoring: Weights::default(),
            boost: BoostPolicy::default(),
            run: RunConfig::default(),
        }
    }
}

impl Config {
    /// Validate `[scoring]` and `[boost]` into a scoring configuration, with
    /// any set override taking the place of its config value.
    pub fn scoring_config(&self, overrides: WeightOverrides) -> Result<ScoringConfig> {
        let base = self.scoring;
        let weights = Weights {
            structural_weight: overrides
                .structural_weight
                .unwrap_or(base.structural_weight),
            logical_weight: overrides.logical_weight.unwrap_or(base.logical_weight),
            coupling_threshold: overrides
                .coupling_threshold
                .unwrap_or(base.coupling_threshold),
        };
        ScoringConfig::new(weights, self.boost)
    }
}

/// Per-invocation replacements for `[scoring]` values.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightOverrides {
    pub structural_weight: Option<f64>,
    pub logical_weight: Option<f64>,
    pub coupling_threshold: Option<f64>,
}

/// `[run]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Records per CSV batch
    pub batch_size: usize,
    /// Pairs between progress reports; adaptive when unset
    pub progress_interval: Option<u64>,
    /// Cap on the number of classes paired per project
    pub max_classes: Option<usize>,
    /// Score pairs on all cores
    pub parallel: bool,
    /// Keep every component value to report exact medians (8 bytes per pair
    /// and component)
    pub median: bool,
    /// Root of the `metrics/`, `dependencies/` and `co_changes/` input folders
    pub data_root: PathBuf,
    /// Per-project output folders are created below this
    pub output_dir: PathBuf,
    /// Projects processed by `batch` when none are given on the command line
    pub projects: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: None,
            max_classes: None,
            parallel: false,
            median: true,
            data_root: PathBuf::from("data/raw"),
            output_dir: PathBuf::from("data/processed/coupling_scores"),
            projects: Vec::new(),
        }
    }
}

/// Default log path: ~/.config/hybrid-coupling/logs
fn default_log_path() -> PathBuf {
    config_dir().join("logs")
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("hybrid-coupling")
}

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, returns default configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            let mut config = Config::default();
            if let Some(dir) = config_dir {
                config.log_path = dir.join("logs");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content).map_err(|e| {
            CouplingError::invalid_config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        // An unset log_path follows the config file's directory
        if config.log_path == default_log_path()
            && let Some(dir) = config_dir
        {
            config.log_path = dir.join("logs");
        }

        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<PathBuf> {
        let path = Self::default_path();
        Self::generate_at(&path)?;
        Ok(path)
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Default configuration content with comments.
    fn default_config_content() -> String {
        format!(
            r#"# hybrid-coupling configuration file

# Enable debug logging to file (default: false)
debug = false

# Path to log directory (default: ~/.config/hybrid-coupling/logs)
# log_path = "~/.config/hybrid-coupling/logs"

[scoring]
# Must sum to 1.0
structural_weight = 0.5
logical_weight = 0.5
# Pairs with hybrid_score >= threshold are strong couplings
coupling_threshold = 0.7

[boost]
# Structural score multiplier when an explicit dependency exists
dependency_factor = 1.5
# Logical score multiplier for pairs seen in more than `strong_commits` commits
strong_commits = 10
strong_commit_factor = 1.3
# ... and in more than `moderate_commits` commits
moderate_commits = 5
moderate_commit_factor = 1.15

[run]
batch_size = {DEFAULT_BATCH_SIZE}
# progress_interval = 10000
# max_classes = 5000
parallel = false
# Exact medians keep every score in memory (about 24 bytes per pair);
# set to false on very large projects to report them as empty
median = true
data_root = "data/raw"
output_dir = "data/processed/coupling_scores"
# projects = ["project-a", "project-b"]
projects = []
"#
        )
    }
}
