//! TOML configuration parsing and validation.
//!
//! Every section is optional. Running without a config file is the same
//! as loading an empty one: [`Config::default`] carries the stock ignore
//! rules, extraction limits and correlation constants.
//!
//! ```toml
//! [db]
//! path = "./data/timeline.sqlite"
//!
//! [scanner]
//! ignore_names = [".git", "node_modules", "target"]
//! ignore_globs = ["*.pyc", "*.db"]
//! follow_symlinks = false
//! max_depth = 256
//!
//! [extraction]
//! title_max_chars = 50
//! min_capture_chars = 5
//!
//! [correlation]
//! window_days = 7.0
//! increment = 0.5
//! min_strength = 0.1
//!
//! [recommendations]
//! phrases_file = "./config/phrases.txt"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("unified_timeline.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    /// Entries whose name equals, or whose relative path contains, one of
    /// these strings are skipped.
    #[serde(default = "default_ignore_names")]
    pub ignore_names: Vec<String>,
    /// Wildcard patterns matched against entry names.
    #[serde(default = "default_ignore_globs")]
    pub ignore_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ignore_names: default_ignore_names(),
            ignore_globs: default_ignore_globs(),
            follow_symlinks: false,
            max_depth: default_max_depth(),
        }
    }
}

fn default_ignore_names() -> Vec<String> {
    [
        ".git",
        "__pycache__",
        "node_modules",
        ".DS_Store",
        ".env",
        ".vscode",
        ".idea",
        ".pytest_cache",
        "venv",
        "env",
        ".venv",
        "dist",
        "build",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ignore_globs() -> Vec<String> {
    vec!["*.pyc".to_string(), "*.db".to_string()]
}

fn default_max_depth() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,
    #[serde(default = "default_min_capture_chars")]
    pub min_capture_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            title_max_chars: default_title_max_chars(),
            min_capture_chars: default_min_capture_chars(),
        }
    }
}

fn default_title_max_chars() -> usize {
    50
}
fn default_min_capture_chars() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorrelationConfig {
    #[serde(default = "default_window_days")]
    pub window_days: f64,
    #[serde(default = "default_increment")]
    pub increment: f64,
    #[serde(default = "default_min_strength")]
    pub min_strength: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            increment: default_increment(),
            min_strength: default_min_strength(),
        }
    }
}

impl CorrelationConfig {
    pub fn window_secs(&self) -> f64 {
        self.window_days * 24.0 * 3600.0
    }
}

fn default_window_days() -> f64 {
    7.0
}
fn default_increment() -> f64 {
    0.5
}
fn default_min_strength() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RecommendationConfig {
    /// One phrase per line; blank lines and `#` comments are ignored.
    #[serde(default)]
    pub phrases_file: Option<PathBuf>,
}

/// Load the config file at `path`, or the defaults when no path is given.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Ok(Config::default()),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.extraction.title_max_chars == 0 {
        anyhow::bail!("extraction.title_max_chars must be > 0");
    }

    if config.scanner.max_depth == 0 {
        anyhow::bail!("scanner.max_depth must be > 0");
    }

    let corr = &config.correlation;
    if !corr.window_days.is_finite() || corr.window_days < 0.0 {
        anyhow::bail!("correlation.window_days must be >= 0");
    }
    if !(0.0..=1.0).contains(&corr.increment) {
        anyhow::bail!("correlation.increment must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&corr.min_strength) {
        anyhow::bail!("correlation.min_strength must be in [0.0, 1.0]");
    }

    for pattern in &config.scanner.ignore_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid scanner.ignore_globs pattern: '{}'", pattern))?;
    }

    Ok(())
}
