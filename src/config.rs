//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rankaudit.toml` files.

use crate::analysis::DEFAULT_ALPHA;
use crate::fetcher::FetcherConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".rankaudit.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Endpoint settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Storage settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Sampling settings.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Search endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Endpoint receiving the POST.
    #[serde(default = "default_url")]
    pub url: String,

    /// Form fields identifying the source and target categories.
    #[serde(default = "default_params")]
    pub params: BTreeMap<String, String>,

    /// Regex whose first capture group is an identifier.
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// User-Agent header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            params: default_params(),
            pattern: default_pattern(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:8080/search".to_string()
}

fn default_params() -> BTreeMap<String, String> {
    [("source", "any"), ("target", "any")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_pattern() -> String {
    r#"data-id="(\d+)""#.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("rankaudit/{}", env!("CARGO_PKG_VERSION"))
}

/// SQLite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Logical table for this query configuration.
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            table: default_table(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("rankaudit.db")
}

fn default_table() -> String {
    "ranks".to_string()
}

/// Sampling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Delay before each round, in milliseconds.
    #[serde(default = "default_wait_ms")]
    pub wait_ms: u64,

    /// Rank whose column sum drives the sample plan.
    #[serde(default)]
    pub rank_to_check: usize,

    /// Log a progress line every this many rounds (quiet/log mode).
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            wait_ms: default_wait_ms(),
            rank_to_check: 0,
            progress_every: default_progress_every(),
        }
    }
}

fn default_wait_ms() -> u64 {
    1000
}

fn default_progress_every() -> u64 {
    50
}

/// Goodness-of-fit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Reject uniformity when p < alpha.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
        }
    }
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_optional(Path::new(CONFIG_FILE))
    }

    /// Load `path` if it exists. A file that exists but does not parse is an error.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }

    /// Check values that can come from the file as well as the command line.
    pub fn validate(&self) -> Result<()> {
        let alpha = self.analysis.alpha;
        if !(alpha > 0.0 && alpha < 1.0) {
            bail!("[analysis] alpha must be in (0, 1), got {}", alpha);
        }

        crate::store::validate_table_name(&self.store.table)
            .context("[store] table is not usable")?;

        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values the user passed explicitly override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.url {
            self.query.url = url.clone();
        }
        if let Some(ref database) = args.database {
            self.store.path = database.clone();
        }
        if let Some(ref table) = args.table {
            self.store.table = table.clone();
        }
        if let Some(wait_ms) = args.wait_ms {
            self.sampling.wait_ms = wait_ms;
        }
        if let Some(rank) = args.rank {
            self.sampling.rank_to_check = rank;
        }
        if let Some(alpha) = args.alpha {
            self.analysis.alpha = alpha;
        }
    }

    /// Fetcher settings derived from the `[query]` section.
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            url: self.query.url.clone(),
            params: self.query.params.clone(),
            pattern: self.query.pattern.clone(),
            timeout_seconds: self.query.timeout_seconds,
            user_agent: self.query.user_agent.clone(),
        }
    }

    /// Delay before each round.
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.sampling.wait_ms)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
