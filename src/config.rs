//! Configuration loading and validation.
//!
//! Configuration is a single TOML file, by default `./config/aidx.toml`.
//! See `config/aidx.example.toml` for every option.
//!
//! ```toml
//! [context]
//! id = "central-context"
//! repository_id = "central"
//! repository_url = "https://repo.example.org/index"
//! cache_dir = "./.aidx/cache"
//! index_dir = "./.aidx/index"
//! extractors = ["min", "jarContent", "maven-plugin"]
//!
//! [update]
//! policy = "interval"
//! interval_hours = 168
//!
//! [search]
//! result_limit = 20
//! ```

use anyhow::{Context, Result};
use artifact_index_core::extractor::extractor_by_id;
use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use artifact_index_core::Timestamp;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub context: ContextConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    pub id: String,
    pub repository_id: String,
    pub repository_url: String,
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
    #[serde(default = "default_extractors")]
    pub extractors: Vec<String>,
}

fn default_extractors() -> Vec<String> {
    vec![
        "min".to_string(),
        "jarContent".to_string(),
        "maven-plugin".to_string(),
    ]
}

/// When `aidx update` actually contacts the repository.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Every invocation checks the manifest.
    Always,
    /// Only `aidx update --force` checks.
    Manual,
    /// Check when the local index is older than `interval_hours`.
    #[default]
    Interval,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateConfig {
    #[serde(default)]
    pub policy: UpdatePolicy,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    /// Bound on a whole update run; `0` disables it.
    #[serde(default = "default_update_timeout_secs")]
    pub timeout_secs: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            policy: UpdatePolicy::default(),
            interval_hours: default_interval_hours(),
            timeout_secs: default_update_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            use_cache: default_use_cache(),
        }
    }
}

// About a century; keeps the chrono duration in range.
const MAX_INTERVAL_HOURS: u64 = 876_000;

// Weekly.
fn default_interval_hours() -> u64 {
    168
}
fn default_update_timeout_secs() -> u64 {
    600
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_use_cache() -> bool {
    true
}

impl UpdateConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether an update should run now, given the local index timestamp.
    ///
    /// `forced` (the `--force` flag) overrides every policy.
    pub fn should_update(&self, local: Option<Timestamp>, now: Timestamp, forced: bool) -> bool {
        if forced {
            return true;
        }
        match self.policy {
            UpdatePolicy::Always => true,
            UpdatePolicy::Manual => false,
            UpdatePolicy::Interval => match local {
                None => true,
                Some(ts) => {
                    let hours = self.interval_hours.min(MAX_INTERVAL_HOURS) as i64;
                    now - ts >= ChronoDuration::hours(hours)
                }
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_limit: default_result_limit(),
        }
    }
}

fn default_result_limit() -> usize {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate context
    if config.context.id.trim().is_empty() {
        anyhow::bail!("context.id must not be empty");
    }
    if config.context.repository_id.trim().is_empty() {
        anyhow::bail!("context.repository_id must not be empty");
    }
    if config.context.repository_url.trim().is_empty() {
        anyhow::bail!("context.repository_url must not be empty");
    }
    if config.context.extractors.is_empty() {
        anyhow::bail!("context.extractors must list at least one extractor");
    }
    for id in &config.context.extractors {
        if extractor_by_id(id).is_none() {
            anyhow::bail!(
                "Unknown extractor: '{}'. Must be min, jarContent, or maven-plugin.",
                id
            );
        }
    }

    // Validate update
    if config.update.policy == UpdatePolicy::Interval && config.update.interval_hours == 0 {
        anyhow::bail!("update.interval_hours must be > 0 when policy is 'interval'");
    }
    if config.update.request_timeout_secs == 0 {
        anyhow::bail!("update.request_timeout_secs must be > 0");
    }

    // Validate search
    if config.search.result_limit == 0 {
        anyhow::bail!("search.result_limit must be >= 1");
    }

    Ok(())
}
