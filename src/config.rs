use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::grouping::{Clusterer, FingerprintParams, FuzzyParams};
use crate::retry::RetryPolicy;
use crate::summarizer::SummarizerSettings;

/// Full worker configuration. Every field has a default so an absent file
/// (or any absent key) is valid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub blocks: BlocksConfig,
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist. `OPENAI_API_KEY` in the environment overrides the file
    /// credential; its absence is a warning at startup, never an error.
    pub fn load(path: &Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<Config>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!("no config file at {}; using defaults", path.display());
            Config::default()
        };
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                cfg.summarizer.api_key = Some(key);
            }
        }
        Ok(cfg)
    }

    pub fn clusterer(&self) -> Clusterer {
        match self.grouping.strategy {
            Strategy::Fingerprint => Clusterer::Fingerprint(FingerprintParams {
                prefix_len: self.grouping.prefix_len,
                shingle_len: self.grouping.shingle_len,
            }),
            Strategy::Fuzzy => Clusterer::Fuzzy(FuzzyParams {
                threshold: self.grouping.fuzzy_threshold,
            }),
        }
    }

    pub fn summarizer_settings(&self) -> SummarizerSettings {
        SummarizerSettings {
            api_base: self.summarizer.api_base.clone(),
            api_key: self.summarizer.api_key.clone(),
            timeout: Duration::from_secs(self.summarizer.timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.summarizer.retry_max_attempts,
                base_delay: Duration::from_millis(self.summarizer.retry_base_delay_ms),
                max_delay: Duration::from_millis(self.summarizer.retry_max_delay_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_db_path")]
    pub db_path: PathBuf,
}

impl StoreConfig {
    fn default_db_path() -> PathBuf {
        PathBuf::from("eventscope.db")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig { db_path: Self::default_db_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "SchedulerConfig::default_interval_secs")]
    pub interval_secs: u64,
}

impl SchedulerConfig {
    fn default_interval_secs() -> u64 {
        300
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig { interval_secs: Self::default_interval_secs() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Fingerprint,
    Fuzzy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupingConfig {
    #[serde(default = "GroupingConfig::default_strategy")]
    pub strategy: Strategy,
    #[serde(default = "GroupingConfig::default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "GroupingConfig::default_prefix_len")]
    pub prefix_len: usize,
    #[serde(default = "GroupingConfig::default_shingle_len")]
    pub shingle_len: usize,
}

impl GroupingConfig {
    fn default_strategy() -> Strategy {
        Strategy::Fingerprint
    }

    fn default_fuzzy_threshold() -> f64 {
        0.95
    }

    fn default_prefix_len() -> usize {
        200
    }

    fn default_shingle_len() -> usize {
        5
    }
}

impl Default for GroupingConfig {
    fn default() -> Self {
        GroupingConfig {
            strategy: Self::default_strategy(),
            fuzzy_threshold: Self::default_fuzzy_threshold(),
            prefix_len: Self::default_prefix_len(),
            shingle_len: Self::default_shingle_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "SummarizerConfig::default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "SummarizerConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "SummarizerConfig::default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "SummarizerConfig::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "SummarizerConfig::default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "SummarizerConfig::default_small_model")]
    pub model_current: String,
    #[serde(default = "SummarizerConfig::default_small_model")]
    pub model_recent: String,
    #[serde(default = "SummarizerConfig::default_small_model")]
    pub model_today: String,
    /// Yesterday runs once per day, so it can afford the larger model.
    #[serde(default = "SummarizerConfig::default_large_model")]
    pub model_yesterday: String,
    #[serde(default = "SummarizerConfig::default_small_model")]
    pub model_daily: String,
}

impl SummarizerConfig {
    fn default_api_base() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_timeout_secs() -> u64 {
        40
    }

    fn default_retry_max_attempts() -> u32 {
        3
    }

    fn default_retry_base_delay_ms() -> u64 {
        1000
    }

    fn default_retry_max_delay_ms() -> u64 {
        30_000
    }

    fn default_small_model() -> String {
        "gpt-4o-mini".to_string()
    }

    fn default_large_model() -> String {
        "gpt-4.1".to_string()
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        SummarizerConfig {
            api_base: Self::default_api_base(),
            api_key: None,
            timeout_secs: Self::default_timeout_secs(),
            retry_max_attempts: Self::default_retry_max_attempts(),
            retry_base_delay_ms: Self::default_retry_base_delay_ms(),
            retry_max_delay_ms: Self::default_retry_max_delay_ms(),
            model_current: Self::default_small_model(),
            model_recent: Self::default_small_model(),
            model_today: Self::default_small_model(),
            model_yesterday: Self::default_large_model(),
            model_daily: Self::default_small_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlocksConfig {
    #[serde(default = "BlocksConfig::default_coarse_width")]
    pub coarse_width_minutes: u32,
    #[serde(default = "BlocksConfig::default_detailed_width")]
    pub detailed_width_minutes: u32,
}

impl BlocksConfig {
    fn default_coarse_width() -> u32 {
        180
    }

    fn default_detailed_width() -> u32 {
        15
    }
}

impl Default for BlocksConfig {
    fn default() -> Self {
        BlocksConfig {
            coarse_width_minutes: Self::default_coarse_width(),
            detailed_width_minutes: Self::default_detailed_width(),
        }
    }
}
