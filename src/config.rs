use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    pub extraction: ExtractionConfig,
    pub fetcher: FetcherConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Consecutive empty scroll reads before the listing is considered done.
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: u32,
    /// Top-level crawl attempts before giving up with partial results.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Randomized backoff window (seconds) between crawl attempts.
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub model: String,
    /// Minimum delay between successive extraction calls.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Base URL of the HTML rendering service.
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: String,
    /// Downstream endpoint receiving the final JSON array.
    pub submit_url: String,
}

fn default_stall_threshold() -> u32 {
    3
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_min_secs() -> u64 {
    3
}
fn default_backoff_max_secs() -> u64 {
    5
}
fn default_pacing_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path, e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}
