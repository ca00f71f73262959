//! Configuration loading from TOML.
//!
//! Reads `config.toml` into strongly-typed sections. Every section and
//! field has a default, so a partial (or empty) file is valid.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::engine::aggregator::FeedConfig;
use crate::engine::EngineConfig;
use crate::grading::GradingPolicy;
use crate::signals::SignalConfig;
use crate::trends::TrendConfig;

/// Environment variable overriding the config path.
pub const CONFIG_PATH_ENV: &str = "SHARPLINE_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub signals: SignalConfig,
    pub trends: TrendConfig,
    pub feed: FeedConfig,
    pub grading: GradingPolicy,
    pub data: DataConfig,
    pub dashboard: DashboardConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// JSON dataset backing the in-memory store.
    pub dataset_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_path: crate::storage::DEFAULT_DATASET_FILE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The path to load: `SHARPLINE_CONFIG` if set, else `config.toml`.
    pub fn resolve_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    fn validate(&self) -> Result<()> {
        let s = &self.signals;
        anyhow::ensure!(
            s.rlm_threshold > 0.0 && s.rlm_moneyline_threshold > 0.0,
            "signals.rlm thresholds must be positive"
        );
        anyhow::ensure!(
            s.steam_threshold > 0.0 && s.steam_moneyline_threshold > 0.0,
            "signals.steam thresholds must be positive"
        );
        anyhow::ensure!(s.min_books >= 1, "signals.min_books must be at least 1");
        anyhow::ensure!(s.steam_window_secs > 0, "signals.steam_window_secs must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.feed.high_confidence_threshold),
            "feed.high_confidence_threshold must be within 0..1"
        );
        anyhow::ensure!(
            self.trends.prior_losses >= 0.0,
            "trends.prior_losses must not be negative"
        );
        anyhow::ensure!(self.trends.z >= 0.0, "trends.z must not be negative");
        Ok(())
    }
}
