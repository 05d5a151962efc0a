//! Configuration management
//!
//! This module handles loading and managing configuration. Every section has
//! defaults, so a partial TOML file (or none at all) is valid.

use crate::data::yahoo::endpoints;
use crate::data::{default_universe, Lookback};
use crate::features::FeatureConfig;
use crate::models::{GbmParams, Horizon, TargetEncoding};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// History requested per ticker
    pub lookback: Lookback,
    /// Bar interval in Yahoo notation
    pub interval: String,
    pub base_url: String,
    pub summary_url: String,
    /// Host that issues the session cookie the quoteSummary crumb is tied to
    pub cookie_url: String,
    pub request_timeout_secs: u64,
    /// Extra attempts for transient fetch failures
    pub max_retries: u32,
    /// Linear backoff step between attempts
    pub retry_backoff_ms: u64,
    /// Read frozen CSV series from this directory instead of Yahoo
    pub csv_dir: Option<PathBuf>,
    /// S&P 500 constituents CSV (URL or local path)
    pub companies_source: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            lookback: Lookback::Years(2),
            interval: "1d".to_string(),
            base_url: endpoints::CHART.to_string(),
            summary_url: endpoints::SUMMARY.to_string(),
            cookie_url: endpoints::COOKIE.to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
            csv_dir: None,
            companies_source: crate::data::universe::SP500_CONSTITUENTS_URL.to_string(),
        }
    }
}

/// Where forecasting models come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelPolicy {
    /// Train a fresh model for every ticker
    #[default]
    PerTicker,
    /// Continue boosting one shared bundle on each ticker's data
    SharedWarmStart,
    /// Use the ticker's persisted bundle when present, otherwise train one
    ReusePersisted,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Forecast horizons in trading sessions
    pub horizons: Vec<Horizon>,
    /// Fraction of target rows used for training (chronological head)
    pub train_ratio: f64,
    /// Fewest training rows accepted for a horizon
    pub min_train_rows: usize,
    pub target_encoding: TargetEncoding,
    pub policy: ModelPolicy,
    /// Trees added per ticker under the shared warm-start policy
    pub warm_start_rounds: usize,
    /// Persist trained bundles to `store_dir`
    pub persist: bool,
    pub store_dir: PathBuf,
    /// Store key of the shared bundle
    pub shared_key: String,
    pub gbm: GbmParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            horizons: vec![Horizon::DAYS_30, Horizon::DAYS_90],
            train_ratio: 0.8,
            min_train_rows: 20,
            target_encoding: TargetEncoding::ForwardReturn,
            policy: ModelPolicy::PerTicker,
            warm_start_rounds: 50,
            persist: false,
            store_dir: PathBuf::from("models"),
            shared_key: "shared".to_string(),
            gbm: GbmParams::default(),
        }
    }
}

/// Ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Horizon whose upside orders the ranking
    pub horizon: Horizon,
    pub top_n: usize,
    pub universe: Vec<String>,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            horizon: Horizon::DAYS_30,
            top_n: 10,
            universe: default_universe(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub model: ModelConfig,
    pub ranking: RankingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        config.save(path)
    }

    /// Horizons to model, always including the ranking horizon
    pub fn model_horizons(&self) -> Vec<Horizon> {
        let mut horizons = self.model.horizons.clone();
        if !horizons.contains(&self.ranking.horizon) {
            horizons.push(self.ranking.horizon);
        }
        horizons.sort();
        horizons.dedup();
        horizons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.data.lookback, Lookback::Years(2));
        assert_eq!(config.model.gbm.n_estimators, 300);
        assert_eq!(config.ranking.top_n, 10);
        assert_eq!(config.ranking.universe.len(), 20);
        assert_eq!(config.model.policy, ModelPolicy::PerTicker);
    }

    #[test]
    fn test_config_serialization() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.model.policy = ModelPolicy::SharedWarmStart;
        config.data.csv_dir = Some(PathBuf::from("data"));
        config.save(&path).unwrap();

        let parsed = Config::load(&path).unwrap();
        assert_eq!(parsed.model.policy, ModelPolicy::SharedWarmStart);
        assert_eq!(parsed.data.csv_dir, Some(PathBuf::from("data")));
        assert_eq!(parsed.model.horizons, config.model.horizons);
        assert_eq!(parsed.features, config.features);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
            [ranking]
            top_n = 3
            universe = ["AAPL", "MSFT"]

            [model]
            target_encoding = "price"

            [model.gbm]
            n_estimators = 25
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();

        assert_eq!(config.ranking.top_n, 3);
        assert_eq!(config.ranking.horizon, Horizon::DAYS_30);
        assert_eq!(config.model.target_encoding, TargetEncoding::Price);
        assert_eq!(config.model.gbm.n_estimators, 25);
        assert_eq!(config.model.gbm.learning_rate, 0.05);
        assert_eq!(config.data.interval, "1d");
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = Config::load_or_default("/nonexistent/stock-potential.toml");
        assert_eq!(config.logging.level, "info");
        assert!(Config::load("/nonexistent/stock-potential.toml").is_err());
    }

    #[test]
    fn test_model_horizons_include_ranking_horizon() {
        let mut config = Config::default();
        config.model.horizons = vec![Horizon::DAYS_90];
        assert_eq!(
            config.model_horizons(),
            vec![Horizon::DAYS_30, Horizon::DAYS_90]
        );
    }
}
