//! Stock potential scoring engine
//!
//! This library fetches daily stock history, computes technical indicators,
//! fits one gradient boosting model per forecast horizon and ranks a universe
//! of tickers by predicted price upside.
//!
//! # Modules
//!
//! - [`data`] - Market data providers (Yahoo Finance, CSV, in-memory) and data structures
//! - [`features`] - Technical indicators and feature engineering
//! - [`models`] - Gradient boosting, per-horizon models and model persistence
//! - [`scoring`] - Per-ticker analysis and universe ranking
//! - [`config`] - TOML configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use stock_potential::config::Config;
//! use stock_potential::data::YahooClient;
//! use stock_potential::scoring::{Analyzer, RankingEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let universe = config.ranking.universe.clone();
//!
//!     // 1. Pick a data source
//!     let client = YahooClient::with_config(&config.data)?;
//!
//!     // 2. Score every ticker and keep the best 30-day upside
//!     let engine = RankingEngine::new(client, Analyzer::new(config));
//!     let ranking = engine.rank(&universe).await;
//!
//!     for entry in &ranking.entries {
//!         println!("{}: {:+.2}%", entry.ticker, entry.upside_pct);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod models;
pub mod scoring;

// Re-export commonly used items at the crate level
pub use config::{Config, ModelPolicy};
pub use data::{Candle, Dataset, Lookback, MarketDataProvider, PriceSeries, Quote, YahooClient};
pub use error::{ErrorKind, ScoringError};
pub use features::{FeatureConfig, FeatureEngineer};
pub use models::{GbmParams, GbmRegressor, Horizon, HorizonModel, ModelError, ModelMetrics};
pub use scoring::{Analyzer, Ranking, RankingEngine, RankingEntry, TickerAnalysis};
