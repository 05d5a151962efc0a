//! Feature engineering for machine learning models
//!
//! This module transforms a daily price series into complete feature rows
//! (close, RSI, short/long moving averages, MACD, volume) and pairs them with
//! future closes to build supervised datasets.

use crate::data::{Dataset, PriceSeries};
use crate::features::technical::{macd, rsi, sma};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Feature engineering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Period for RSI
    pub rsi_period: usize,
    /// Short simple moving average period
    pub ma_short: usize,
    /// Long simple moving average period
    pub ma_long: usize,
    /// MACD fast EMA span
    pub macd_fast: usize,
    /// MACD slow EMA span
    pub macd_slow: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ma_short: 50,
            ma_long: 200,
            macd_fast: 12,
            macd_slow: 26,
        }
    }
}

impl FeatureConfig {
    /// Minimum number of sessions before the first complete feature row
    pub fn min_history(&self) -> usize {
        self.ma_long.max(self.ma_short).max(self.rsi_period + 1)
    }
}

/// Indicator values for one session, all windows fully populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Position of the session in the source series
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub rsi: f64,
    pub ma_short: f64,
    pub ma_long: f64,
    pub macd: f64,
    pub volume: f64,
}

impl FeatureRow {
    /// Model input vector, in `FeatureEngineer::feature_names` order
    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.close,
            self.rsi,
            self.ma_short,
            self.ma_long,
            self.macd,
            self.volume,
        ]
    }

    fn is_complete(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_finite())
    }
}

/// Complete feature rows of one series plus the closes needed for targets
#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub symbol: String,
    pub feature_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
    closes: Vec<f64>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Most recent complete row
    pub fn latest(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    /// Pair each row with the close `horizon` sessions later
    ///
    /// Rows whose target would fall past the end of the series are dropped.
    pub fn target_dataset(&self, horizon: usize) -> Dataset {
        let mut dataset = Dataset::new(self.symbol.clone(), self.feature_names.clone());

        for row in &self.rows {
            let Some(&target) = self.closes.get(row.index + horizon) else {
                break;
            };
            if target.is_finite() {
                dataset.add_sample(row.to_vec(), target, row.timestamp);
            }
        }

        dataset
    }
}

/// Feature engineer that creates ML features from a price series
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    /// Create a new feature engineer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new feature engineer with custom configuration
    pub fn with_config(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Get feature names based on configuration
    pub fn feature_names(&self) -> Vec<String> {
        vec![
            "close".to_string(),
            format!("rsi_{}", self.config.rsi_period),
            format!("ma_{}", self.config.ma_short),
            format!("ma_{}", self.config.ma_long),
            "macd".to_string(),
            "volume".to_string(),
        ]
    }

    /// Build complete feature rows
    ///
    /// Series shorter than the longest window produce an empty table; callers
    /// treat that as "insufficient data".
    pub fn build(&self, series: &PriceSeries) -> FeatureTable {
        let closes = series.closes();
        let mut table = FeatureTable {
            symbol: series.symbol.clone(),
            feature_names: self.feature_names(),
            rows: Vec::new(),
            closes: closes.clone(),
        };

        if closes.len() < self.config.min_history() {
            debug!(
                "{}: {} sessions, need {} for features",
                series.symbol,
                closes.len(),
                self.config.min_history()
            );
            return table;
        }

        let rsi_values = rsi(&closes, self.config.rsi_period);
        let ma_short = sma(&closes, self.config.ma_short);
        let ma_long = sma(&closes, self.config.ma_long);
        let macd_line = macd(&closes, self.config.macd_fast, self.config.macd_slow);

        for (i, candle) in series.candles.iter().enumerate() {
            let row = FeatureRow {
                index: i,
                timestamp: candle.timestamp,
                close: closes[i],
                rsi: rsi_values[i],
                ma_short: ma_short[i],
                ma_long: ma_long[i],
                macd: macd_line[i],
                volume: candle.volume,
            };

            if row.is_complete() {
                table.rows.push(row);
            }
        }

        table
    }
}
