//! Data types for stock market data
//!
//! This module defines the core data structures used throughout the project.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Daily OHLCV (Open, High, Low, Close, Volume) bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Session date (bar open time)
    pub timestamp: DateTime<Utc>,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Traded volume (shares)
    pub volume: f64,
}

/// Chronological price history of one ticker
///
/// Calendar gaps (weekends, holidays) are expected and never filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            symbol: symbol.into(),
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Closing prices in order
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Last available close, i.e. the current price at scoring time
    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }

    /// Sort by timestamp and drop duplicated sessions, keeping the last one seen
    pub fn normalize(&mut self) {
        self.candles.sort_by_key(|c| c.timestamp);
        let mut deduped: Vec<Candle> = Vec::with_capacity(self.candles.len());
        for candle in self.candles.drain(..) {
            match deduped.last_mut() {
                Some(prev) if prev.timestamp == candle.timestamp => *prev = candle,
                _ => deduped.push(candle),
            }
        }
        self.candles = deduped;
    }

    /// Keep only candles at or after `cutoff`
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) {
        self.candles.retain(|c| c.timestamp >= cutoff);
    }
}

/// Latest price snapshot for a ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub last_price: f64,
    pub previous_close: f64,
}

impl Quote {
    /// Day change in percent relative to the previous close
    pub fn change_pct(&self) -> f64 {
        if self.previous_close != 0.0 {
            (self.last_price - self.previous_close) / self.previous_close * 100.0
        } else {
            0.0
        }
    }

    pub fn is_up(&self) -> bool {
        self.last_price > self.previous_close
    }

    /// Build a quote from the two most recent sessions of a series
    pub fn from_series(series: &PriceSeries) -> Option<Self> {
        let n = series.len();
        let last = series.candles.last()?;
        let previous_close = if n >= 2 {
            series.candles[n - 2].close
        } else {
            last.open
        };

        Some(Self {
            symbol: series.symbol.clone(),
            last_price: last.close,
            previous_close,
        })
    }
}

/// How far back to request history, in Yahoo range notation ("6mo", "2y", "max")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Lookback {
    Days(u32),
    Months(u32),
    Years(u32),
    Max,
}

impl Lookback {
    /// Range parameter understood by the Yahoo chart endpoint
    pub fn as_range(&self) -> String {
        self.to_string()
    }

    /// Earliest timestamp covered when looking back from `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Lookback::Days(d) => Some(now - Duration::days(i64::from(*d))),
            Lookback::Months(m) => Some(now - Duration::days(i64::from(*m) * 31)),
            Lookback::Years(y) => Some(now - Duration::days(i64::from(*y) * 366)),
            Lookback::Max => None,
        }
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Lookback::Years(2)
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookback::Days(d) => write!(f, "{}d", d),
            Lookback::Months(m) => write!(f, "{}mo", m),
            Lookback::Years(y) => write!(f, "{}y", y),
            Lookback::Max => f.write_str("max"),
        }
    }
}

impl FromStr for Lookback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "max" {
            return Ok(Lookback::Max);
        }

        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in lookback '{}'", s))?;
        let (num, unit) = s.split_at(split);
        let n: u32 = num
            .parse()
            .map_err(|_| format!("invalid lookback '{}'", s))?;
        if n == 0 {
            return Err(format!("lookback must be positive: '{}'", s));
        }

        match unit {
            "d" => Ok(Lookback::Days(n)),
            "mo" => Ok(Lookback::Months(n)),
            "y" => Ok(Lookback::Years(n)),
            _ => Err(format!("unknown lookback unit '{}'", unit)),
        }
    }
}

impl TryFrom<String> for Lookback {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lookback> for String {
    fn from(value: Lookback) -> Self {
        value.to_string()
    }
}

/// Supervised dataset: feature rows paired with a future close (target rows)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Feature names
    pub feature_names: Vec<String>,
    /// Feature matrix (rows = samples, cols = features)
    pub features: Vec<Vec<f64>>,
    /// Target values (close price `horizon` sessions ahead)
    pub targets: Vec<f64>,
    /// Timestamps for each sample
    pub timestamps: Vec<DateTime<Utc>>,
    /// Symbol
    pub symbol: String,
}

impl Dataset {
    /// Create a new empty dataset
    pub fn new(symbol: String, feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            features: Vec::new(),
            targets: Vec::new(),
            timestamps: Vec::new(),
            symbol,
        }
    }

    /// Add a sample to the dataset
    pub fn add_sample(&mut self, features: Vec<f64>, target: f64, timestamp: DateTime<Utc>) {
        self.features.push(features);
        self.targets.push(target);
        self.timestamps.push(timestamp);
    }

    /// Get the number of samples
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Get the number of features
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Copy of the rows in `start..end`
    pub fn slice(&self, start: usize, end: usize) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: self.features[start..end].to_vec(),
            targets: self.targets[start..end].to_vec(),
            timestamps: self.timestamps[start..end].to_vec(),
            symbol: self.symbol.clone(),
        }
    }

    /// Split chronologically into training and test sets, without shuffling
    pub fn train_test_split(&self, train_ratio: f64) -> (Dataset, Dataset) {
        let ratio = train_ratio.clamp(0.0, 1.0);
        let split_idx = ((self.len() as f64 * ratio) as usize).min(self.len());

        (self.slice(0, split_idx), self.slice(split_idx, self.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(i)
    }

    fn candle(i: i64, close: f64) -> Candle {
        Candle {
            timestamp: day(i),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_quote_change() {
        let series = PriceSeries::new("AAPL", vec![candle(0, 100.0), candle(1, 105.0)]);
        let quote = Quote::from_series(&series).unwrap();

        assert_eq!(quote.previous_close, 100.0);
        assert_eq!(quote.last_price, 105.0);
        assert!((quote.change_pct() - 5.0).abs() < 1e-10);
        assert!(quote.is_up());
    }

    #[test]
    fn test_normalize_sorts_and_dedupes() {
        let mut series = PriceSeries::new(
            "MSFT",
            vec![candle(2, 3.0), candle(0, 1.0), candle(2, 4.0), candle(1, 2.0)],
        );
        series.normalize();

        assert_eq!(series.closes(), vec![1.0, 2.0, 4.0]);
        assert_eq!(series.last_close(), Some(4.0));
    }

    #[test]
    fn test_lookback_parsing() {
        assert_eq!("2y".parse::<Lookback>().unwrap(), Lookback::Years(2));
        assert_eq!("6mo".parse::<Lookback>().unwrap(), Lookback::Months(6));
        assert_eq!("5d".parse::<Lookback>().unwrap(), Lookback::Days(5));
        assert_eq!("MAX".parse::<Lookback>().unwrap(), Lookback::Max);
        assert!("2w".parse::<Lookback>().is_err());
        assert!("y".parse::<Lookback>().is_err());
        assert_eq!(Lookback::Months(6).as_range(), "6mo");
    }

    #[test]
    fn test_train_test_split_is_chronological() {
        let mut dataset = Dataset::new("TEST".to_string(), vec!["x".to_string()]);
        for i in 0..50 {
            dataset.add_sample(vec![i as f64], i as f64, day(i));
        }

        let (train, test) = dataset.train_test_split(0.8);
        assert_eq!(train.len(), 40);
        assert_eq!(test.len(), 10);

        let last_train = *train.timestamps.iter().max().unwrap();
        assert!(test.timestamps.iter().all(|t| *t > last_train));
    }
}
