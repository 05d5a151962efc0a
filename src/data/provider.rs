//! Market data provider abstraction
//!
//! The scoring engine only needs "history for a symbol" and "latest quote",
//! so every source (Yahoo, CSV files, in-memory fixtures) sits behind
//! [`MarketDataProvider`].

use super::types::{Lookback, PriceSeries, Quote};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur when fetching market data
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("API returned error: {code} - {message}")]
    ApiError { code: String, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No data returned for {0}")]
    EmptyData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl FetchError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::RequestFailed(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            FetchError::RateLimitExceeded => true,
            _ => false,
        }
    }
}

/// Source of daily price history
#[allow(async_fn_in_trait)]
pub trait MarketDataProvider {
    /// Chronological history for `symbol` covering `lookback`.
    ///
    /// Unknown or delisted symbols yield `FetchError::EmptyData`.
    async fn fetch_history(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, FetchError>;

    /// Latest price and previous close
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let series = self.fetch_history(symbol, Lookback::Days(7)).await?;
        Quote::from_series(&series).ok_or_else(|| FetchError::EmptyData(symbol.to_string()))
    }
}

/// Trim a frozen series to `lookback`, measured back from its last session
pub(crate) fn apply_lookback(series: &mut PriceSeries, lookback: Lookback) {
    let anchor = match series.candles.last() {
        Some(last) => last.timestamp,
        None => return,
    };
    if let Some(cutoff) = lookback.cutoff(anchor) {
        series.retain_since(cutoff);
    }
}

/// Provider backed by series held in memory
///
/// Useful for replaying frozen data: lookback windows are measured from the
/// last stored session, so repeated calls always see the same rows.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol.to_uppercase(), series);
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.insert(series);
        self
    }
}

impl MarketDataProvider for InMemoryProvider {
    async fn fetch_history(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, FetchError> {
        let mut series = self
            .series
            .get(&symbol.to_uppercase())
            .cloned()
            .ok_or_else(|| FetchError::EmptyData(symbol.to_string()))?;

        series.normalize();
        apply_lookback(&mut series, lookback);

        if series.is_empty() {
            return Err(FetchError::EmptyData(symbol.to_string()));
        }

        Ok(series)
    }
}
