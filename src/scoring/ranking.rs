//! Universe ranking by predicted upside
//!
//! Tickers are scored one at a time. A ticker whose pipeline fails is left
//! out of the ranking and reported in [`Ranking::skipped`]; it never gets a
//! placeholder score.

use super::analysis::{Analyzer, TickerAnalysis};
use crate::data::{FetchError, Lookback, MarketDataProvider};
use crate::error::{ErrorKind, ScoringError};
use crate::models::Horizon;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// One ranked ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub ticker: String,
    pub current_price: f64,
    pub predicted_price: f64,
    pub upside_pct: f64,
}

/// Ticker left out of a ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl SkippedTicker {
    fn from_error(ticker: &str, err: &ScoringError) -> Self {
        Self {
            ticker: ticker.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

/// Result of ranking a universe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ranking {
    /// Best upside first, at most `top_n` entries
    pub entries: Vec<RankingEntry>,
    /// Tickers that could not be scored, in universe order
    pub skipped: Vec<SkippedTicker>,
}

/// Scores a universe of tickers against one horizon
pub struct RankingEngine<P: MarketDataProvider> {
    provider: P,
    analyzer: Analyzer,
    lookback: Lookback,
    horizon: Horizon,
    top_n: usize,
}

impl<P: MarketDataProvider> RankingEngine<P> {
    pub fn new(provider: P, analyzer: Analyzer) -> Self {
        let config = analyzer.config();
        let lookback = config.data.lookback;
        let horizon = config.ranking.horizon;
        let top_n = config.ranking.top_n;
        Self {
            provider,
            analyzer,
            lookback,
            horizon,
            top_n,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Fetch history for `ticker` and analyze it
    pub async fn analyze(&self, ticker: &str) -> Result<TickerAnalysis, ScoringError> {
        let series = self.provider.fetch_history(ticker, self.lookback).await?;
        if series.is_empty() {
            return Err(FetchError::EmptyData(ticker.to_string()).into());
        }
        self.analyzer.analyze_series(&series)
    }

    /// Ranking entry for one ticker at the ranking horizon
    pub async fn score(&self, ticker: &str) -> Result<RankingEntry, SkippedTicker> {
        let analysis = self
            .analyze(ticker)
            .await
            .map_err(|e| SkippedTicker::from_error(ticker, &e))?;

        match analysis.forecast(self.horizon) {
            Some(forecast) => Ok(RankingEntry {
                ticker: analysis.ticker.clone(),
                current_price: analysis.current_price,
                predicted_price: forecast.predicted_price,
                upside_pct: forecast.upside_pct,
            }),
            None => Err(match analysis.skipped(self.horizon) {
                Some(skipped) => SkippedTicker {
                    ticker: ticker.to_string(),
                    kind: skipped.kind,
                    reason: skipped.reason.clone(),
                },
                None => SkippedTicker {
                    ticker: ticker.to_string(),
                    kind: ErrorKind::ModelUnavailable,
                    reason: format!("no {} forecast", self.horizon),
                },
            }),
        }
    }

    /// Score every ticker and keep the `top_n` by upside
    ///
    /// Ties keep universe order. Duplicate tickers are scored once.
    pub async fn rank(&self, universe: &[String]) -> Ranking {
        let mut ranking = Ranking::default();
        let mut seen = HashSet::new();

        info!(
            "Ranking {} tickers on {} upside",
            universe.len(),
            self.horizon
        );

        for ticker in universe {
            let ticker = ticker.trim();
            if ticker.is_empty() || !seen.insert(ticker.to_ascii_uppercase()) {
                continue;
            }

            match self.score(ticker).await {
                Ok(entry) => ranking.entries.push(entry),
                Err(skipped) => {
                    warn!("Skipping {} ({}): {}", ticker, skipped.kind, skipped.reason);
                    ranking.skipped.push(skipped);
                }
            }
        }

        ranking
            .entries
            .sort_by(|a, b| b.upside_pct.total_cmp(&a.upside_pct));
        ranking.entries.truncate(self.top_n);

        info!(
            "Ranked {} tickers, skipped {}",
            ranking.entries.len(),
            ranking.skipped.len()
        );
        ranking
    }
}
