//! Scoring module
//!
//! This module provides:
//! - Per-ticker analysis across forecast horizons
//! - Universe ranking by predicted upside

pub mod analysis;
pub mod ranking;

pub use analysis::{
    upside_percent, Analyzer, HorizonForecast, ModelSource, SkippedHorizon, TickerAnalysis,
};
pub use ranking::{Ranking, RankingEngine, RankingEntry, SkippedTicker};
