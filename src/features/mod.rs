//! Feature engineering module
//!
//! This module provides:
//! - Technical indicators (RSI, SMA, EMA, MACD)
//! - Feature rows and supervised datasets for the forecasting models

pub mod engineering;
pub mod technical;

pub use engineering::{FeatureConfig, FeatureEngineer, FeatureRow, FeatureTable};
