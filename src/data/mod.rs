//! Data module for fetching and processing market data
//!
//! This module provides:
//! - A provider abstraction with Yahoo Finance, CSV and in-memory sources
//! - Data types for candles, price series, quotes and supervised datasets
//! - The default ticker universe and the S&P 500 company directory

pub mod profile;
pub mod provider;
pub mod storage;
pub mod types;
pub mod universe;
pub mod yahoo;

pub use profile::CompanyProfile;
pub use provider::{FetchError, InMemoryProvider, MarketDataProvider};
pub use storage::CsvProvider;
pub use types::{Candle, Dataset, Lookback, PriceSeries, Quote};
pub use universe::{default_universe, Company, CompanyDirectory};
pub use yahoo::YahooClient;
