//! Error taxonomy for the scoring pipeline
//!
//! Every per-ticker failure is expressed as a [`ScoringError`] so the ranking
//! engine can skip the ticker and keep going. The lower layers have their own
//! error enums which convert into it.

use crate::data::FetchError;
use crate::models::{ModelError, StoreError};
use thiserror::Error;

/// Errors raised while scoring a single ticker
#[derive(Error, Debug)]
pub enum ScoringError {
    /// The series is too short for the indicator windows or the horizon
    #[error("insufficient data for {symbol}: need {required} rows, have {available}")]
    InsufficientData {
        symbol: String,
        required: usize,
        available: usize,
    },

    /// The data provider failed or returned nothing usable
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(#[from] FetchError),

    /// A persisted model was required but none exists and it cannot be trained
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("model store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification used when reporting skipped tickers
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    InsufficientData,
    UpstreamFetch,
    ModelUnavailable,
    Model,
}

impl ScoringError {
    pub fn insufficient(symbol: &str, required: usize, available: usize) -> Self {
        Self::InsufficientData {
            symbol: symbol.to_string(),
            required,
            available,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoringError::InsufficientData { .. } => ErrorKind::InsufficientData,
            ScoringError::UpstreamFetch(_) => ErrorKind::UpstreamFetch,
            ScoringError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            ScoringError::Model(_) | ScoringError::Store(_) => ErrorKind::Model,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InsufficientData => "insufficient data",
            ErrorKind::UpstreamFetch => "upstream fetch",
            ErrorKind::ModelUnavailable => "model unavailable",
            ErrorKind::Model => "model",
        };
        f.write_str(name)
    }
}
