//! Machine learning models module
//!
//! This module provides:
//! - A gradient boosting regressor built on least-squares regression trees
//! - Per-horizon price models and walk-forward cross-validation
//! - Persistence of trained model bundles

pub mod gbm;
pub mod horizon;
pub mod store;
pub mod tree;

pub use gbm::{GbmParams, GbmRegressor, ModelError, ModelMetrics};
pub use horizon::{
    time_series_cv, CrossValidationResult, Horizon, HorizonModel, ModelBundle, TargetEncoding,
};
pub use store::{FileModelStore, InMemoryModelStore, ModelStore, StoreError};
pub use tree::{RegressionTree, TreeParams};
