//! Per-horizon price models
//!
//! A [`HorizonModel`] maps a feature row to the close expected `horizon`
//! sessions later. Internally the GBM can learn either the raw future price
//! or the forward return, which lets tree ensembles follow a trending series
//! outside the price range seen in training.

use super::gbm::{GbmParams, GbmRegressor, ModelError, ModelMetrics};
use crate::data::Dataset;
use crate::features::FeatureRow;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Column of the close price in every feature vector
pub const CLOSE_COLUMN: usize = 0;

/// Forward offset in trading sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Horizon(pub usize);

impl Horizon {
    pub const DAYS_30: Horizon = Horizon(30);
    pub const DAYS_90: Horizon = Horizon(90);

    pub fn days(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

/// What the regressor is trained to output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEncoding {
    /// Percentage change from the row's close to the future close
    #[default]
    ForwardReturn,
    /// The future close itself
    Price,
}

impl TargetEncoding {
    fn encode(&self, close: f64, future: f64) -> f64 {
        match self {
            TargetEncoding::ForwardReturn => (future - close) / close * 100.0,
            TargetEncoding::Price => future,
        }
    }

    fn decode(&self, close: f64, value: f64) -> f64 {
        match self {
            TargetEncoding::ForwardReturn => close * (1.0 + value / 100.0),
            TargetEncoding::Price => value,
        }
    }
}

fn close_of(row: &[f64]) -> Result<f64, ModelError> {
    row.get(CLOSE_COLUMN)
        .copied()
        .filter(|c| c.is_finite())
        .ok_or_else(|| ModelError::InvalidData("feature row without a close".to_string()))
}

/// Trained mapping from feature row to future close for one horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonModel {
    horizon: Horizon,
    encoding: TargetEncoding,
    regressor: GbmRegressor,
    /// Symbols whose data has been used for fitting, in order
    trained_on: Vec<String>,
}

impl HorizonModel {
    pub fn new(horizon: Horizon, encoding: TargetEncoding, params: GbmParams) -> Self {
        Self {
            horizon,
            encoding,
            regressor: GbmRegressor::with_params(params),
            trained_on: Vec::new(),
        }
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn encoding(&self) -> TargetEncoding {
        self.encoding
    }

    pub fn trained_on(&self) -> &[String] {
        &self.trained_on
    }

    pub fn regressor(&self) -> &GbmRegressor {
        &self.regressor
    }

    pub fn is_trained(&self) -> bool {
        self.regressor.is_trained()
    }

    /// Re-express price targets in the model's encoding
    fn encode_dataset(&self, dataset: &Dataset) -> Result<Dataset, ModelError> {
        let mut encoded = dataset.clone();
        for (target, row) in encoded.targets.iter_mut().zip(dataset.features.iter()) {
            let close = close_of(row)?;
            if self.encoding == TargetEncoding::ForwardReturn && close <= 0.0 {
                return Err(ModelError::InvalidData(format!(
                    "non-positive close {} in {}",
                    close, dataset.symbol
                )));
            }
            *target = self.encoding.encode(close, *target);
        }
        Ok(encoded)
    }

    fn record(&mut self, symbol: &str) {
        if self.trained_on.last().map(String::as_str) != Some(symbol) {
            self.trained_on.push(symbol.to_string());
        }
    }

    /// Train from scratch on target rows (targets are future closes)
    pub fn fit(&mut self, train: &Dataset) -> Result<(), ModelError> {
        let encoded = self.encode_dataset(train)?;
        self.regressor.fit(&encoded)?;
        self.trained_on.clear();
        self.record(&train.symbol);
        info!("{} {} model fitted on {} rows", train.symbol, self.horizon, train.len());
        Ok(())
    }

    /// Keep boosting on another dataset (warm start)
    pub fn fit_more(&mut self, train: &Dataset, rounds: usize) -> Result<(), ModelError> {
        let encoded = self.encode_dataset(train)?;
        self.regressor.fit_more(&encoded, rounds)?;
        self.record(&train.symbol);
        Ok(())
    }

    /// Predicted future closes for raw feature vectors
    pub fn predict_prices(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let raw = self.regressor.predict(features)?;
        features
            .iter()
            .zip(raw)
            .map(|(row, value)| Ok(self.encoding.decode(close_of(row)?, value)))
            .collect()
    }

    /// Predicted close `horizon` sessions after `row`
    pub fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        let prices = self.predict_prices(&[row.to_vec()])?;
        prices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidData("empty prediction".to_string()))
    }

    /// Price-scale metrics (MAE, RMSE, R², directional accuracy) on held-out rows
    pub fn evaluate(&self, test: &Dataset) -> Result<ModelMetrics, ModelError> {
        let predictions = self.predict_prices(&test.features)?;
        let base = test
            .features
            .iter()
            .map(|row| close_of(row))
            .collect::<Result<Vec<f64>, ModelError>>()?;
        Ok(ModelMetrics::price_forecast(&base, &test.targets, &predictions))
    }
}

/// The set of horizon models persisted together
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelBundle {
    pub models: Vec<HorizonModel>,
}

impl ModelBundle {
    pub fn get(&self, horizon: Horizon) -> Option<&HorizonModel> {
        self.models.iter().find(|m| m.horizon == horizon)
    }

    /// Insert or replace the model for its horizon
    pub fn upsert(&mut self, model: HorizonModel) {
        match self.models.iter_mut().find(|m| m.horizon == model.horizon) {
            Some(existing) => *existing = model,
            None => {
                self.models.push(model);
                self.models.sort_by_key(|m| m.horizon);
            }
        }
    }

    pub fn horizons(&self) -> Vec<Horizon> {
        self.models.iter().map(|m| m.horizon).collect()
    }
}

/// Cross-validation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationResult {
    /// Metrics for each fold
    pub fold_metrics: Vec<ModelMetrics>,
    /// Mean MAE across folds
    pub mean_mae: f64,
    /// Standard deviation of the fold MAEs
    pub std_mae: f64,
    /// Mean directional accuracy across folds, when defined
    pub mean_directional_accuracy: Option<f64>,
}

/// Walk-forward cross-validation with expanding training windows
pub fn time_series_cv(
    dataset: &Dataset,
    horizon: Horizon,
    encoding: TargetEncoding,
    params: &GbmParams,
    n_splits: usize,
) -> Result<CrossValidationResult, ModelError> {
    if n_splits == 0 || dataset.len() < n_splits * 2 {
        return Err(ModelError::InvalidData(
            "Dataset too small for cross-validation".to_string(),
        ));
    }

    let fold_size = dataset.len() / (n_splits + 1);
    let mut fold_metrics = Vec::new();

    info!(
        "Performing time-series cross-validation with {} splits",
        n_splits
    );

    for i in 0..n_splits {
        let train_end = (i + 1) * fold_size;
        let test_end = train_end + fold_size;

        if test_end > dataset.len() {
            break;
        }

        let train = dataset.slice(0, train_end);
        let test = dataset.slice(train_end, test_end);

        let mut model = HorizonModel::new(horizon, encoding, params.clone());
        model.fit(&train)?;
        let metrics = model.evaluate(&test)?;

        info!(
            "Fold {}: MAE={:.4}, RMSE={:.4}",
            i + 1,
            metrics.mae.unwrap_or(f64::NAN),
            metrics.rmse.unwrap_or(f64::NAN)
        );

        fold_metrics.push(metrics);
    }

    let maes: Vec<f64> = fold_metrics.iter().filter_map(|m| m.mae).collect();
    let n_folds = maes.len().max(1) as f64;
    let mean_mae = maes.iter().sum::<f64>() / n_folds;
    let std_mae = (maes.iter().map(|x| (x - mean_mae).powi(2)).sum::<f64>() / n_folds).sqrt();

    let accuracies: Vec<f64> = fold_metrics
        .iter()
        .filter_map(|m| m.directional_accuracy)
        .collect();
    let mean_directional_accuracy = if accuracies.is_empty() {
        None
    } else {
        Some(accuracies.iter().sum::<f64>() / accuracies.len() as f64)
    };

    Ok(CrossValidationResult {
        fold_metrics,
        mean_mae,
        std_mae,
        mean_directional_accuracy,
    })
}
