//! Gradient Boosting Machine implementation
//!
//! Least-squares gradient boosting over [`RegressionTree`] base learners,
//! with deterministic (seeded) row subsampling, warm-start continuation and
//! evaluation utilities.

use super::tree::{RegressionTree, TreeParams};
use crate::data::Dataset;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur with the model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Model not trained")]
    NotTrained,

    #[error("Feature count mismatch: model expects {expected}, got {got}")]
    FeatureMismatch { expected: usize, got: usize },
}

/// GBM hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    /// Number of boosting iterations (trees)
    pub n_estimators: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples required in a leaf node
    pub min_samples_leaf: usize,
    /// Subsample ratio of the training instances
    pub subsample: f64,
    /// Seed for the subsampling RNG
    pub seed: u64,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 3,
            learning_rate: 0.05,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            seed: 42,
        }
    }
}

impl GbmParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean squared error
    pub mse: Option<f64>,
    /// Root mean squared error
    pub rmse: Option<f64>,
    /// R-squared score
    pub r2: Option<f64>,
    /// Mean absolute error
    pub mae: Option<f64>,
    /// Directional accuracy (% of correct direction predictions)
    pub directional_accuracy: Option<f64>,
}

impl ModelMetrics {
    /// Metrics for price forecasts made from the prices in `base`
    ///
    /// Directional accuracy compares the predicted move `pred - base` with
    /// the realised move `true - base`.
    pub fn price_forecast(base: &[f64], y_true: &[f64], y_pred: &[f64]) -> Self {
        if base.len() != y_true.len() {
            return Self::default();
        }
        let moves_true: Vec<f64> = y_true.iter().zip(base).map(|(t, b)| t - b).collect();
        let moves_pred: Vec<f64> = y_pred.iter().zip(base).map(|(p, b)| p - b).collect();
        Self::with_moves(y_true, y_pred, &moves_true, &moves_pred)
    }

    fn with_moves(y_true: &[f64], y_pred: &[f64], moves_true: &[f64], moves_pred: &[f64]) -> Self {
        let n = y_true.len();
        if n == 0 || n != y_pred.len() {
            return Self::default();
        }

        let mse_val: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n as f64;

        let mae_val: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n as f64;

        let mean_true: f64 = y_true.iter().sum::<f64>() / n as f64;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean_true).powi(2)).sum();
        let ss_res: f64 = mse_val * n as f64;

        let r2_val = if ss_tot != 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            0.0
        };

        // Directional accuracy
        let mut correct_direction = 0;
        let mut total_direction = 0;
        for (t, p) in moves_true.iter().zip(moves_pred.iter()) {
            if *t != 0.0 {
                total_direction += 1;
                if (*t > 0.0 && *p > 0.0) || (*t < 0.0 && *p < 0.0) {
                    correct_direction += 1;
                }
            }
        }
        let dir_acc = if total_direction > 0 {
            Some(correct_direction as f64 / total_direction as f64 * 100.0)
        } else {
            None
        };

        Self {
            mse: Some(mse_val),
            rmse: Some(mse_val.sqrt()),
            r2: Some(r2_val),
            mae: Some(mae_val),
            directional_accuracy: dir_acc,
        }
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmRegressor {
    params: GbmParams,
    /// Initial prediction (training target mean); `None` until fitted
    base_score: Option<f64>,
    trees: Vec<RegressionTree>,
    feature_names: Vec<String>,
    feature_importance: Vec<f64>,
}

impl GbmRegressor {
    /// Create a new GBM regressor with default parameters
    pub fn new() -> Self {
        Self::with_params(GbmParams::default())
    }

    /// Create a new GBM regressor with custom parameters
    pub fn with_params(params: GbmParams) -> Self {
        Self {
            params,
            base_score: None,
            trees: Vec::new(),
            feature_names: Vec::new(),
            feature_importance: Vec::new(),
        }
    }

    fn validate(dataset: &Dataset) -> Result<(), ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::InvalidData("Empty dataset".to_string()));
        }
        if dataset.targets.iter().any(|t| !t.is_finite()) {
            return Err(ModelError::InvalidData("Non-finite target".to_string()));
        }
        let width = dataset.num_features();
        if let Some(row) = dataset.features.iter().find(|r| r.len() != width) {
            return Err(ModelError::FeatureMismatch {
                expected: width,
                got: row.len(),
            });
        }
        Ok(())
    }

    /// Train the model from scratch on a dataset
    pub fn fit(&mut self, dataset: &Dataset) -> Result<(), ModelError> {
        Self::validate(dataset)?;

        info!(
            "Training GBM regressor with {} samples and {} features",
            dataset.len(),
            dataset.num_features()
        );
        debug!("Parameters: {:?}", self.params);

        let base = dataset.targets.iter().sum::<f64>() / dataset.len() as f64;
        self.base_score = Some(base);
        self.trees.clear();
        self.feature_names = dataset.feature_names.clone();
        self.feature_importance = vec![0.0; dataset.num_features()];

        self.boost(dataset, self.params.n_estimators);

        info!("Model training completed ({} trees)", self.trees.len());
        Ok(())
    }

    /// Continue boosting an already fitted model on new data (warm start)
    ///
    /// Adds `rounds` trees fitted to the residuals of the current ensemble.
    /// An untrained model is fitted from scratch instead.
    pub fn fit_more(&mut self, dataset: &Dataset, rounds: usize) -> Result<(), ModelError> {
        if !self.is_trained() {
            return self.fit(dataset);
        }
        Self::validate(dataset)?;
        if dataset.num_features() != self.feature_names.len() {
            return Err(ModelError::FeatureMismatch {
                expected: self.feature_names.len(),
                got: dataset.num_features(),
            });
        }

        info!(
            "Warm-starting GBM with {} more trees on {} samples",
            rounds,
            dataset.len()
        );
        self.boost(dataset, rounds);
        Ok(())
    }

    fn boost(&mut self, dataset: &Dataset, rounds: usize) {
        let x = &dataset.features;
        let y = &dataset.targets;
        let n = dataset.len();
        let tree_params = self.params.tree_params();
        let sample_size = ((n as f64 * self.params.subsample.clamp(0.0, 1.0)).round() as usize)
            .clamp(1, n);

        let mut predictions: Vec<f64> = x.iter().map(|row| self.predict_row(row)).collect();
        let mut rng = StdRng::seed_from_u64(self.params.seed ^ self.trees.len() as u64);

        for _ in 0..rounds {
            let residuals: Vec<f64> = y
                .iter()
                .zip(predictions.iter())
                .map(|(t, p)| t - p)
                .collect();

            let rows: Vec<usize> = if sample_size < n {
                let mut rows = rand::seq::index::sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                rows
            } else {
                (0..n).collect()
            };

            let tree = RegressionTree::fit(
                x,
                &residuals,
                rows,
                &tree_params,
                &mut self.feature_importance,
            );

            for (pred, row) in predictions.iter_mut().zip(x.iter()) {
                *pred += self.params.learning_rate * tree.predict_row(row);
            }
            self.trees.push(tree);
        }
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let base = self.base_score.unwrap_or(0.0);
        self.trees
            .iter()
            .fold(base, |acc, tree| acc + self.params.learning_rate * tree.predict_row(row))
    }

    /// Make predictions on new data
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if !self.is_trained() {
            return Err(ModelError::NotTrained);
        }

        features
            .iter()
            .map(|row| {
                if row.len() != self.feature_names.len() {
                    Err(ModelError::FeatureMismatch {
                        expected: self.feature_names.len(),
                        got: row.len(),
                    })
                } else {
                    Ok(self.predict_row(row))
                }
            })
            .collect()
    }

    /// Normalised split-gain importance per feature, highest first
    pub fn feature_importance(&self) -> Vec<(String, f64)> {
        let total: f64 = self.feature_importance.iter().sum();
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .zip(self.feature_importance.iter())
            .map(|(name, gain)| {
                let share = if total > 0.0 { gain / total } else { 0.0 };
                (name.clone(), share)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Check if the model is trained
    pub fn is_trained(&self) -> bool {
        self.base_score.is_some()
    }
}

impl Default for GbmRegressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn mse(model: &GbmRegressor, dataset: &Dataset) -> f64 {
        let predictions = model.predict(&dataset.features).unwrap();
        predictions
            .iter()
            .zip(&dataset.targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / dataset.len() as f64
    }

    fn create_test_dataset(n: usize) -> Dataset {
        let mut dataset = Dataset::new(
            "TEST".to_string(),
            vec!["feature1".to_string(), "feature2".to_string()],
        );
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for i in 0..n {
            let x1 = i as f64;
            let x2 = (i as f64 * 0.5).sin();
            let target = x1 * 0.5 + x2 * 2.0 + 0.1;
            dataset.add_sample(vec![x1, x2], target, start + Duration::days(i as i64));
        }

        dataset
    }

    #[test]
    fn test_gbm_regressor() {
        let dataset = create_test_dataset(200);
        let (train, test) = dataset.train_test_split(0.8);

        let mut model = GbmRegressor::new();
        model.fit(&train).unwrap();

        assert_eq!(model.n_trees(), 300);
        assert!(mse(&model, &test).is_finite());

        // in-sample fit should be tight
        assert!(mse(&model, &train) < 1.0);
    }

    #[test]
    fn test_untrained_model_errors() {
        let model = GbmRegressor::new();
        assert!(matches!(
            model.predict(&[vec![1.0, 2.0]]),
            Err(ModelError::NotTrained)
        ));
    }

    #[test]
    fn test_empty_dataset_is_invalid() {
        let mut model = GbmRegressor::new();
        let empty = Dataset::new("X".to_string(), vec!["a".to_string()]);
        assert!(matches!(model.fit(&empty), Err(ModelError::InvalidData(_))));
    }

    #[test]
    fn test_feature_mismatch() {
        let mut model = GbmRegressor::new();
        model.fit(&create_test_dataset(50)).unwrap();
        assert!(matches!(
            model.predict(&[vec![1.0]]),
            Err(ModelError::FeatureMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn test_subsampled_fit_is_deterministic() {
        let params = GbmParams {
            n_estimators: 50,
            subsample: 0.7,
            ..GbmParams::default()
        };
        let dataset = create_test_dataset(120);

        let mut a = GbmRegressor::with_params(params.clone());
        let mut b = GbmRegressor::with_params(params);
        a.fit(&dataset).unwrap();
        b.fit(&dataset).unwrap();

        assert_eq!(
            a.predict(&dataset.features).unwrap(),
            b.predict(&dataset.features).unwrap()
        );
    }

    #[test]
    fn test_fit_more_adds_trees() {
        let params = GbmParams {
            n_estimators: 20,
            ..GbmParams::default()
        };
        let dataset = create_test_dataset(100);
        let mut model = GbmRegressor::with_params(params);

        model.fit_more(&dataset, 5).unwrap();
        assert_eq!(model.n_trees(), 20);

        let before = mse(&model, &dataset);
        model.fit_more(&dataset, 10).unwrap();
        assert_eq!(model.n_trees(), 30);
        assert!(mse(&model, &dataset) <= before);
    }

    #[test]
    fn test_feature_importance_prefers_signal() {
        let mut model = GbmRegressor::new();
        model.fit(&create_test_dataset(150)).unwrap();

        let importance = model.feature_importance();
        assert_eq!(importance[0].0, "feature1");
        let total: f64 = importance.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_forecast_direction() {
        let base = [100.0, 100.0, 100.0];
        let truth = [110.0, 90.0, 105.0];
        let pred = [105.0, 95.0, 100.0];
        let metrics = ModelMetrics::price_forecast(&base, &truth, &pred);

        assert!((metrics.mae.unwrap() - 5.0).abs() < 1e-12);
        assert!((metrics.directional_accuracy.unwrap() - 200.0 / 3.0).abs() < 1e-9);
    }
}
