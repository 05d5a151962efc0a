//! Per-ticker analysis: features, per-horizon models and forecasts
//!
//! For every configured horizon the analyzer builds target rows, splits them
//! chronologically, obtains a model according to the [`ModelPolicy`],
//! evaluates it on the held-out tail and predicts from the latest complete
//! feature row.

use crate::config::{Config, ModelPolicy};
use crate::data::PriceSeries;
use crate::error::{ErrorKind, ScoringError};
use crate::features::{FeatureEngineer, FeatureRow, FeatureTable};
use crate::models::{
    time_series_cv, CrossValidationResult, Horizon, HorizonModel, InMemoryModelStore, ModelBundle,
    ModelError, ModelMetrics, ModelStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Feature importances reported per forecast
const TOP_FEATURES: usize = 3;

/// Relative gap between a predicted and the current price, in percent
pub fn upside_percent(current: f64, predicted: f64) -> f64 {
    (predicted - current) / current * 100.0
}

/// How the model behind a forecast was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    /// Fitted from scratch on this ticker
    Trained,
    /// Shared bundle boosted further on this ticker
    WarmStarted,
    /// Loaded from the model store unchanged
    Persisted,
}

/// Forecast for one horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HorizonForecast {
    pub horizon: Horizon,
    pub predicted_price: f64,
    pub upside_pct: f64,
    /// Held-out MAE; `None` when no test rows were available
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    pub directional_accuracy: Option<f64>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub source: ModelSource,
    /// Trees in the boosted ensemble
    pub trees: usize,
    /// Features with the largest share of split gain, highest first
    pub top_features: Vec<(String, f64)>,
}

/// Horizon that could not be forecast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedHorizon {
    pub horizon: Horizon,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Everything computed for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerAnalysis {
    pub ticker: String,
    /// Session of the last close
    pub as_of: DateTime<Utc>,
    pub current_price: f64,
    pub latest: FeatureRow,
    pub forecasts: Vec<HorizonForecast>,
    pub skipped_horizons: Vec<SkippedHorizon>,
}

impl TickerAnalysis {
    pub fn forecast(&self, horizon: Horizon) -> Option<&HorizonForecast> {
        self.forecasts.iter().find(|f| f.horizon == horizon)
    }

    pub fn skipped(&self, horizon: Horizon) -> Option<&SkippedHorizon> {
        self.skipped_horizons.iter().find(|s| s.horizon == horizon)
    }
}

/// Scores single tickers
pub struct Analyzer {
    config: Config,
    engineer: FeatureEngineer,
    store: Arc<dyn ModelStore>,
}

impl Analyzer {
    /// Analyzer with a process-local model store
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(InMemoryModelStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn ModelStore>) -> Self {
        let engineer = FeatureEngineer::with_config(config.features.clone());
        Self {
            config,
            engineer,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bundle key the current policy reads and writes for `symbol`
    fn bundle_key<'a>(&'a self, symbol: &'a str) -> &'a str {
        match self.config.model.policy {
            ModelPolicy::SharedWarmStart => &self.config.model.shared_key,
            ModelPolicy::PerTicker | ModelPolicy::ReusePersisted => symbol,
        }
    }

    /// Feature table, failing when no complete row exists
    fn features(&self, series: &PriceSeries) -> Result<FeatureTable, ScoringError> {
        let table = self.engineer.build(series);
        if table.is_empty() {
            return Err(ScoringError::insufficient(
                &series.symbol,
                self.engineer.config().min_history(),
                series.len(),
            ));
        }
        Ok(table)
    }

    /// Analyze a ticker's price series over every configured horizon
    ///
    /// Horizons that cannot be forecast are listed in `skipped_horizons`; the
    /// call fails only when no horizon succeeds.
    pub fn analyze_series(&self, series: &PriceSeries) -> Result<TickerAnalysis, ScoringError> {
        let symbol = series.symbol.as_str();
        let table = self.features(series)?;
        let latest = table
            .latest()
            .cloned()
            .ok_or_else(|| ScoringError::insufficient(symbol, 1, 0))?;
        let current_price = series.last_close().unwrap_or(latest.close);
        let as_of = series
            .candles
            .last()
            .map(|c| c.timestamp)
            .unwrap_or(latest.timestamp);

        if !(current_price.is_finite() && current_price > 0.0) {
            return Err(ModelError::InvalidData(format!(
                "{}: invalid current price {}",
                symbol, current_price
            ))
            .into());
        }

        let key = self.bundle_key(symbol);
        let persisted = match self.config.model.policy {
            ModelPolicy::PerTicker => None,
            ModelPolicy::SharedWarmStart | ModelPolicy::ReusePersisted => self.store.load(key)?,
        };
        let mut bundle = persisted.clone().unwrap_or_default();
        let mut changed = false;

        let mut forecasts = Vec::new();
        let mut skipped_horizons = Vec::new();
        let mut first_error = None;

        for horizon in self.config.model_horizons() {
            let existing = persisted.as_ref().and_then(|b| b.get(horizon));
            match self.forecast(&table, horizon, existing, current_price) {
                Ok((forecast, updated)) => {
                    if let Some(model) = updated {
                        bundle.upsert(model);
                        changed = true;
                    }
                    forecasts.push(forecast);
                }
                Err(e) => {
                    debug!("{} {} skipped: {}", symbol, horizon, e);
                    skipped_horizons.push(SkippedHorizon {
                        horizon,
                        kind: e.kind(),
                        reason: e.to_string(),
                    });
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if forecasts.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        let should_save = match self.config.model.policy {
            ModelPolicy::PerTicker => self.config.model.persist,
            ModelPolicy::SharedWarmStart | ModelPolicy::ReusePersisted => true,
        };
        if changed && should_save {
            self.store.save(key, &bundle)?;
        }

        info!(
            "{}: {} forecast(s), {} skipped horizon(s)",
            symbol,
            forecasts.len(),
            skipped_horizons.len()
        );

        Ok(TickerAnalysis {
            ticker: symbol.to_string(),
            as_of,
            current_price,
            latest,
            forecasts,
            skipped_horizons,
        })
    }

    /// Forecast one horizon
    ///
    /// Returns the forecast and, when a model was trained or boosted, the
    /// model to put back into the bundle.
    fn forecast(
        &self,
        table: &FeatureTable,
        horizon: Horizon,
        existing: Option<&HorizonModel>,
        current_price: f64,
    ) -> Result<(HorizonForecast, Option<HorizonModel>), ScoringError> {
        let model_config = &self.config.model;
        let dataset = table.target_dataset(horizon.days());
        let (train, test) = dataset.train_test_split(model_config.train_ratio);
        let enough = !train.is_empty() && train.len() >= model_config.min_train_rows;
        let existing = existing.filter(|m| m.is_trained());

        let fresh = || HorizonModel::new(horizon, model_config.target_encoding, model_config.gbm.clone());

        let (model, source, updated) = match (model_config.policy, existing, enough) {
            (ModelPolicy::ReusePersisted, Some(model), _) => {
                (model.clone(), ModelSource::Persisted, false)
            }
            (ModelPolicy::SharedWarmStart, Some(model), true) => {
                let mut model = model.clone();
                model.fit_more(&train, model_config.warm_start_rounds)?;
                (model, ModelSource::WarmStarted, true)
            }
            (ModelPolicy::SharedWarmStart, Some(model), false) => {
                (model.clone(), ModelSource::Persisted, false)
            }
            (_, _, true) => {
                let mut model = fresh();
                model.fit(&train)?;
                (model, ModelSource::Trained, true)
            }
            (ModelPolicy::PerTicker, _, false) => {
                return Err(ScoringError::insufficient(
                    &table.symbol,
                    model_config.min_train_rows,
                    train.len(),
                ));
            }
            (ModelPolicy::SharedWarmStart | ModelPolicy::ReusePersisted, None, false) => {
                return Err(ScoringError::ModelUnavailable(format!(
                    "no persisted {} model for {} and only {} training rows",
                    horizon,
                    table.symbol,
                    train.len()
                )));
            }
        };

        let latest = table
            .latest()
            .ok_or_else(|| ScoringError::insufficient(&table.symbol, 1, 0))?;
        let predicted_price = model.predict(latest)?;
        if !predicted_price.is_finite() {
            warn!("{} {}: non-finite prediction", table.symbol, horizon);
            return Err(ModelError::InvalidData("non-finite prediction".to_string()).into());
        }

        let metrics = if test.is_empty() {
            ModelMetrics::default()
        } else {
            model.evaluate(&test)?
        };

        let forecast = HorizonForecast {
            horizon,
            predicted_price,
            upside_pct: upside_percent(current_price, predicted_price),
            mae: metrics.mae,
            rmse: metrics.rmse,
            directional_accuracy: metrics.directional_accuracy,
            train_rows: train.len(),
            test_rows: test.len(),
            source,
            trees: model.regressor().n_trees(),
            top_features: model
                .regressor()
                .feature_importance()
                .into_iter()
                .take(TOP_FEATURES)
                .collect(),
        };

        Ok((forecast, updated.then_some(model)))
    }

    /// Walk-forward cross-validation of a fresh model on one horizon
    pub fn cross_validate(
        &self,
        series: &PriceSeries,
        horizon: Horizon,
        n_splits: usize,
    ) -> Result<CrossValidationResult, ScoringError> {
        let table = self.features(series)?;
        let dataset = table.target_dataset(horizon.days());
        if dataset.len() < n_splits.max(1) * 2 {
            return Err(ScoringError::insufficient(
                &series.symbol,
                n_splits.max(1) * 2,
                dataset.len(),
            ));
        }
        Ok(time_series_cv(
            &dataset,
            horizon,
            self.config.model.target_encoding,
            &self.config.model.gbm,
            n_splits,
        )?)
    }

    /// Currently stored bundle for `symbol` under the active policy
    pub fn stored_bundle(&self, symbol: &str) -> Result<Option<ModelBundle>, ScoringError> {
        Ok(self.store.load(self.bundle_key(symbol))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Candle;
    use crate::models::GbmParams;
    use chrono::{Duration, TimeZone};

    /// Daily series with close = f(t)
    fn series_from(symbol: &str, n: usize, f: impl Fn(usize) -> f64) -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let candles = (0..n)
            .map(|t| {
                let close = f(t);
                Candle {
                    timestamp: start + Duration::days(t as i64),
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000_000.0,
                }
            })
            .collect();
        PriceSeries::new(symbol, candles)
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.model.gbm = GbmParams {
            n_estimators: 60,
            learning_rate: 0.1,
            ..GbmParams::default()
        };
        config
    }

    #[test]
    fn test_upside_sign() {
        assert!((upside_percent(100.0, 110.0) - 10.0).abs() < 1e-12);
        assert!((upside_percent(100.0, 90.0) + 10.0).abs() < 1e-12);
        assert_eq!(upside_percent(100.0, 100.0), 0.0);
    }

    #[test]
    fn test_linear_trend_end_to_end() {
        let series = series_from("TREND", 300, |t| 100.0 + 0.5 * t as f64);
        let analyzer = Analyzer::new(fast_config());

        let analysis = analyzer.analyze_series(&series).unwrap();
        assert_eq!(analysis.current_price, 249.5);
        assert!(analysis.latest.rsi > 50.0);

        let f30 = analysis.forecast(Horizon::DAYS_30).unwrap();
        assert!(f30.predicted_price > analysis.current_price);
        assert!(f30.upside_pct > 0.0);
        assert_eq!(f30.train_rows, 56);
        assert_eq!(f30.test_rows, 15);
        assert!(f30.mae.is_some());
        assert_eq!(f30.source, ModelSource::Trained);
        assert_eq!(f30.trees, 60);
        assert_eq!(f30.top_features.len(), 3);
        assert!(f30.top_features[0].1 >= f30.top_features[1].1);

        // only 11 target rows exist 90 sessions ahead
        let skipped = analysis.skipped(Horizon::DAYS_90).unwrap();
        assert_eq!(skipped.kind, ErrorKind::InsufficientData);
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let series = series_from("SHORT", 150, |t| 50.0 + t as f64);
        let err = Analyzer::new(fast_config())
            .analyze_series(&series)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn test_no_target_rows_is_insufficient_not_zero() {
        // features exist but no row has a close 30 sessions ahead
        let series = series_from("EDGE", 220, |t| 50.0 + t as f64);
        let err = Analyzer::new(fast_config())
            .analyze_series(&series)
            .unwrap_err();
        assert!(matches!(err, ScoringError::InsufficientData { .. }));
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let series = series_from("WAVE", 320, |t| 100.0 + (t as f64 * 0.07).sin() * 8.0 + t as f64 * 0.1);
        let analyzer = Analyzer::new(fast_config());

        let a = analyzer.analyze_series(&series).unwrap();
        let b = analyzer.analyze_series(&series).unwrap();
        assert_eq!(
            a.forecast(Horizon::DAYS_30).unwrap().predicted_price,
            b.forecast(Horizon::DAYS_30).unwrap().predicted_price
        );
    }

    #[test]
    fn test_shared_policy_without_model_or_rows_is_unavailable() {
        let mut config = fast_config();
        config.model.policy = ModelPolicy::SharedWarmStart;
        config.model.horizons = vec![Horizon::DAYS_30];
        let analyzer = Analyzer::new(config);

        let series = series_from("EDGE", 220, |t| 50.0 + t as f64);
        let err = analyzer.analyze_series(&series).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
    }

    #[test]
    fn test_shared_policy_falls_back_to_persisted_model() {
        let mut config = fast_config();
        config.model.policy = ModelPolicy::SharedWarmStart;
        config.model.horizons = vec![Horizon::DAYS_30];
        config.model.warm_start_rounds = 10;
        let analyzer = Analyzer::new(config);

        let long = series_from("LONG", 300, |t| 100.0 + 0.5 * t as f64);
        let first = analyzer.analyze_series(&long).unwrap();
        assert_eq!(first.forecasts[0].source, ModelSource::Trained);

        // too short to train, but the shared bundle now exists
        let short = series_from("EDGE", 220, |t| 50.0 + t as f64);
        let second = analyzer.analyze_series(&short).unwrap();
        let forecast = second.forecast(Horizon::DAYS_30).unwrap();
        assert_eq!(forecast.source, ModelSource::Persisted);
        assert_eq!(forecast.train_rows, 0);
        assert!(forecast.mae.is_none());

        let again = analyzer.analyze_series(&long).unwrap();
        assert_eq!(again.forecasts[0].source, ModelSource::WarmStarted);
        let bundle = analyzer.stored_bundle("ANY").unwrap().unwrap();
        assert_eq!(bundle.get(Horizon::DAYS_30).unwrap().trained_on(), &["LONG".to_string()]);
    }

    #[test]
    fn test_reuse_persisted_trains_once() {
        let mut config = fast_config();
        config.model.policy = ModelPolicy::ReusePersisted;
        config.model.horizons = vec![Horizon::DAYS_30];
        let analyzer = Analyzer::new(config);
        let series = series_from("AAPL", 300, |t| 100.0 + 0.5 * t as f64);

        let first = analyzer.analyze_series(&series).unwrap();
        let second = analyzer.analyze_series(&series).unwrap();

        assert_eq!(first.forecasts[0].source, ModelSource::Trained);
        assert_eq!(second.forecasts[0].source, ModelSource::Persisted);
        assert_eq!(
            first.forecasts[0].predicted_price,
            second.forecasts[0].predicted_price
        );
    }

    #[test]
    fn test_cross_validate() {
        let series = series_from("TREND", 360, |t| 100.0 + 0.5 * t as f64);
        let analyzer = Analyzer::new(fast_config());

        let cv = analyzer.cross_validate(&series, Horizon::DAYS_30, 3).unwrap();
        assert_eq!(cv.fold_metrics.len(), 3);
        assert!(cv.mean_mae.is_finite());
    }
}
