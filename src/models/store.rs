//! Persistence for trained model bundles
//!
//! Bundles are stored as JSON under a string key (a ticker symbol or the
//! shared bundle name). Writes go to a temporary file that is renamed into
//! place, so concurrent readers never see a half-written bundle.

use super::horizon::ModelBundle;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by model stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid model key '{0}'")]
    InvalidKey(String),

    #[error("Model store lock poisoned")]
    Poisoned,
}

/// Load/save access to persisted model bundles
pub trait ModelStore: Send + Sync {
    /// Bundle stored under `key`, or `None` when nothing was saved yet
    fn load(&self, key: &str) -> Result<Option<ModelBundle>, StoreError>;

    /// Replace the bundle stored under `key`
    fn save(&self, key: &str, bundle: &ModelBundle) -> Result<(), StoreError>;
}

/// JSON files in a directory, one `<key>.json` per bundle
#[derive(Debug)]
pub struct FileModelStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the bundle file for `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '='))
            && key != "."
            && key != "..";
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key.to_ascii_uppercase())))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl ModelStore for FileModelStore {
    fn load(&self, key: &str) -> Result<Option<ModelBundle>, StoreError> {
        let path = self.path_for(key)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No persisted model at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        let bundle: ModelBundle = serde_json::from_str(&json)?;
        debug!(
            "Loaded model bundle {} with horizons {:?}",
            path.display(),
            bundle.horizons()
        );
        Ok(Some(bundle))
    }

    fn save(&self, key: &str, bundle: &ModelBundle) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let json = serde_json::to_string(bundle)?;

        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;

        info!("Saved model bundle to {}", path.display());
        Ok(())
    }
}

/// Process-local store, used for tests and one-shot runs
#[derive(Debug, Default)]
pub struct InMemoryModelStore {
    bundles: Mutex<HashMap<String, ModelBundle>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bundles.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModelStore for InMemoryModelStore {
    fn load(&self, key: &str) -> Result<Option<ModelBundle>, StoreError> {
        let bundles = self.bundles.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(bundles.get(&key.to_ascii_uppercase()).cloned())
    }

    fn save(&self, key: &str, bundle: &ModelBundle) -> Result<(), StoreError> {
        let mut bundles = self.bundles.lock().map_err(|_| StoreError::Poisoned)?;
        bundles.insert(key.to_ascii_uppercase(), bundle.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use crate::models::{GbmParams, Horizon, HorizonModel, TargetEncoding};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn trained_bundle() -> ModelBundle {
        let mut dataset = Dataset::new("AAPL".to_string(), vec!["close".to_string()]);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..40 {
            let close = 100.0 + i as f64;
            dataset.add_sample(vec![close], close + 5.0, start + Duration::days(i));
        }

        let params = GbmParams {
            n_estimators: 10,
            ..GbmParams::default()
        };
        let mut model = HorizonModel::new(Horizon::DAYS_30, TargetEncoding::ForwardReturn, params);
        model.fit(&dataset).unwrap();

        let mut bundle = ModelBundle::default();
        bundle.upsert(model);
        bundle
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path().join("models"));
        let bundle = trained_bundle();

        assert!(store.load("aapl").unwrap().is_none());
        store.save("aapl", &bundle).unwrap();

        let loaded = store.load("AAPL").unwrap().unwrap();
        let row = vec![vec![120.0]];
        let expected = bundle.get(Horizon::DAYS_30).unwrap().predict_prices(&row).unwrap();
        let actual = loaded.get(Horizon::DAYS_30).unwrap().predict_prices(&row).unwrap();
        assert_eq!(expected, actual);

        // no temporary file left behind
        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_file_store_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path());
        assert!(matches!(store.path_for("../etc"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.path_for(""), Err(StoreError::InvalidKey(_))));
        assert!(store.path_for("BRK-B").is_ok());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileModelStore::new(dir.path());
        fs::write(dir.path().join("SHARED.json"), "{not json").unwrap();
        assert!(matches!(store.load("shared"), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_in_memory_store() {
        let store = InMemoryModelStore::new();
        assert!(store.is_empty());
        store.save("msft", &trained_bundle()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.load("MSFT").unwrap().is_some());
        assert!(store.load("GOOGL").unwrap().is_none());
    }
}
