//! CSV persistence for price series
//!
//! Files are one ticker each, `<dir>/<SYMBOL>.csv`, with a
//! `timestamp,open,high,low,close,volume` header. Yahoo-style exports
//! (`Date,Open,High,Low,Close,Adj Close,Volume`) load as well.

use super::provider::{apply_lookback, FetchError, MarketDataProvider};
use super::types::{Candle, Lookback, PriceSeries};
use chrono::{DateTime, NaiveDate, Utc};
use csv::{Reader, Writer};
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CandleRecord {
    #[serde(alias = "Date", alias = "date", alias = "Timestamp")]
    timestamp: String,
    #[serde(alias = "Open")]
    open: f64,
    #[serde(alias = "High")]
    high: f64,
    #[serde(alias = "Low")]
    low: f64,
    #[serde(alias = "Close")]
    close: f64,
    #[serde(alias = "Volume")]
    volume: f64,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| FetchError::ParseError(format!("invalid timestamp '{}'", raw)))
}

/// Write a series as CSV
pub fn write_series<W: Write>(writer: W, series: &PriceSeries) -> Result<(), FetchError> {
    let mut writer = Writer::from_writer(writer);

    writer.write_record(["timestamp", "open", "high", "low", "close", "volume"])?;
    for candle in &series.candles {
        writer.write_record([
            candle.timestamp.to_rfc3339(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Read a series from CSV, sorted chronologically
pub fn read_series<R: Read>(reader: R, symbol: &str) -> Result<PriceSeries, FetchError> {
    let mut reader = Reader::from_reader(reader);
    let mut candles = Vec::new();

    for record in reader.deserialize() {
        let record: CandleRecord = record?;
        candles.push(Candle {
            timestamp: parse_timestamp(&record.timestamp)?,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    let mut series = PriceSeries::new(symbol, candles);
    series.normalize();
    Ok(series)
}

/// Save a series to a CSV file
pub fn save_series(path: &Path, series: &PriceSeries) -> Result<(), FetchError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_series(File::create(path)?, series)
}

/// Load a series from a CSV file
pub fn load_series(path: &Path, symbol: &str) -> Result<PriceSeries, FetchError> {
    read_series(File::open(path)?, symbol)
}

/// Provider reading frozen series from a directory of CSV files
///
/// Lookback windows are measured from the last stored session.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_uppercase()))
    }
}

impl MarketDataProvider for CsvProvider {
    async fn fetch_history(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, FetchError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(FetchError::EmptyData(symbol.to_string()));
        }

        debug!("Loading {} from {}", symbol, path.display());
        let mut series = load_series(&path, symbol)?;
        apply_lookback(&mut series, lookback);

        if series.is_empty() {
            return Err(FetchError::EmptyData(symbol.to_string()));
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn sample_series() -> PriceSeries {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let candles = (0..5)
            .map(|i| Candle {
                timestamp: start + Duration::days(i),
                open: 10.0 + i as f64,
                high: 11.0 + i as f64,
                low: 9.0 + i as f64,
                close: 10.5 + i as f64,
                volume: 1000.0 * (i + 1) as f64,
            })
            .collect();
        PriceSeries::new("GGAL", candles)
    }

    #[test]
    fn test_save_and_load_series() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("GGAL.csv");
        let series = sample_series();

        save_series(&path, &series).unwrap();
        let loaded = load_series(&path, "GGAL").unwrap();

        assert_eq!(loaded, series);
    }

    #[test]
    fn test_read_yahoo_export() {
        let csv = "Date,Open,High,Low,Close,Adj Close,Volume\n\
                   2024-01-03,184.22,185.88,183.43,184.25,183.9,58414500\n\
                   2024-01-02,187.15,188.44,183.89,185.64,185.2,82488700\n";
        let series = read_series(csv.as_bytes(), "AAPL").unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![185.64, 184.25]);
    }

    #[test]
    fn test_bad_timestamp_is_parse_error() {
        let csv = "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n";
        let err = read_series(csv.as_bytes(), "X").unwrap_err();
        assert!(matches!(err, FetchError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_csv_provider() {
        let dir = tempdir().unwrap();
        let provider = CsvProvider::new(dir.path());
        save_series(&provider.path_for("ggal"), &sample_series()).unwrap();

        let series = provider.fetch_history("GGAL", Lookback::Max).await.unwrap();
        assert_eq!(series.len(), 5);

        let err = provider.fetch_history("BMA", Lookback::Max).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyData(_)));
    }
}
