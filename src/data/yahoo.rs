//! Yahoo Finance client for fetching daily stock data
//!
//! Uses the public chart endpoint for OHLCV history and quotes and the
//! quoteSummary endpoint for company fundamentals. quoteSummary needs a
//! session cookie plus a matching crumb, which the client fetches once and
//! caches. Transient failures are retried a bounded number of times with
//! linear backoff.

use super::profile::CompanyProfile;
use super::provider::{FetchError, MarketDataProvider};
use super::types::{Candle, Lookback, PriceSeries, Quote};
use crate::config::DataConfig;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Yahoo Finance base URLs
pub mod endpoints {
    /// Chart (OHLCV) API host
    pub const CHART: &str = "https://query1.finance.yahoo.com";
    /// quoteSummary API host
    pub const SUMMARY: &str = "https://query2.finance.yahoo.com";
    /// Sets the session cookie the crumb is bound to
    pub const COOKIE: &str = "https://fc.yahoo.com";
}

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) stock-potential/0.1";

const PROFILE_MODULES: &str = "assetProfile,financialData,defaultKeyStatistics,summaryDetail";

/// Yahoo Finance API client
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    summary_url: String,
    cookie_url: String,
    interval: String,
    max_retries: u32,
    retry_backoff: Duration,
    crumb: Arc<Mutex<Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

/// Instrument metadata returned alongside chart data
#[derive(Debug, Clone, Deserialize)]
pub struct ChartMeta {
    pub symbol: String,
    #[serde(rename = "regularMarketPrice")]
    pub regular_market_price: Option<f64>,
    #[serde(rename = "chartPreviousClose")]
    pub chart_previous_close: Option<f64>,
    #[serde(rename = "previousClose")]
    pub previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Parse a chart response body into a price series and its metadata
///
/// Sessions with any missing OHLCV field are skipped. A result without any
/// complete session is reported as `EmptyData`.
pub fn parse_chart(symbol: &str, body: &str) -> Result<(PriceSeries, ChartMeta), FetchError> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| FetchError::ParseError(e.to_string()))?;

    if let Some(error) = response.chart.error {
        if error.code.eq_ignore_ascii_case("Not Found") {
            return Err(FetchError::EmptyData(symbol.to_string()));
        }
        return Err(FetchError::ApiError {
            code: error.code,
            message: error.description.unwrap_or_default(),
        });
    }

    let data = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FetchError::EmptyData(symbol.to_string()))?;

    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let mut candles = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let field = |col: &Vec<Option<f64>>| col.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
            field(&quote.volume),
        ) else {
            debug!("Skipping incomplete session {} for {}", ts, symbol);
            continue;
        };

        let Some(timestamp) = Utc.timestamp_opt(*ts, 0).single() else {
            warn!("Skipping invalid timestamp {} for {}", ts, symbol);
            continue;
        };

        candles.push(Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    if candles.is_empty() {
        return Err(FetchError::EmptyData(symbol.to_string()));
    }

    let mut series = PriceSeries::new(symbol, candles);
    series.normalize();

    Ok((series, data.meta))
}

/// Map a response status to the body or a `FetchError`
///
/// Yahoo reports unknown symbols as 404 with a JSON error body, which the
/// parsers turn into `EmptyData`, so only 404 bodies are passed through.
/// Every other non-success status is an `HttpStatus` error.
pub(crate) fn check_response(
    status: StatusCode,
    url: &str,
    body: String,
) -> Result<String, FetchError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimitExceeded);
    }
    if status.is_success() || status == StatusCode::NOT_FOUND {
        return Ok(body);
    }
    Err(FetchError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
    })
}

/// Run `op` until it succeeds, fails permanently or runs out of retries
///
/// Attempt `n` (1-based) of a retry waits `backoff * n` first, so at most
/// `max_retries + 1` calls are made.
pub(crate) async fn with_retry<T, F, Fut>(
    max_retries: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = backoff * attempt;
                warn!(
                    "Request failed ({}), retry {}/{} in {:?}",
                    e, attempt, max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Validate the body of a getcrumb response
///
/// Without a session cookie Yahoo answers with an HTML page or a JSON error
/// instead of the crumb token.
pub(crate) fn parse_crumb(body: &str) -> Result<String, FetchError> {
    let crumb = body.trim();
    if crumb.is_empty()
        || crumb.len() > 64
        || crumb.starts_with('{')
        || crumb.starts_with('<')
        || crumb.chars().any(char::is_whitespace)
    {
        return Err(FetchError::ApiError {
            code: "Unauthorized".to_string(),
            message: "no crumb issued for this session".to_string(),
        });
    }
    Ok(crumb.to_string())
}

impl YahooClient {
    /// Create a client from data configuration
    pub fn with_config(config: &DataConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            summary_url: config.summary_url.trim_end_matches('/').to_string(),
            cookie_url: config.cookie_url.clone(),
            interval: config.interval.clone(),
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            crumb: Arc::new(Mutex::new(None)),
        })
    }

    /// GET `url` and return the body, retrying transient failures
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        with_retry(self.max_retries, self.retry_backoff, || self.get_once(url)).await
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        check_response(status, url, body)
    }

    /// Crumb for quoteSummary requests, fetched on first use
    async fn crumb(&self) -> Result<String, FetchError> {
        if let Some(crumb) = self.crumb.lock().ok().and_then(|c| c.clone()) {
            return Ok(crumb);
        }

        // The cookie host answers 404 but still sets the session cookie
        if let Err(e) = self.client.get(&self.cookie_url).send().await {
            debug!("Cookie request failed: {}", e);
        }

        let body = self
            .get_text(&format!("{}/v1/test/getcrumb", self.summary_url))
            .await?;
        let crumb = parse_crumb(&body)?;
        debug!("Obtained quoteSummary crumb");

        if let Ok(mut cached) = self.crumb.lock() {
            *cached = Some(crumb.clone());
        }
        Ok(crumb)
    }

    fn forget_crumb(&self) {
        if let Ok(mut cached) = self.crumb.lock() {
            *cached = None;
        }
    }

    fn profile_url(&self, symbol: &str, crumb: &str) -> Result<Url, FetchError> {
        Url::parse_with_params(
            &format!("{}/v10/finance/quoteSummary/{}", self.summary_url, symbol),
            &[("modules", PROFILE_MODULES), ("crumb", crumb)],
        )
        .map_err(|e| FetchError::ParseError(e.to_string()))
    }

    /// Fetch daily OHLCV history and instrument metadata
    ///
    /// # Arguments
    /// * `symbol` - Stock ticker symbol (e.g., "AAPL", "YPF")
    /// * `lookback` - Range to request (e.g., 2 years)
    pub async fn get_chart(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<(PriceSeries, ChartMeta), FetchError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range={}&interval={}&events=history",
            self.base_url,
            symbol,
            lookback.as_range(),
            self.interval
        );

        let body = self.get_text(&url).await?;
        let (series, meta) = parse_chart(symbol, &body)?;

        info!("Fetched {} sessions for {}", series.len(), symbol);

        Ok((series, meta))
    }

    /// Fetch company fundamentals
    ///
    /// A rejected crumb (401) is refreshed once before giving up.
    pub async fn get_profile(&self, symbol: &str) -> Result<CompanyProfile, FetchError> {
        let url = self.profile_url(symbol, &self.crumb().await?)?;

        let body = match self.get_text(url.as_str()).await {
            Err(FetchError::HttpStatus { status: 401, .. }) => {
                warn!("Crumb rejected for {}, requesting a new one", symbol);
                self.forget_crumb();
                let url = self.profile_url(symbol, &self.crumb().await?)?;
                self.get_text(url.as_str()).await?
            }
            other => other?,
        };

        CompanyProfile::from_quote_summary(symbol, &body)
    }
}

impl MarketDataProvider for YahooClient {
    async fn fetch_history(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, FetchError> {
        let (series, _) = self.get_chart(symbol, lookback).await?;
        Ok(series)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        let (series, meta) = self.get_chart(symbol, Lookback::Days(5)).await?;
        let fallback = Quote::from_series(&series)
            .ok_or_else(|| FetchError::EmptyData(symbol.to_string()))?;

        Ok(Quote {
            symbol: symbol.to_string(),
            last_price: meta.regular_market_price.unwrap_or(fallback.last_price),
            previous_close: meta
                .previous_close
                .or(meta.chart_previous_close)
                .unwrap_or(fallback.previous_close),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "currency": "USD", "regularMarketPrice": 191.5, "chartPreviousClose": 150.0},
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {"quote": [{
                    "open":   [187.15, 184.22, null],
                    "high":   [188.44, 185.88, 183.09],
                    "low":    [183.89, 183.43, 180.88],
                    "close":  [185.64, 184.25, 181.91],
                    "volume": [82488700, 58414500, 71983600]
                }]}
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_chart_skips_incomplete_sessions() {
        let (series, meta) = parse_chart("AAPL", CHART_BODY).unwrap();

        assert_eq!(series.symbol, "AAPL");
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![185.64, 184.25]);
        assert_eq!(series.candles[0].volume, 82_488_700.0);
        assert_eq!(meta.regular_market_price, Some(191.5));
        assert!(series.candles[0].timestamp < series.candles[1].timestamp);
    }

    #[test]
    fn test_parse_chart_not_found_is_empty() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("ZZZZ", body).unwrap_err();
        assert!(matches!(err, FetchError::EmptyData(s) if s == "ZZZZ"));
    }

    #[test]
    fn test_parse_chart_api_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        let err = parse_chart("AAPL", body).unwrap_err();
        assert!(matches!(err, FetchError::ApiError { .. }));
    }

    #[test]
    fn test_parse_chart_malformed() {
        let err = parse_chart("AAPL", "<html>oops</html>").unwrap_err();
        assert!(matches!(err, FetchError::ParseError(_)));
    }

    #[test]
    fn test_parse_chart_without_sessions() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"NEW"},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let err = parse_chart("NEW", body).unwrap_err();
        assert!(matches!(err, FetchError::EmptyData(_)));
    }

    const URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary/AAPL";

    #[test]
    fn test_check_response_passes_success_and_not_found() {
        let ok = check_response(StatusCode::OK, URL, "{}".to_string()).unwrap();
        assert_eq!(ok, "{}");

        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"delisted"}}}"#;
        let passed = check_response(StatusCode::NOT_FOUND, URL, body.to_string()).unwrap();
        assert!(matches!(
            parse_chart("ZZZZ", &passed).unwrap_err(),
            FetchError::EmptyData(_)
        ));
    }

    #[test]
    fn test_check_response_unauthorized_json_is_http_status() {
        let body = r#"{"finance":{"result":null,"error":{"code":"Unauthorized","description":"Invalid Crumb"}}}"#;
        let err = check_response(StatusCode::UNAUTHORIZED, URL, body.to_string()).unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 401, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_check_response_throttling_and_server_errors() {
        let err = check_response(StatusCode::TOO_MANY_REQUESTS, URL, String::new()).unwrap_err();
        assert!(matches!(err, FetchError::RateLimitExceeded));

        let err = check_response(StatusCode::SERVICE_UNAVAILABLE, URL, String::new()).unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 503, .. }));
        assert!(err.is_transient());

        let err = check_response(StatusCode::FORBIDDEN, URL, "<html></html>".to_string())
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(3, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::RateLimitExceeded)
        })
        .await;

        assert!(matches!(result, Err(FetchError::RateLimitExceeded)));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(3, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::EmptyData("ZZZZ".to_string()))
        })
        .await;

        assert!(matches!(result, Err(FetchError::EmptyData(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_retry(2, Duration::ZERO, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(FetchError::HttpStatus {
                    status: 502,
                    url: URL.to_string(),
                })
            } else {
                Ok("body")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_makes_one_attempt() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(0, Duration::ZERO, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::RateLimitExceeded)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_crumb() {
        assert_eq!(parse_crumb("aB3.xY/z9Q").unwrap(), "aB3.xY/z9Q");
        assert_eq!(parse_crumb("  Kq1Zx9vL0pe\n").unwrap(), "Kq1Zx9vL0pe");

        for body in ["", "<html>consent</html>", r#"{"finance":{"error":{}}}"#, "Too Many Requests"] {
            assert!(matches!(
                parse_crumb(body).unwrap_err(),
                FetchError::ApiError { .. }
            ));
        }
    }

    #[test]
    fn test_profile_url_encodes_crumb() {
        let client = YahooClient::with_config(&DataConfig::default()).unwrap();
        let url = client.profile_url("AAPL", "a/b+c").unwrap();

        assert_eq!(url.path(), "/v10/finance/quoteSummary/AAPL");
        let crumb = url
            .query_pairs()
            .find(|(k, _)| *k == "crumb")
            .map(|(_, v)| v.into_owned());
        assert_eq!(crumb.as_deref(), Some("a/b+c"));
        assert!(url.as_str().contains("crumb=a%2Fb%2Bc"));
    }
}
