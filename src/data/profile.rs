//! Typed company fundamentals
//!
//! Only the fields the analysis consumes are kept. Anything the upstream
//! response omits falls back to a defined default instead of a missing key.

use super::provider::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sector/industry label used when upstream does not report one
pub const UNKNOWN: &str = "Unknown";

/// Company fundamentals with explicit defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub symbol: String,
    pub sector: String,
    pub industry: String,
    pub forward_pe: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub free_cashflow: Option<f64>,
    pub profit_margins: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub market_cap: Option<f64>,
}

impl CompanyProfile {
    /// Profile with every field at its default
    pub fn unknown(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            sector: UNKNOWN.to_string(),
            industry: UNKNOWN.to_string(),
            forward_pe: None,
            trailing_pe: None,
            return_on_equity: None,
            free_cashflow: None,
            profit_margins: None,
            debt_to_equity: None,
            market_cap: None,
        }
    }

    /// Parse a quoteSummary response
    ///
    /// Numeric fields arrive as `{"raw": 1.23, "fmt": "1.23"}` objects; plain
    /// numbers are accepted as well. Session errors such as an invalid crumb
    /// come back under `finance.error` and are reported as `ApiError`.
    pub fn from_quote_summary(symbol: &str, body: &str) -> Result<Self, FetchError> {
        let root: Value =
            serde_json::from_str(body).map_err(|e| FetchError::ParseError(e.to_string()))?;

        if let Some(error) = api_error(&root["finance"]) {
            return Err(error);
        }

        let summary = root
            .get("quoteSummary")
            .filter(|s| s.is_object())
            .ok_or_else(|| FetchError::ParseError("missing quoteSummary object".to_string()))?;

        if let Some(error) = api_error(summary) {
            return Err(match error {
                FetchError::ApiError { code, .. } if code.eq_ignore_ascii_case("Not Found") => {
                    FetchError::EmptyData(symbol.to_string())
                }
                other => other,
            });
        }

        let result = summary["result"]
            .get(0)
            .ok_or_else(|| FetchError::EmptyData(symbol.to_string()))?;

        let asset = &result["assetProfile"];
        let financial = &result["financialData"];
        let stats = &result["defaultKeyStatistics"];
        let detail = &result["summaryDetail"];

        let text = |v: &Value| {
            v.as_str()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        Ok(Self {
            symbol: symbol.to_string(),
            sector: text(&asset["sector"]),
            industry: text(&asset["industry"]),
            forward_pe: raw(&stats["forwardPE"]).or_else(|| raw(&detail["forwardPE"])),
            trailing_pe: raw(&detail["trailingPE"]),
            return_on_equity: raw(&financial["returnOnEquity"]),
            free_cashflow: raw(&financial["freeCashflow"]),
            profit_margins: raw(&financial["profitMargins"])
                .or_else(|| raw(&stats["profitMargins"])),
            debt_to_equity: raw(&financial["debtToEquity"]),
            market_cap: raw(&detail["marketCap"]),
        })
    }
}

/// `ApiError` for an envelope carrying a non-null `error` member
fn api_error(envelope: &Value) -> Option<FetchError> {
    let error = envelope.get("error").filter(|e| !e.is_null())?;
    Some(FetchError::ApiError {
        code: error["code"].as_str().unwrap_or("unknown").to_string(),
        message: error["description"].as_str().unwrap_or_default().to_string(),
    })
}

fn raw(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("raw").and_then(Value::as_f64),
        _ => None,
    }
}
