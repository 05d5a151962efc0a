//! Ticker universe and company directory
//!
//! The default ranking universe is ten US large caps plus ten Latin American
//! ADRs. The company directory wraps the S&P 500 constituents list so a
//! ticker can be looked up by (part of) its company name.

use super::provider::FetchError;
use csv::Reader;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// US large caps scored by default
pub const US_LARGE_CAPS: [&str; 10] = [
    "AAPL", "MSFT", "TSLA", "AMZN", "NVDA", "GOOGL", "META", "JPM", "DIS", "MCD",
];

/// Latin American ADRs scored by default
pub const LATAM_ADRS: [&str; 10] = [
    "YPF", "GGAL", "BMA", "PAM", "CEPU", "SUPV", "TX", "TGS", "BBAR", "MELI",
];

/// Public S&P 500 constituents CSV
pub const SP500_CONSTITUENTS_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/master/data/constituents.csv";

/// Default ranking universe, in iteration order
pub fn default_universe() -> Vec<String> {
    US_LARGE_CAPS
        .iter()
        .chain(LATAM_ADRS.iter())
        .map(|s| s.to_string())
        .collect()
}

/// One row of the constituents list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Security")]
    pub name: String,
    #[serde(rename = "GICS Sector", default)]
    pub sector: Option<String>,
}

impl Company {
    /// Display label, e.g. "Apple Inc. (AAPL)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.symbol)
    }
}

/// Searchable list of companies
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: Vec<Company>,
    search_keys: Vec<String>,
}

impl CompanyDirectory {
    pub fn new(companies: Vec<Company>) -> Self {
        let search_keys = companies.iter().map(|c| c.name.to_lowercase()).collect();
        Self {
            companies,
            search_keys,
        }
    }

    /// Parse a constituents CSV (`Symbol,Security,GICS Sector,...`)
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FetchError> {
        let mut reader = Reader::from_reader(reader);
        let companies = reader
            .deserialize()
            .collect::<Result<Vec<Company>, csv::Error>>()?;
        Ok(Self::new(companies))
    }

    pub fn from_path(path: &Path) -> Result<Self, FetchError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Download the constituents list
    pub async fn download(url: &str) -> Result<Self, FetchError> {
        let response = reqwest::get(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        let directory = Self::from_reader(body.as_bytes())?;
        info!("Loaded {} companies from {}", directory.len(), url);
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Companies whose name contains `query`, case-insensitively
    ///
    /// A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<&Company> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.companies
            .iter()
            .zip(self.search_keys.iter())
            .filter(|(_, key)| key.contains(&query))
            .map(|(company, _)| company)
            .collect()
    }

    /// Exact (case-insensitive) symbol lookup
    pub fn by_symbol(&self, symbol: &str) -> Option<&Company> {
        self.companies
            .iter()
            .find(|c| c.symbol.eq_ignore_ascii_case(symbol.trim()))
    }
}
