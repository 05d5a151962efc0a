//! Stock potential CLI
//!
//! Ranks a ticker universe by predicted 30-day upside and exposes the
//! per-ticker analysis, quotes, company search and profiles behind it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stock_potential::{
    config::{Config, ModelPolicy},
    data::{
        storage::save_series, CompanyDirectory, CsvProvider, FetchError, Lookback,
        MarketDataProvider, PriceSeries, Quote, YahooClient,
    },
    models::{FileModelStore, Horizon, InMemoryModelStore, ModelStore},
    scoring::{Analyzer, Ranking, RankingEngine, TickerAnalysis},
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "stock-potential")]
#[command(about = "Rank stocks by predicted price upside", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, default_value = "stock-potential.toml")]
    config: PathBuf,

    /// Verbosity level (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Read price history from CSV files in this directory instead of Yahoo
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank tickers by predicted upside
    Rank {
        /// Tickers to rank (defaults to the configured universe)
        tickers: Vec<String>,

        /// Number of entries to keep
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Model policy
        #[arg(long, value_enum)]
        policy: Option<ModelPolicy>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Analyze a single ticker over every horizon
    Analyze {
        /// Ticker symbol (e.g., AAPL)
        ticker: String,

        /// Also run walk-forward cross-validation with this many folds
        #[arg(long)]
        cv: Option<usize>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show last price and day change
    Quotes {
        /// Tickers (defaults to the configured universe)
        tickers: Vec<String>,
    },

    /// Search S&P 500 companies by name
    Search {
        /// Part of the company name
        query: String,

        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Show company fundamentals
    Profile {
        /// Ticker symbol
        ticker: String,
    },

    /// Download price history to CSV
    Fetch {
        /// Tickers (defaults to the configured universe)
        tickers: Vec<String>,

        /// History range (e.g., 6mo, 2y, max)
        #[arg(long)]
        lookback: Option<Lookback>,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: PathBuf,
    },

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Price source selected at startup
enum Source {
    Yahoo(YahooClient),
    Csv(CsvProvider),
}

impl MarketDataProvider for Source {
    async fn fetch_history(
        &self,
        symbol: &str,
        lookback: Lookback,
    ) -> Result<PriceSeries, FetchError> {
        match self {
            Source::Yahoo(client) => client.fetch_history(symbol, lookback).await,
            Source::Csv(provider) => provider.fetch_history(symbol, lookback).await,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, FetchError> {
        match self {
            Source::Yahoo(client) => client.fetch_quote(symbol).await,
            Source::Csv(provider) => provider.fetch_quote(symbol).await,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path)
    } else {
        Ok(Config::default())
    }
}

fn source(config: &Config) -> Result<Source> {
    match &config.data.csv_dir {
        Some(dir) => Ok(Source::Csv(CsvProvider::new(dir))),
        None => Ok(Source::Yahoo(
            YahooClient::with_config(&config.data).context("building HTTP client")?,
        )),
    }
}

fn analyzer(config: Config) -> Analyzer {
    let needs_disk = config.model.persist || config.model.policy != ModelPolicy::PerTicker;
    let store: Arc<dyn ModelStore> = if needs_disk {
        Arc::new(FileModelStore::new(&config.model.store_dir))
    } else {
        Arc::new(InMemoryModelStore::new())
    };
    Analyzer::with_store(config, store)
}

fn or_universe(tickers: Vec<String>, config: &Config) -> Vec<String> {
    if tickers.is_empty() {
        config.ranking.universe.clone()
    } else {
        tickers.into_iter().map(|t| t.to_uppercase()).collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data.csv_dir = Some(dir);
    }

    // Setup logging
    let level = parse_level(cli.log_level.as_deref().unwrap_or(&config.logging.level));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Rank {
            tickers,
            top,
            policy,
            json,
        } => {
            if let Some(policy) = policy {
                config.model.policy = policy;
            }
            if let Some(top) = top {
                config.ranking.top_n = top;
            }
            let universe = or_universe(tickers, &config);
            let engine = RankingEngine::new(source(&config)?, analyzer(config));
            let ranking = engine.rank(&universe).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&ranking)?);
            } else {
                print_ranking(&ranking);
            }
        }

        Commands::Analyze { ticker, cv, json } => {
            let ticker = ticker.to_uppercase();
            let lookback = config.data.lookback;
            let horizon = config.ranking.horizon;
            let provider = source(&config)?;
            let analyzer = analyzer(config);

            let series = provider
                .fetch_history(&ticker, lookback)
                .await
                .with_context(|| format!("fetching {}", ticker))?;
            let analysis = analyzer.analyze_series(&series)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_analysis(&analysis);
            }

            if let Some(folds) = cv {
                let result = analyzer.cross_validate(&series, horizon, folds)?;
                println!("\nWalk-forward CV ({} folds, {}):", result.fold_metrics.len(), horizon);
                println!("   MAE: {:.2} ± {:.2}", result.mean_mae, result.std_mae);
                if let Some(acc) = result.mean_directional_accuracy {
                    println!("   Directional accuracy: {:.1}%", acc);
                }
            }
        }

        Commands::Quotes { tickers } => {
            let provider = source(&config)?;
            for ticker in or_universe(tickers, &config) {
                match provider.fetch_quote(&ticker).await {
                    Ok(quote) => println!(
                        "{:<8} {:>10.2} {:>+8.2}% {}",
                        quote.symbol,
                        quote.last_price,
                        quote.change_pct(),
                        if quote.is_up() { "▲" } else { "▼" }
                    ),
                    Err(e) => println!("{:<8} unavailable: {}", ticker, e),
                }
            }
        }

        Commands::Search { query, limit } => {
            let src = &config.data.companies_source;
            let directory = if src.starts_with("http://") || src.starts_with("https://") {
                CompanyDirectory::download(src).await?
            } else {
                CompanyDirectory::from_path(Path::new(src))?
            };

            if let Some(company) = directory.by_symbol(&query) {
                println!("Symbol match: {}", company.label());
            }
            let matches = directory.search(&query);
            if matches.is_empty() {
                println!("No companies match '{}'", query);
            }
            for company in matches.into_iter().take(limit) {
                println!(
                    "{:<40} [{}]",
                    company.label(),
                    company.sector.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Profile { ticker } => {
            let client = YahooClient::with_config(&config.data)?;
            let profile = client.get_profile(&ticker.to_uppercase()).await?;
            let fmt = |v: Option<f64>| v.map_or("N/A".to_string(), |v| format!("{:.2}", v));

            println!("{} | {} / {}", profile.symbol, profile.sector, profile.industry);
            println!("   Forward P/E:      {}", fmt(profile.forward_pe));
            println!("   Trailing P/E:     {}", fmt(profile.trailing_pe));
            println!("   ROE:              {}", fmt(profile.return_on_equity));
            println!("   Free cash flow:   {}", fmt(profile.free_cashflow));
            println!("   Profit margins:   {}", fmt(profile.profit_margins));
            println!("   Debt to equity:   {}", fmt(profile.debt_to_equity));
            println!("   Market cap:       {}", fmt(profile.market_cap));
        }

        Commands::Fetch {
            tickers,
            lookback,
            output,
        } => {
            let lookback = lookback.unwrap_or(config.data.lookback);
            let client = YahooClient::with_config(&config.data)?;
            std::fs::create_dir_all(&output)
                .with_context(|| format!("creating {}", output.display()))?;

            for ticker in or_universe(tickers, &config) {
                match client.fetch_history(&ticker, lookback).await {
                    Ok(series) => {
                        let path = output.join(format!("{}.csv", ticker));
                        save_series(&path, &series)?;
                        info!("Saved {} sessions to {}", series.len(), path.display());
                    }
                    Err(e) => eprintln!("{}: {}", ticker, e),
                }
            }
        }

        Commands::InitConfig { force } => {
            if cli.config.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    cli.config.display()
                );
            }
            Config::create_default(&cli.config)?;
            println!("Wrote {}", cli.config.display());
        }
    }

    Ok(())
}

fn print_ranking(ranking: &Ranking) {
    println!(
        "{:<4} {:<8} {:>12} {:>12} {:>9}",
        "#", "Ticker", "Current", "Predicted", "Upside"
    );
    println!("{}", "-".repeat(49));
    for (i, entry) in ranking.entries.iter().enumerate() {
        println!(
            "{:<4} {:<8} {:>12.2} {:>12.2} {:>+8.2}%",
            i + 1,
            entry.ticker,
            entry.current_price,
            entry.predicted_price,
            entry.upside_pct
        );
    }

    if !ranking.skipped.is_empty() {
        println!("\nSkipped:");
        for skipped in &ranking.skipped {
            println!("   {:<8} {}: {}", skipped.ticker, skipped.kind, skipped.reason);
        }
    }
}

fn print_analysis(analysis: &TickerAnalysis) {
    let row = &analysis.latest;
    println!(
        "{} as of {} | close {:.2}",
        analysis.ticker,
        analysis.as_of.format("%Y-%m-%d"),
        analysis.current_price
    );
    println!(
        "   RSI {:.1} | MA50 {:.2} | MA200 {:.2} | MACD {:.3}",
        row.rsi, row.ma_short, row.ma_long, row.macd
    );

    for forecast in &analysis.forecasts {
        println!(
            "   {:>4}: {:.2} ({:+.2}%) MAE {} | train {} / test {}",
            forecast.horizon.to_string(),
            forecast.predicted_price,
            forecast.upside_pct,
            forecast
                .mae
                .map_or("N/A".to_string(), |mae| format!("{:.2}", mae)),
            forecast.train_rows,
            forecast.test_rows
        );
        if !forecast.top_features.is_empty() {
            let drivers: Vec<String> = forecast
                .top_features
                .iter()
                .map(|(name, share)| format!("{} {:.0}%", name, share * 100.0))
                .collect();
            println!(
                "         {} trees, top features: {}",
                forecast.trees,
                drivers.join(", ")
            );
        }
    }
    for skipped in &analysis.skipped_horizons {
        println!(
            "   {:>4}: skipped ({})",
            skipped.horizon.to_string(),
            skipped.reason
        );
    }

    if analysis.forecast(Horizon::DAYS_30).is_none() {
        println!("   No 30-day forecast available");
    }
}
