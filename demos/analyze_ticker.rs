//! Example: Forecasting one ticker over every horizon
//!
//! Run with: cargo run --example analyze_ticker [TICKER]

use anyhow::Result;
use stock_potential::{
    data::Lookback, Analyzer, Config, Horizon, MarketDataProvider, YahooClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    println!("Ticker Analysis Example");
    println!("{}", "=".repeat(40));

    let ticker = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "AAPL".to_string())
        .to_uppercase();
    let config = Config::default();
    let client = YahooClient::with_config(&config.data)?;

    // Fetch history
    println!("\n📥 Fetching {} ({})...", ticker, Lookback::Years(2));
    let series = client.fetch_history(&ticker, Lookback::Years(2)).await?;
    println!("   Fetched {} sessions", series.len());

    // Fit one model per horizon
    let analyzer = Analyzer::new(config);
    let analysis = analyzer.analyze_series(&series)?;

    println!("\n📊 Latest indicators ({}):", analysis.as_of.format("%Y-%m-%d"));
    println!("   Close:  ${:.2}", analysis.current_price);
    println!("   RSI:    {:.1}", analysis.latest.rsi);
    println!("   MA50:   {:.2}", analysis.latest.ma_short);
    println!("   MA200:  {:.2}", analysis.latest.ma_long);
    println!("   MACD:   {:.3}", analysis.latest.macd);

    println!("\n🔮 Forecasts:");
    for forecast in &analysis.forecasts {
        println!(
            "   {:>4}: ${:.2} ({:+.2}%), held-out MAE {}",
            forecast.horizon.to_string(),
            forecast.predicted_price,
            forecast.upside_pct,
            forecast
                .mae
                .map_or("N/A".to_string(), |mae| format!("{:.2}", mae))
        );
        for (name, share) in &forecast.top_features {
            println!("          {:<12} {:.1}%", name, share * 100.0);
        }
    }
    for skipped in &analysis.skipped_horizons {
        println!("   {:>4}: skipped ({})", skipped.horizon.to_string(), skipped.reason);
    }

    // Walk-forward check of the 30-day model
    println!("\n🔁 Walk-forward validation (30d, 4 folds):");
    match analyzer.cross_validate(&series, Horizon::DAYS_30, 4) {
        Ok(cv) => println!("   MAE: {:.2} ± {:.2}", cv.mean_mae, cv.std_mae),
        Err(e) => println!("   unavailable: {}", e),
    }

    // Fundamentals
    println!("\n🏢 Profile:");
    match client.get_profile(&ticker).await {
        Ok(profile) => {
            println!("   {} / {}", profile.sector, profile.industry);
            if let Some(pe) = profile.forward_pe {
                println!("   Forward P/E: {:.2}", pe);
            }
        }
        Err(e) => println!("   unavailable: {}", e),
    }

    Ok(())
}
