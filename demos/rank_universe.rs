//! Example: Ranking a ticker universe by predicted 30-day upside
//!
//! Run with: cargo run --example rank_universe [TICKER...]

use anyhow::Result;
use stock_potential::{Analyzer, Config, RankingEngine, YahooClient};

#[tokio::main]
async fn main() -> Result<()> {
    println!("Universe Ranking Example");
    println!("{}", "=".repeat(40));

    let mut config = Config::default();
    config.ranking.top_n = 5;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let universe = if args.is_empty() {
        config.ranking.universe.clone()
    } else {
        args.iter().map(|t| t.to_uppercase()).collect()
    };

    println!("\n📥 Scoring {} tickers over {} of history...", universe.len(), config.data.lookback);
    let client = YahooClient::with_config(&config.data)?;
    let engine = RankingEngine::new(client, Analyzer::new(config));
    let ranking = engine.rank(&universe).await;

    println!("\n🏆 Top {} by 30-day upside:", ranking.entries.len());
    for (i, entry) in ranking.entries.iter().enumerate() {
        println!(
            "   {}. {:<6} ${:>9.2} -> ${:>9.2} ({:+.2}%)",
            i + 1,
            entry.ticker,
            entry.current_price,
            entry.predicted_price,
            entry.upside_pct
        );
    }

    if !ranking.skipped.is_empty() {
        println!("\n⚠️  Skipped:");
        for skipped in &ranking.skipped {
            println!("   {:<6} {}: {}", skipped.ticker, skipped.kind, skipped.reason);
        }
    }

    Ok(())
}
