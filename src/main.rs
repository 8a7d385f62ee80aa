mod aggregator;
mod calendar;
mod config;
mod error;
mod greeks;
mod kite_client;
mod logging;
mod models;
mod pipeline;
mod resolver;
mod sink;
mod source;

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use config::TrackerConfig;
use kite_client::KiteClient;
use pipeline::GreeksPipeline;
use sink::BaselineOutcome;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    println!("{}", "=".repeat(60).blue());
    println!("{}", "Option Greeks Sentiment Tracker".green().bold());
    println!("{}", "=".repeat(60).blue());
    println!();

    let now = Utc::now().with_timezone(&calendar::ist());

    // Step 1: Configuration
    println!("{}", "Step 1: Loading configuration...".cyan());
    let cfg =
        TrackerConfig::from_env().map_err(|e| error::StageError::Config(format!("{e:#}")))?;
    println!(
        "{} Underlyings: {}",
        "✓".green(),
        cfg.underlyings.join(", ").yellow()
    );
    println!(
        "{} Delta band: [{}, {}]  rate: {}",
        "✓".green(),
        cfg.delta_min,
        cfg.delta_max,
        cfg.risk_free_rate
    );
    println!();

    // Weekend/holiday runs exit cleanly with no row written
    if !calendar::is_trading_day(now.date_naive()) {
        println!("{} Market is closed today - nothing to do", "ℹ".blue());
        return Ok(());
    }

    // Step 2: Run the pipeline once
    println!("{}", "Step 2: Running pipeline...".cyan());
    let client = KiteClient::new(&cfg)?;
    let pipeline = GreeksPipeline::new(cfg, client);

    let start_time = std::time::Instant::now();
    let summary = pipeline.run(now).await?;
    let elapsed = start_time.elapsed();

    // Step 3: Summary
    println!();
    println!("{}", "=".repeat(60).blue());
    println!("{}", "Summary".cyan().bold());
    println!("{}", "=".repeat(60).blue());
    println!(
        "{} Instruments priced: {} / {}",
        "✓".green(),
        summary.instruments_priced,
        summary.instruments_considered
    );
    for entry in &summary.row.entries {
        println!(
            "  {} {} → CE Δ {:.2}  PE Δ {:.2}  CE vega {:.2}  PE vega {:.2}",
            "✓".green(),
            entry.underlying.yellow(),
            entry.ce.delta,
            entry.pe.delta,
            entry.ce.vega,
            entry.pe.vega
        );
    }
    match summary.baseline {
        BaselineOutcome::Set => {
            println!("{} Opening baseline captured for today", "✓".green())
        }
        BaselineOutcome::AlreadySet => {
            println!("{} Opening baseline already set for today", "ℹ".blue())
        }
    }
    if summary.archived > 0 {
        println!("{} Archived {} old rows", "✓".green(), summary.archived);
    }
    println!("{} Time taken: {:.2}s", "⏱".yellow(), elapsed.as_secs_f64());
    println!();
    println!("{}", "=".repeat(60).blue());
    println!("{}", "Done!".green().bold());
    println!("{}", "=".repeat(60).blue());

    Ok(())
}
