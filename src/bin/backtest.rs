use anyhow::Context;
use clap::Parser;
use renkobot::backtest::{
    closes_as_ticks, load_bars_csv, BacktestMetrics, BacktestRunner, MarketScenario,
    SyntheticDataGenerator,
};
use renkobot::config::BotConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Replay candle history through the Renko bot against a paper account
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Contract name used in logs and the paper ledger
    #[arg(long, default_value = "BTC_USDT")]
    symbol: String,

    /// Bars for brick sizing and the initial chart (t,o,h,l,c,v)
    #[arg(long, requires = "ticks")]
    history: Option<PathBuf>,

    /// Finer bars whose closes are replayed as live ticks
    #[arg(long, requires = "history")]
    ticks: Option<PathBuf>,

    /// Seed for the synthetic scenarios run when no CSV is given
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Run a single synthetic scenario (uptrend, downtrend, sideways, volatile)
    #[arg(long, conflicts_with = "history")]
    scenario: Option<String>,

    /// Starting price of the synthetic series
    #[arg(long, default_value_t = 150.0)]
    base_price: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("renkobot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = BotConfig::load().context("Failed to load configuration")?;
    let runner = BacktestRunner::new(config.clone());

    if let (Some(history), Some(ticks)) = (&args.history, &args.ticks) {
        let history = load_bars_csv(history)
            .with_context(|| format!("Failed to read {}", history.display()))?;
        let fine = load_bars_csv(ticks)
            .with_context(|| format!("Failed to read {}", ticks.display()))?;

        runner
            .run_and_report(
                &args.symbol,
                history,
                closes_as_ticks(&args.symbol, &fine),
                &args.symbol,
            )
            .await?;
        return Ok(());
    }

    println!("\n=== RENKOBOT SYNTHETIC BACKTESTS ===");

    let mut scenarios = vec![
        (MarketScenario::Uptrend, "Uptrend"),
        (MarketScenario::Downtrend, "Downtrend"),
        (MarketScenario::Sideways, "Sideways (mean-reverting)"),
        (MarketScenario::Volatile, "Volatile"),
    ];
    if let Some(name) = &args.scenario {
        let wanted = MarketScenario::parse(name)
            .with_context(|| format!("Unknown scenario {:?}", name))?;
        scenarios.retain(|(scenario, _)| *scenario == wanted);
    }
    let interval = config.timeframe.seconds() as i64;
    let warmup = config.bar_count.min(500);

    let mut all_metrics = Vec::new();
    for (scenario, name) in scenarios {
        let mut generator = SyntheticDataGenerator::new(args.seed).with_base_price(args.base_price);
        let bars = generator.generate(scenario, warmup + 1000, interval);
        let (history, live) = bars.split_at(warmup);

        match runner
            .run_and_report("SYNTH", history.to_vec(), closes_as_ticks("SYNTH", live), name)
            .await
        {
            Ok(metrics) => all_metrics.push((name, metrics)),
            Err(e) => eprintln!("Backtest failed for {}: {}", name, e),
        }
    }

    print_summary_comparison(&all_metrics);
    Ok(())
}

fn print_summary_comparison(results: &[(&str, BacktestMetrics)]) {
    println!("\n=== SCENARIO COMPARISON ===\n");
    println!(
        "{:<30} {:>10} {:>10} {:>8} {:>8}",
        "Scenario", "P&L", "Return%", "Trades", "Win%"
    );
    println!("{}", "-".repeat(70));

    for (name, metrics) in results {
        println!(
            "{:<30} {:>10.2} {:>10.2} {:>8} {:>8.1}",
            name,
            metrics.total_pnl,
            metrics.total_return_pct,
            metrics.total_trades,
            metrics.win_rate
        );
    }
    println!();
}
