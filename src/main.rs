use anyhow::Context;
use clap::Parser;
use renkobot::api::{BarSource, GateClient, GatePollingFeed, GateWsFeed, TickFeed};
use renkobot::config::{BotConfig, FeedKind, Timeframe};
use renkobot::execution::{OrderExecutor, PaperExecutor};
use renkobot::notify::{DiscordNotifier, LogNotifier, Notifier, NotifyLevel};
use renkobot::pipeline::StreamPipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Renko brick trend follower for Gate.io USDT futures
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Comma-separated contracts, overrides RENKO_SYMBOLS
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Candle interval for brick sizing, e.g. 1h
    #[arg(long)]
    timeframe: Option<String>,

    /// Use REST polling instead of the WebSocket ticker stream
    #[arg(long)]
    poll: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = load_config(&args)?;

    tracing::info!("RenkoBot starting");
    tracing::info!("  Symbols: {}", config.symbols.join(", "));
    tracing::info!("  Timeframe: {}", config.timeframe);
    tracing::info!(
        "  Brick size: {:?} ATR({}) x {}",
        config.volatility_method,
        config.volatility_period,
        config.volatility_multiplier
    );
    tracing::info!("  Sizing: {:?}", config.sizing_policy());

    let gate = GateClient::new(&config.rest_url).context("Failed to build Gate client")?;

    let mut notifier_task = None;
    let notifier: Arc<dyn Notifier> = match &config.discord_webhook_url {
        Some(url) => {
            let (discord, handle) =
                DiscordNotifier::spawn(url.clone()).context("Failed to start Discord notifier")?;
            notifier_task = Some(handle);
            Arc::new(discord)
        }
        None => Arc::new(LogNotifier),
    };

    let paper = Arc::new(PaperExecutor::new(config.paper_balance, config.taker_fee_rate));

    let feed: Arc<dyn TickFeed> = match config.feed {
        FeedKind::Websocket => Arc::new(GateWsFeed::new(
            config.ws_url.clone(),
            config.reconnect_backoff(),
        )),
        FeedKind::Polling => Arc::new(GatePollingFeed::new(
            gate.clone(),
            Duration::from_secs(config.poll_interval_secs.max(1)),
        )),
    };

    let mut multipliers = Vec::new();
    for symbol in &config.symbols {
        match gate.fetch_contract(symbol).await {
            Ok(info) => {
                tracing::info!("  {} contract multiplier: {}", symbol, info.quanto_multiplier);
                paper.set_contract_multiplier(symbol, info.quanto_multiplier);
                multipliers.push((symbol.clone(), info.quanto_multiplier));
            }
            Err(e) if e.is_fatal() => return Err(e).context("Contract lookup failed"),
            Err(e) => tracing::warn!("{}: contract lookup failed, assuming 1.0: {}", symbol, e),
        }
    }

    let bars: Arc<dyn BarSource> = Arc::new(gate);
    let executor: Arc<dyn OrderExecutor> = paper.clone();
    let mut pipeline =
        StreamPipeline::new(config.clone(), bars, feed, executor, notifier.clone());
    for (symbol, multiplier) in multipliers {
        pipeline = pipeline.with_contract_multiplier(symbol, multiplier);
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            shutdown.cancel();
        });
    }

    tracing::info!("Press Ctrl+C to stop");
    let result = pipeline.run(shutdown).await;

    match &result {
        Ok(reports) => {
            for report in reports {
                tracing::info!(
                    "{}: {:?} size {} entry {} uPnL {:.4}, {} bricks, {} position changes",
                    report.symbol,
                    report.position.side(),
                    report.position.size(),
                    report.position.entry_price(),
                    report.position.unrealized_pnl(),
                    report.bricks,
                    report.trades
                );
            }
            if let Ok(summary) = paper.summary() {
                notifier.notify(
                    NotifyLevel::Info,
                    &format!(
                        "Stopped. Balance {:.2}, {} closed trades, realized PnL {:.4}",
                        summary.balance, summary.trades, summary.realized_pnl
                    ),
                );
            }
        }
        Err(e) => notifier.notify(NotifyLevel::Error, &format!("Bot stopped on error: {}", e)),
    }

    // Let queued notifications go out before exiting
    drop(notifier);
    if let Some(handle) = notifier_task {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    result.context("Pipeline failed")?;
    tracing::info!("RenkoBot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("renkobot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(args: &Args) -> anyhow::Result<BotConfig> {
    let mut config = BotConfig::load().context("Failed to load configuration")?;

    if let Some(symbols) = &args.symbols {
        config.symbols = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
    }
    if let Some(timeframe) = &args.timeframe {
        config.timeframe = Timeframe::parse(timeframe)?;
    }
    if args.poll {
        config.feed = FeedKind::Polling;
    }

    config.validate()?;
    Ok(config)
}
