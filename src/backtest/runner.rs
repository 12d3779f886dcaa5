use std::sync::Arc;

use crate::backtest::metrics::BacktestMetrics;
use crate::config::BotConfig;
use crate::execution::{OrderExecutor, PaperExecutor, PositionEngine};
use crate::models::{OhlcvBar, Tick};
use crate::notify::{LogNotifier, Notifier};
use crate::pipeline::SymbolLane;
use crate::renko::{RenkoSettings, SymbolState};
use crate::Result;

/// Replays history through the live lane code against a paper venue
pub struct BacktestRunner {
    config: BotConfig,
}

impl BacktestRunner {
    pub fn new(config: BotConfig) -> Self {
        Self { config }
    }

    /// Run a backtest for one symbol
    ///
    /// # Arguments
    /// * `history` - Bars used to size bricks and build the initial chart
    /// * `ticks` - Prices replayed afterwards, as the live feed would deliver them
    ///
    /// Any position still open at the end is closed at the last price so
    /// every trade shows up in the metrics.
    pub async fn run(
        &self,
        symbol: &str,
        history: Vec<OhlcvBar>,
        ticks: Vec<Tick>,
    ) -> Result<BacktestMetrics> {
        tracing::info!(
            "Starting backtest for {}: {} history bars, {} ticks",
            symbol,
            history.len(),
            ticks.len()
        );

        let paper = Arc::new(PaperExecutor::new(
            self.config.paper_balance,
            self.config.taker_fee_rate,
        ));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let engine = PositionEngine::new(
            symbol,
            paper.clone(),
            notifier.clone(),
            self.config.sizing_policy(),
            1,
        );
        let state = SymbolState::new(symbol, RenkoSettings::from_config(&self.config));
        let mut lane = SymbolLane::new(state, engine, notifier);

        lane.bootstrap(history, self.config.align_on_startup).await?;

        for tick in ticks {
            lane.on_tick(tick).await?;
        }

        if paper.current_position(symbol).await?.is_some() {
            let fill = paper.close_position(symbol).await?;
            tracing::info!("Settled open position at {}", fill.price);
        }

        let report = lane.into_report();
        let summary = paper.summary()?;
        tracing::info!(
            "Backtest finished: {} bricks, {} position changes, balance {:.2}",
            report.bricks,
            report.trades,
            summary.balance
        );

        Ok(BacktestMetrics::from_trades(
            &paper.trades(),
            self.config.paper_balance,
            summary.balance,
        ))
    }

    /// Run and print a report
    pub async fn run_and_report(
        &self,
        symbol: &str,
        history: Vec<OhlcvBar>,
        ticks: Vec<Tick>,
        label: &str,
    ) -> Result<BacktestMetrics> {
        println!("\n--- {} ---", label);
        let metrics = self.run(symbol, history, ticks).await?;
        metrics.print_report();
        Ok(metrics)
    }
}
