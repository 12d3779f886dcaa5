use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{BarSource, TickFeed};
use crate::config::BotConfig;
use crate::execution::{OrderExecutor, PositionEngine};
use crate::models::{OhlcvBar, Tick};
use crate::notify::{Notifier, NotifyLevel};
use crate::renko::{RenkoSettings, SymbolState};
use crate::Result;

use super::{LaneReport, SymbolLane};

const LANE_QUEUE: usize = 1024;
const FEED_QUEUE: usize = 4096;

/// Bootstraps every symbol, then routes live ticks to per-symbol lanes
pub struct StreamPipeline {
    config: BotConfig,
    bars: Arc<dyn BarSource>,
    feed: Arc<dyn TickFeed>,
    executor: Arc<dyn OrderExecutor>,
    notifier: Arc<dyn Notifier>,
    contract_multipliers: HashMap<String, f64>,
}

impl StreamPipeline {
    pub fn new(
        config: BotConfig,
        bars: Arc<dyn BarSource>,
        feed: Arc<dyn TickFeed>,
        executor: Arc<dyn OrderExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            bars,
            feed,
            executor,
            notifier,
            contract_multipliers: HashMap::new(),
        }
    }

    pub fn with_contract_multiplier(mut self, symbol: impl Into<String>, multiplier: f64) -> Self {
        self.contract_multipliers.insert(symbol.into(), multiplier);
        self
    }

    /// Fetch history with the configured retry policy.
    ///
    /// A symbol whose history cannot be loaded still gets a lane; it simply
    /// waits for live bars before sizing bricks.
    async fn fetch_history(&self, symbol: &str) -> Result<Vec<OhlcvBar>> {
        let retry = self.config.fetch_retry();
        let label = format!("{} history fetch", symbol);
        let timeframe = self.config.timeframe;
        let count = self.config.bar_count;

        let result = retry
            .run(&label, || self.bars.fetch_bars(symbol, timeframe, count))
            .await;

        match result {
            Ok(bars) => Ok(bars),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("{}: giving up on history: {}", symbol, e);
                self.notifier.notify(
                    NotifyLevel::Error,
                    &format!("{}: history unavailable, starting without it: {}", symbol, e),
                );
                Ok(Vec::new())
            }
        }
    }

    /// Build and bootstrap one lane per configured symbol
    pub async fn build_lanes(&self) -> Result<Vec<SymbolLane>> {
        let settings = RenkoSettings::from_config(&self.config);
        let mut lanes = Vec::with_capacity(self.config.symbols.len());

        for symbol in &self.config.symbols {
            let history = self.fetch_history(symbol).await?;
            info!("{}: loaded {} bars", symbol, history.len());

            let multiplier = self.contract_multipliers.get(symbol).copied().unwrap_or(1.0);
            let engine = PositionEngine::new(
                symbol.clone(),
                self.executor.clone(),
                self.notifier.clone(),
                self.config.sizing_policy(),
                self.config.symbols.len(),
            )
            .with_contract_multiplier(multiplier);

            let mut lane = SymbolLane::new(
                SymbolState::new(symbol.clone(), settings),
                engine,
                self.notifier.clone(),
            );
            lane.bootstrap(history, self.config.align_on_startup).await?;
            lanes.push(lane);
        }

        Ok(lanes)
    }

    /// Run until `shutdown` fires, the feed ends, or a lane hits a fatal
    /// error. Returns each lane's final state.
    ///
    /// When the feed ends on its own, lanes finish the ticks already queued
    /// for them. On shutdown they stop after the tick in hand.
    pub async fn run(self, shutdown: CancellationToken) -> Result<Vec<LaneReport>> {
        let lanes = self.build_lanes().await?;
        self.notifier.notify(
            NotifyLevel::Info,
            &format!("Trading started for {}", self.config.symbols.join(", ")),
        );

        let mut routes: HashMap<String, mpsc::Sender<Tick>> = HashMap::new();
        let mut handles: Vec<JoinHandle<Result<LaneReport>>> = Vec::new();

        for lane in lanes {
            let (tx, rx) = mpsc::channel(LANE_QUEUE);
            routes.insert(lane.symbol().to_string(), tx);

            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let result = lane.run(rx, token.clone()).await;
                if matches!(&result, Err(e) if e.is_fatal()) {
                    token.cancel();
                }
                result
            }));
        }

        let (feed_tx, mut feed_rx) = mpsc::channel(FEED_QUEUE);
        let feed = self.feed.clone();
        let symbols = self.config.symbols.clone();
        let feed_token = shutdown.child_token();
        let feed_handle = {
            let token = feed_token.clone();
            tokio::spawn(async move { feed.run(&symbols, feed_tx, token).await })
        };

        route_ticks(&mut feed_rx, &mut routes, &shutdown).await;

        // Closing the routes lets lanes drain what is queued and exit
        feed_token.cancel();
        drop(routes);
        drop(feed_rx);

        let mut first_error = None;
        match feed_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Tick feed failed: {}", e);
                first_error.get_or_insert(e);
            }
            Err(e) => error!("Tick feed task panicked: {}", e),
        }

        let mut reports = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => {
                    error!("Lane failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => error!("Lane task panicked: {}", e),
            }
        }

        if let Some(e) = first_error {
            if e.is_fatal() {
                return Err(e);
            }
        }

        info!("Pipeline stopped with {} lanes", reports.len());
        Ok(reports)
    }
}

/// Forward feed ticks to their lanes until shutdown or the feed closes
///
/// Never waits on a lane. A lane whose queue is full (stuck on an order
/// call) loses ticks until it catches up; the other symbols keep flowing.
async fn route_ticks(
    feed_rx: &mut mpsc::Receiver<Tick>,
    routes: &mut HashMap<String, mpsc::Sender<Tick>>,
    shutdown: &CancellationToken,
) {
    let mut dropped: HashMap<String, u64> = HashMap::new();

    loop {
        let tick = tokio::select! {
            biased;
            () = shutdown.cancelled() => return,
            tick = feed_rx.recv() => match tick {
                Some(tick) => tick,
                None => {
                    warn!("Tick feed closed");
                    return;
                }
            },
        };

        let Some(route) = routes.get(&tick.symbol) else {
            debug!("No lane for {}, dropping tick", tick.symbol);
            continue;
        };

        let symbol = tick.symbol.clone();
        match route.try_send(tick) {
            Ok(()) => {
                if let Some(count) = dropped.remove(&symbol) {
                    info!("{}: lane caught up after dropping {} ticks", symbol, count);
                }
            }
            Err(TrySendError::Full(_)) => {
                let count = dropped.entry(symbol.clone()).or_insert(0);
                if *count == 0 {
                    warn!("{}: lane queue full, dropping ticks until it drains", symbol);
                }
                *count += 1;
            }
            Err(TrySendError::Closed(_)) => {
                warn!("{}: lane gone, no longer routing", symbol);
                routes.remove(&symbol);
                if routes.is_empty() {
                    return;
                }
            }
        }
    }
}

