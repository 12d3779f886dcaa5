use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::BotError;
use crate::execution::{PositionEngine, PositionRecord, TradeAction};
use crate::models::{OhlcvBar, Tick};
use crate::notify::{Notifier, NotifyLevel};
use crate::renko::SymbolState;
use crate::Result;

/// Final state of a lane after shutdown
#[derive(Debug, Clone)]
pub struct LaneReport {
    pub symbol: String,
    pub position: PositionRecord,
    pub brick_size: Option<f64>,
    pub bricks: usize,
    pub trades: usize,
}

/// One symbol's processing lane
///
/// Owns the symbol's Renko state and position engine. Ticks are handled
/// strictly one at a time, so a position transition always finishes before
/// the next price is looked at.
pub struct SymbolLane {
    state: SymbolState,
    engine: PositionEngine,
    notifier: Arc<dyn Notifier>,
    trades: usize,
}

impl SymbolLane {
    pub fn new(state: SymbolState, engine: PositionEngine, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            state,
            engine,
            notifier,
            trades: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        self.state.symbol()
    }

    pub fn state(&self) -> &SymbolState {
        &self.state
    }

    pub fn engine(&self) -> &PositionEngine {
        &self.engine
    }

    /// Load history, rebuild bricks, and line the position up with them.
    ///
    /// The exchange position is read first so alignment starts from what
    /// is actually held.
    pub async fn bootstrap(&mut self, bars: Vec<OhlcvBar>, align: bool) -> Result<()> {
        self.engine.sync_from_exchange().await?;

        let last_close = bars.last().map(|bar| bar.close);
        self.state.bootstrap(bars);
        self.engine.set_last_direction(self.state.last_direction());

        let symbol = self.state.symbol().to_string();
        match self.state.brick_size() {
            Some(size) => self.notifier.notify(
                NotifyLevel::Info,
                &format!(
                    "[Renko] {} brick size: {:.6}, bricks: {}, direction: {:?}",
                    symbol,
                    size,
                    self.state.brick_count(),
                    self.state.last_direction()
                ),
            ),
            None => self.notifier.notify(
                NotifyLevel::Warning,
                &format!("[Renko] {}: not enough history to size bricks yet", symbol),
            ),
        }

        if !align {
            return Ok(());
        }

        if let (Some(direction), Some(price)) = (self.state.last_direction(), last_close) {
            self.engine.mark_price(price);
            match self.engine.follow(direction, price).await {
                Ok(TradeAction::Hold) => debug!("{}: already aligned with {:?}", symbol, direction),
                Ok(action) => {
                    self.trades += 1;
                    info!("{}: aligned on startup: {:?}", symbol, action);
                    self.log_position();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("{}: startup alignment failed: {}", symbol, e),
            }
        }

        Ok(())
    }

    /// Process one live tick
    ///
    /// Bad ticks are dropped and order failures are reported without
    /// stopping the lane; only fatal errors come back as `Err`.
    pub async fn on_tick(&mut self, tick: Tick) -> Result<Option<TradeAction>> {
        let bricks = match self.state.on_tick(&tick) {
            Ok(bricks) => bricks,
            Err(BotError::MalformedData(reason)) => {
                warn!("{}: dropping tick: {}", self.state.symbol(), reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.engine.mark_price(tick.price);

        if bricks.is_empty() {
            return Ok(None);
        }

        for brick in &bricks {
            info!(
                "{}: new {:?} brick {:.6} -> {:.6}",
                self.state.symbol(),
                brick.direction,
                brick.open,
                brick.close
            );
        }

        match self.engine.on_bricks(&bricks, tick.price).await {
            Ok(Some(TradeAction::Hold)) | Ok(None) => Ok(None),
            Ok(Some(action)) => {
                self.trades += 1;
                self.log_position();
                Ok(Some(action))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("{}: position change failed: {}", self.state.symbol(), e);
                Ok(None)
            }
        }
    }

    /// Consume ticks until shutdown or the channel closes
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<Tick>,
        shutdown: CancellationToken,
    ) -> Result<LaneReport> {
        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break,

                tick = rx.recv() => match tick {
                    Some(tick) => {
                        if let Err(e) = self.on_tick(tick).await {
                            self.notifier.notify(
                                NotifyLevel::Error,
                                &format!("{}: lane stopped: {}", self.state.symbol(), e),
                            );
                            return Err(e);
                        }
                    }
                    None => break,
                },
            }
        }

        info!("{}: lane stopped", self.state.symbol());
        Ok(self.into_report())
    }

    fn log_position(&self) {
        let position = self.engine.record();
        info!(
            "{}: position {:?} size {} entry {} uPnL {:.4}",
            position.symbol(),
            position.side(),
            position.size(),
            position.entry_price(),
            position.unrealized_pnl()
        );
    }

    pub fn into_report(self) -> LaneReport {
        LaneReport {
            symbol: self.state.symbol().to_string(),
            position: self.engine.record().clone(),
            brick_size: self.state.brick_size(),
            bricks: self.state.brick_count(),
            trades: self.trades,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BotConfig, SizingMode};
    use crate::execution::PaperExecutor;
    use crate::notify::LogNotifier;
    use crate::renko::RenkoSettings;
    use chrono::{Duration, TimeZone, Utc};
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn flat_bars(count: i64) -> Vec<OhlcvBar> {
        let start = Utc.timestamp_opt(1_700_000_000 - 1_700_000_000 % 3600, 0).unwrap();
        (0..count)
            .map(|i| OhlcvBar {
                timestamp: start + Duration::hours(i),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    fn lane() -> SymbolLane {
        let config = BotConfig {
            sizing_mode: SizingMode::Fixed,
            trade_amount: 1.0,
            refresh_brick_size_live: false,
            ..Default::default()
        };
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let engine = PositionEngine::new(
            "BTC_USDT",
            Arc::new(PaperExecutor::new(1000.0, 0.0)),
            notifier.clone(),
            config.sizing_policy(),
            1,
        );
        SymbolLane::new(
            SymbolState::new("BTC_USDT", RenkoSettings::from_config(&config)),
            engine,
            notifier,
        )
    }

    fn tick(price: f64) -> Tick {
        Tick {
            symbol: "BTC_USDT".to_string(),
            price,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_trade_logs_position_summary() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut lane = lane();
        lane.bootstrap(flat_bars(20), true).await.unwrap();
        assert_eq!(lane.state().brick_size(), Some(2.0));

        // Up brick first, then a reversal that turns the position short
        assert!(lane.on_tick(tick(103.0)).await.unwrap().is_none());
        let action = lane.on_tick(tick(97.0)).await.unwrap();
        assert!(matches!(action, Some(TradeAction::Opened { .. })));

        assert!(logs
            .contents()
            .contains("BTC_USDT: position Short size 1 entry 97 uPnL 0.0000"));
        assert_eq!(lane.into_report().trades, 1);
    }

    #[tokio::test]
    async fn test_bad_tick_is_dropped() {
        let mut lane = lane();
        lane.bootstrap(flat_bars(20), false).await.unwrap();

        assert!(lane.on_tick(tick(f64::NAN)).await.unwrap().is_none());
        assert!(lane.on_tick(tick(-5.0)).await.unwrap().is_none());
        assert_eq!(lane.state().brick_count(), 0);
    }
}
