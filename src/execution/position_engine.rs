use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::BotError;
use crate::execution::{OrderExecutor, SizingPolicy};
use crate::models::{Brick, BrickDirection, ExchangePosition, Fill, PositionSide, TradeSide};
use crate::notify::{Notifier, NotifyLevel};
use crate::Result;

/// What the bot believes it holds for one symbol
///
/// Only the engine changes it, and only after a confirmed fill.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    symbol: String,
    side: PositionSide,
    entry_price: f64,
    size: f64,
    unrealized_pnl: f64,
}

impl PositionRecord {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side: PositionSide::Flat,
            entry_price: 0.0,
            size: 0.0,
            unrealized_pnl: 0.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> PositionSide {
        self.side
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.unrealized_pnl
    }

    pub fn is_flat(&self) -> bool {
        self.side == PositionSide::Flat
    }

    fn open(&mut self, side: TradeSide, fill: Fill) {
        self.side = PositionSide::for_trade(side);
        self.entry_price = fill.price;
        self.size = fill.size;
        self.unrealized_pnl = 0.0;
    }

    fn close(&mut self) {
        self.side = PositionSide::Flat;
        self.entry_price = 0.0;
        self.size = 0.0;
        self.unrealized_pnl = 0.0;
    }

    fn sync(&mut self, position: Option<&ExchangePosition>) {
        match position {
            Some(p) if p.size > 0.0 => {
                self.side = PositionSide::for_trade(p.side);
                self.entry_price = p.entry_price;
                self.size = p.size;
                self.unrealized_pnl = p.unrealized_pnl;
            }
            _ => self.close(),
        }
    }

    /// Profit of closing at `price`, in quote currency
    fn pnl_at(&self, price: f64, contract_multiplier: f64) -> f64 {
        let diff = match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
            PositionSide::Flat => 0.0,
        };
        diff * self.size * contract_multiplier
    }
}

/// Result of acting on a brick direction
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    /// Already on the requested side
    Hold,
    Opened {
        side: PositionSide,
        fill: Fill,
    },
    Reversed {
        closed: Fill,
        realized_pnl: f64,
        side: PositionSide,
        opened: Fill,
    },
}

/// Drives one symbol's position from brick direction changes
///
/// Transitions run close-then-open. If the close fails the old position is
/// kept and no open is sent; if the open fails after a good close the
/// symbol ends up flat.
pub struct PositionEngine {
    record: PositionRecord,
    executor: Arc<dyn OrderExecutor>,
    notifier: Arc<dyn Notifier>,
    sizing: SizingPolicy,
    symbol_count: usize,
    contract_multiplier: f64,
    last_direction: Option<BrickDirection>,
    halted: Option<String>,
}

impl PositionEngine {
    pub fn new(
        symbol: impl Into<String>,
        executor: Arc<dyn OrderExecutor>,
        notifier: Arc<dyn Notifier>,
        sizing: SizingPolicy,
        symbol_count: usize,
    ) -> Self {
        Self {
            record: PositionRecord::flat(symbol),
            executor,
            notifier,
            sizing,
            symbol_count: symbol_count.max(1),
            contract_multiplier: 1.0,
            last_direction: None,
            halted: None,
        }
    }

    /// Quote value of one contract per unit of price
    pub fn with_contract_multiplier(mut self, multiplier: f64) -> Self {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.contract_multiplier = multiplier;
        }
        self
    }

    pub fn record(&self) -> &PositionRecord {
        &self.record
    }

    pub fn symbol(&self) -> &str {
        self.record.symbol()
    }

    pub fn last_direction(&self) -> Option<BrickDirection> {
        self.last_direction
    }

    /// Direction of the most recent brick already acted on (or skipped)
    pub fn set_last_direction(&mut self, direction: Option<BrickDirection>) {
        self.last_direction = direction;
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Adopt whatever the venue reports as the open position
    pub async fn sync_from_exchange(&mut self) -> Result<()> {
        let position = self.executor.current_position(self.record.symbol()).await?;
        self.record.sync(position.as_ref());

        if !self.record.is_flat() {
            info!(
                "{}: found open {:?} position, size {} at {}",
                self.record.symbol, self.record.side, self.record.size, self.record.entry_price
            );
        }
        Ok(())
    }

    /// Update the mark for unrealized P&L and the executor
    pub fn mark_price(&mut self, price: f64) {
        self.executor.on_mark_price(self.record.symbol(), price);
        self.record.unrealized_pnl = self.record.pnl_at(price, self.contract_multiplier);
    }

    /// React to freshly emitted bricks.
    ///
    /// Only a change of direction against the previous brick is a signal;
    /// continuation bricks never trade. `price` is the price that produced
    /// the bricks and is used for sizing.
    pub async fn on_bricks(&mut self, bricks: &[Brick], price: f64) -> Result<Option<TradeAction>> {
        let mut signal = None;
        for brick in bricks {
            if let Some(previous) = self.last_direction {
                if previous != brick.direction {
                    signal = Some(brick.direction);
                }
            }
            self.last_direction = Some(brick.direction);
        }

        match signal {
            Some(direction) => {
                info!(
                    "{}: brick direction turned {:?}, following",
                    self.record.symbol, direction
                );
                self.follow(direction, price).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Move to the side matching `direction`: close any opposite position,
    /// then open.
    pub async fn follow(&mut self, direction: BrickDirection, price: f64) -> Result<TradeAction> {
        if let Some(reason) = &self.halted {
            return Err(BotError::Auth(format!(
                "{}: trading halted: {}",
                self.record.symbol, reason
            )));
        }

        let target = PositionSide::for_direction(direction);
        if self.record.side == target {
            return Ok(TradeAction::Hold);
        }

        let mut closed = None;
        if !self.record.is_flat() {
            let fill = self.close_current().await?;
            closed = Some(fill);
        }

        let opened = self.open(TradeSide::for_direction(direction), price).await?;

        Ok(match closed {
            Some((closed, realized_pnl)) => TradeAction::Reversed {
                closed,
                realized_pnl,
                side: target,
                opened,
            },
            None => TradeAction::Opened {
                side: target,
                fill: opened,
            },
        })
    }

    async fn close_current(&mut self) -> Result<(Fill, f64)> {
        let symbol = self.record.symbol.clone();
        let side = self.record.side;

        match self.executor.close_position(&symbol).await {
            Ok(fill) => {
                let pnl = self.record.pnl_at(fill.price, self.contract_multiplier);
                self.record.close();
                self.notifier.notify(
                    NotifyLevel::Info,
                    &format!(
                        "[Order] Closed {:?} {}, price: {}, size: {}, PnL: {:.4}",
                        side, symbol, fill.price, fill.size, pnl
                    ),
                );
                Ok((fill, pnl))
            }
            Err(e) => {
                error!("{}: close of {:?} position failed: {}", symbol, side, e);
                self.notifier.notify(
                    NotifyLevel::Error,
                    &format!("[Order] Close {:?} {} failed, keeping position: {}", side, symbol, e),
                );
                self.halt_if_fatal(&e);
                Err(e)
            }
        }
    }

    async fn open(&mut self, side: TradeSide, price: f64) -> Result<Fill> {
        let symbol = self.record.symbol.clone();

        let result = match self.order_size(price).await {
            Ok(size) => self.executor.open_position(&symbol, side, size).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(fill) => {
                self.record.open(side, fill);
                self.notifier.notify(
                    NotifyLevel::Info,
                    &format!(
                        "[Order] Open {:?} {}, price: {}, size: {}",
                        side, symbol, fill.price, fill.size
                    ),
                );
                Ok(fill)
            }
            Err(e) => {
                error!("{}: open {:?} failed: {}", symbol, side, e);
                self.notifier.notify(
                    NotifyLevel::Error,
                    &format!("[Order] Open {:?} {} failed, staying flat: {}", side, symbol, e),
                );
                self.halt_if_fatal(&e);
                Err(e)
            }
        }
    }

    async fn order_size(&self, price: f64) -> Result<f64> {
        let balance = match self.sizing {
            SizingPolicy::Fixed { .. } => 0.0,
            SizingPolicy::Balance { .. } => self.executor.account_balance().await?,
        };
        self.sizing
            .order_size(price, balance, self.contract_multiplier, self.symbol_count)
    }

    fn halt_if_fatal(&mut self, e: &BotError) {
        if e.is_fatal() {
            warn!("{}: halting trading: {}", self.record.symbol, e);
            self.halted = Some(e.to_string());
        }
    }
}
