use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::Result;

/// OHLCV bar for one symbol and one timeframe period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// Reject bars that cannot be fed into the volatility estimate
    pub fn validate(&self) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(BotError::MalformedData(format!(
                "non-positive or non-finite price in bar at {}",
                self.timestamp
            )));
        }
        if self.high < self.low {
            return Err(BotError::MalformedData(format!(
                "high {} below low {} at {}",
                self.high, self.low, self.timestamp
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(BotError::MalformedData(format!(
                "invalid volume {} at {}",
                self.volume, self.timestamp
            )));
        }
        Ok(())
    }
}

/// Last-trade price event from a live feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrickDirection {
    Up,
    Down,
}

impl BrickDirection {
    pub fn sign(self) -> f64 {
        match self {
            BrickDirection::Up => 1.0,
            BrickDirection::Down => -1.0,
        }
    }
}

/// A completed brick. Never mutated after it is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Brick {
    pub open: f64,
    pub close: f64,
    pub direction: BrickDirection,
}

impl Brick {
    pub fn height(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

/// Side of an order sent to the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn for_direction(direction: BrickDirection) -> Self {
        match direction {
            BrickDirection::Up => TradeSide::Buy,
            BrickDirection::Down => TradeSide::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

impl PositionSide {
    pub fn for_trade(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => PositionSide::Long,
            TradeSide::Sell => PositionSide::Short,
        }
    }

    /// Side a position must hold to follow bricks in `direction`
    pub fn for_direction(direction: BrickDirection) -> Self {
        Self::for_trade(TradeSide::for_direction(direction))
    }
}

/// Execution report for a market order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub size: f64,
}

/// Position as reported by the exchange at startup
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub side: TradeSide,
    pub entry_price: f64,
    pub size: f64,
    pub unrealized_pnl: f64,
}
