use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::BotError;
use crate::execution::OrderExecutor;
use crate::models::{ExchangePosition, Fill, TradeSide};
use crate::Result;

/// One completed round trip
#[derive(Debug, Clone)]
pub struct PaperTrade {
    pub id: Uuid,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: f64,
    pub pnl: f64,
    pub fees: f64,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    side: TradeSide,
    entry_price: f64,
    size: f64,
    entry_fee: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSummary {
    pub balance: f64,
    pub realized_pnl: f64,
    pub fees: f64,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
}

impl PaperSummary {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    balance: f64,
    marks: HashMap<String, f64>,
    multipliers: HashMap<String, f64>,
    positions: HashMap<String, OpenPosition>,
    trades: Vec<PaperTrade>,
    fees: f64,
}

impl Ledger {
    fn mark(&self, symbol: &str) -> Result<f64> {
        self.marks
            .get(symbol)
            .copied()
            .ok_or_else(|| BotError::Order(format!("{}: no mark price yet", symbol)))
    }

    fn multiplier(&self, symbol: &str) -> f64 {
        self.multipliers.get(symbol).copied().unwrap_or(1.0)
    }
}

/// Simulated venue that fills market orders at the last mark price
///
/// Charges a taker fee on both legs and keeps a ledger of round trips.
pub struct PaperExecutor {
    fee_rate: f64,
    ledger: Mutex<Ledger>,
}

impl PaperExecutor {
    pub fn new(balance: f64, fee_rate: f64) -> Self {
        Self {
            fee_rate,
            ledger: Mutex::new(Ledger {
                balance,
                ..Default::default()
            }),
        }
    }

    pub fn set_contract_multiplier(&self, symbol: &str, multiplier: f64) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.multipliers.insert(symbol.to_string(), multiplier);
        }
    }

    pub fn trades(&self) -> Vec<PaperTrade> {
        self.ledger
            .lock()
            .map(|l| l.trades.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> Result<PaperSummary> {
        let ledger = self.lock()?;
        let realized_pnl = ledger.trades.iter().map(|t| t.pnl).sum();
        let wins = ledger.trades.iter().filter(|t| t.pnl > 0.0).count();

        Ok(PaperSummary {
            balance: ledger.balance,
            realized_pnl,
            fees: ledger.fees,
            trades: ledger.trades.len(),
            wins,
            losses: ledger.trades.len() - wins,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|e| BotError::Order(format!("paper ledger poisoned: {}", e)))
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    async fn open_position(&self, symbol: &str, side: TradeSide, size: f64) -> Result<Fill> {
        let mut ledger = self.lock()?;

        if ledger.positions.contains_key(symbol) {
            return Err(BotError::Order(format!("{}: position already open", symbol)));
        }
        if !(size > 0.0) {
            return Err(BotError::Order(format!("{}: invalid size {}", symbol, size)));
        }

        let price = ledger.mark(symbol)?;
        let fee = price * size * ledger.multiplier(symbol) * self.fee_rate;
        ledger.balance -= fee;
        ledger.fees += fee;
        ledger.positions.insert(
            symbol.to_string(),
            OpenPosition {
                side,
                entry_price: price,
                size,
                entry_fee: fee,
            },
        );

        tracing::debug!("paper open {:?} {} x{} @ {}", side, symbol, size, price);
        Ok(Fill { price, size })
    }

    async fn close_position(&self, symbol: &str) -> Result<Fill> {
        let mut ledger = self.lock()?;

        let price = ledger.mark(symbol)?;
        let position = ledger
            .positions
            .remove(symbol)
            .ok_or_else(|| BotError::Order(format!("{}: no open position", symbol)))?;

        let multiplier = ledger.multiplier(symbol);
        let direction = match position.side {
            TradeSide::Buy => 1.0,
            TradeSide::Sell => -1.0,
        };
        let gross = direction * (price - position.entry_price) * position.size * multiplier;
        let fee = price * position.size * multiplier * self.fee_rate;

        ledger.balance += gross - fee;
        ledger.fees += fee;
        ledger.trades.push(PaperTrade {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: price,
            size: position.size,
            pnl: gross - fee - position.entry_fee,
            fees: fee + position.entry_fee,
            closed_at: Utc::now(),
        });

        tracing::debug!("paper close {} @ {} pnl {:.4}", symbol, price, gross);
        Ok(Fill {
            price,
            size: position.size,
        })
    }

    async fn current_position(&self, symbol: &str) -> Result<Option<ExchangePosition>> {
        let ledger = self.lock()?;
        let multiplier = ledger.multiplier(symbol);

        Ok(ledger.positions.get(symbol).map(|p| {
            let mark = ledger.marks.get(symbol).copied().unwrap_or(p.entry_price);
            let direction = if p.side == TradeSide::Buy { 1.0 } else { -1.0 };
            ExchangePosition {
                side: p.side,
                entry_price: p.entry_price,
                size: p.size,
                unrealized_pnl: direction * (mark - p.entry_price) * p.size * multiplier,
            }
        }))
    }

    async fn account_balance(&self) -> Result<f64> {
        Ok(self.lock()?.balance)
    }

    fn on_mark_price(&self, symbol: &str, price: f64) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.marks.insert(symbol.to_string(), price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_round_trip_with_fees() {
        let paper = PaperExecutor::new(10000.0, 0.001);
        paper.on_mark_price("BTC_USDT", 100.0);

        let fill = assert_ok!(paper.open_position("BTC_USDT", TradeSide::Buy, 10.0).await);
        assert_eq!(fill.price, 100.0);

        paper.on_mark_price("BTC_USDT", 110.0);
        let position = paper.current_position("BTC_USDT").await.unwrap().unwrap();
        assert_eq!(position.unrealized_pnl, 100.0);

        assert_ok!(paper.close_position("BTC_USDT").await);

        let summary = paper.summary().unwrap();
        // +100 gross, fees 1.0 entry and 1.1 exit
        assert!((summary.balance - 10097.9).abs() < 1e-9);
        assert_eq!(summary.trades, 1);
        assert_eq!(summary.wins, 1);
        assert!((paper.trades()[0].pnl - 97.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_short_profits_on_drop() {
        let paper = PaperExecutor::new(1000.0, 0.0);
        paper.set_contract_multiplier("ETH_USDT", 0.01);
        paper.on_mark_price("ETH_USDT", 2000.0);
        paper.open_position("ETH_USDT", TradeSide::Sell, 100.0).await.unwrap();

        paper.on_mark_price("ETH_USDT", 1900.0);
        paper.close_position("ETH_USDT").await.unwrap();

        // 100 * 0.01 * 100
        assert_eq!(paper.account_balance().await.unwrap(), 1100.0);
    }

    #[tokio::test]
    async fn test_rejects_double_open_and_flat_close() {
        let paper = PaperExecutor::new(1000.0, 0.0);
        assert_err!(paper.open_position("BTC_USDT", TradeSide::Buy, 1.0).await);

        paper.on_mark_price("BTC_USDT", 100.0);
        assert_err!(paper.close_position("BTC_USDT").await);

        paper.open_position("BTC_USDT", TradeSide::Buy, 1.0).await.unwrap();
        let second = paper.open_position("BTC_USDT", TradeSide::Sell, 1.0).await;
        assert!(matches!(second, Err(BotError::Order(_))));
    }
}
