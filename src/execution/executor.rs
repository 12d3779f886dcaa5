use async_trait::async_trait;

use crate::models::{ExchangePosition, Fill, TradeSide};
use crate::Result;

/// Order placement on a futures venue
///
/// Implementations report failures as errors and never retry orders on
/// their own: a timed-out order may still have filled.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    /// Open a position of `size` contracts at market
    async fn open_position(&self, symbol: &str, side: TradeSide, size: f64) -> Result<Fill>;

    /// Close the whole open position at market
    async fn close_position(&self, symbol: &str) -> Result<Fill>;

    /// Position currently held on the venue, if any
    async fn current_position(&self, symbol: &str) -> Result<Option<ExchangePosition>>;

    /// Margin available for new positions
    async fn account_balance(&self) -> Result<f64>;

    /// Latest traded price, for executors that fill against a mark
    fn on_mark_price(&self, _symbol: &str, _price: f64) {}
}
