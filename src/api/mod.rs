// Market data sources
pub mod gate;
pub mod gate_ws;
pub mod polling;

pub use gate::{ContractInfo, GateClient};
pub use gate_ws::GateWsFeed;
pub use polling::GatePollingFeed;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Timeframe;
use crate::models::{OhlcvBar, Tick};
use crate::Result;

/// Historical bars, oldest first
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch_bars(&self, symbol: &str, timeframe: Timeframe, count: usize)
        -> Result<Vec<OhlcvBar>>;
}

/// Live price stream for a set of symbols
///
/// `run` pushes ticks into `tx` until `shutdown` fires, the receiver goes
/// away, or a non-recoverable error occurs. Reconnecting is the feed's job.
#[async_trait]
pub trait TickFeed: Send + Sync {
    async fn run(
        &self,
        symbols: &[String],
        tx: mpsc::Sender<Tick>,
        shutdown: CancellationToken,
    ) -> Result<()>;
}
