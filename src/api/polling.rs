use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{GateClient, TickFeed};
use crate::models::Tick;
use crate::Result;

/// Ticker feed that polls the REST tickers endpoint on a fixed interval
///
/// Simple fallback for networks where the WebSocket is unavailable.
pub struct GatePollingFeed {
    client: GateClient,
    interval: Duration,
}

impl GatePollingFeed {
    pub fn new(client: GateClient, interval: Duration) -> Self {
        Self { client, interval }
    }
}

#[async_trait]
impl TickFeed for GatePollingFeed {
    async fn run(
        &self,
        symbols: &[String],
        tx: mpsc::Sender<Tick>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            match self.client.fetch_last_prices(symbols).await {
                Ok(ticks) => {
                    for tick in ticks {
                        if tx.send(tick).await.is_err() {
                            tracing::info!("Tick receiver dropped, stopping poller");
                            return Ok(());
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!("Ticker poll failed: {}", e),
            }
        }
    }
}
