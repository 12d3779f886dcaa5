use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::TickFeed;
use crate::error::BotError;
use crate::models::Tick;
use crate::pipeline::Backoff;
use crate::Result;

const TICKERS_CHANNEL: &str = "futures.tickers";
const PING_CHANNEL: &str = "futures.ping";

/// Gate.io futures ticker stream over WebSocket
///
/// Reconnects forever with backoff until shutdown. A connection that goes
/// quiet for `stale_after` is treated as dead.
#[derive(Debug, Clone)]
pub struct GateWsFeed {
    url: String,
    backoff: Backoff,
    ping_interval: Duration,
    stale_after: Duration,
}

impl GateWsFeed {
    pub fn new(url: impl Into<String>, backoff: Backoff) -> Self {
        Self {
            url: url.into(),
            backoff,
            ping_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(60),
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, timeout: Duration) -> Self {
        self.stale_after = timeout;
        self
    }

    /// One connection lifetime. Ok means shutdown or a clean server close.
    ///
    /// `attempt` is reset once the subscription is sent, so a connection
    /// that dies after a long healthy run reconnects at the base delay.
    async fn stream_once(
        &self,
        symbols: &[String],
        tx: &mpsc::Sender<Tick>,
        shutdown: &CancellationToken,
        attempt: &mut u32,
    ) -> Result<()> {
        info!("Connecting to {}", self.url);
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws.split();

        let subscribe = json!({
            "time": Utc::now().timestamp(),
            "channel": TICKERS_CHANNEL,
            "event": "subscribe",
            "payload": symbols,
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!("Subscribed to tickers for {:?}", symbols);
        *attempt = 0;

        let mut ping = tokio::time::interval(self.ping_interval);
        ping.tick().await;

        // Only inbound frames push the deadline; our own pings do not
        let stale = tokio::time::sleep(self.stale_after);
        tokio::pin!(stale);

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("close frame not sent: {}", e);
                    }
                    return Ok(());
                }

                () = &mut stale => {
                    return Err(BotError::Network(format!(
                        "no data for {:?}",
                        self.stale_after
                    )));
                }

                _ = ping.tick() => {
                    let msg = json!({"time": Utc::now().timestamp(), "channel": PING_CHANNEL});
                    write.send(Message::Text(msg.to_string())).await?;
                }

                msg = read.next() => {
                    stale.as_mut().reset(Instant::now() + self.stale_after);

                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let ticks = parse_ticker_message(&text).unwrap_or_else(|e| {
                                warn!("Dropping unparsable frame: {}", e);
                                Vec::new()
                            });
                            for tick in ticks {
                                if tx.send(tick).await.is_err() {
                                    return Err(BotError::FeedClosed("tick receiver dropped".into()));
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!("WebSocket closed by server: {:?}", frame);
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TickFeed for GateWsFeed {
    async fn run(
        &self,
        symbols: &[String],
        tx: mpsc::Sender<Tick>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            match self.stream_once(symbols, &tx, &shutdown, &mut attempt).await {
                Ok(()) => {}
                Err(BotError::FeedClosed(reason)) => {
                    info!("Ticker feed stopping: {}", reason);
                    return Ok(());
                }
                Err(e) if e.is_fatal() => {
                    error!("Ticker feed failed: {}", e);
                    return Err(e);
                }
                Err(e) => warn!("Ticker connection lost: {}", e),
            }

            if shutdown.is_cancelled() {
                return Ok(());
            }

            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay(attempt);
            warn!("Reconnecting in {:?} (attempt {})", delay, attempt);

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => return Ok(()),
            }
        }
    }
}

/// Extract ticks from one server frame.
///
/// Non-ticker frames (subscribe acks, pongs) yield nothing. Entries with a
/// missing or unparsable price are dropped.
pub fn parse_ticker_message(text: &str) -> Result<Vec<Tick>> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(err) = value.get("error").filter(|e| !e.is_null()) {
        warn!("Gate WebSocket error: {}", err);
        return Ok(Vec::new());
    }

    if value.get("channel").and_then(Value::as_str) != Some(TICKERS_CHANNEL)
        || value.get("event").and_then(Value::as_str) != Some("update")
    {
        return Ok(Vec::new());
    }

    let timestamp = value
        .get("time_ms")
        .and_then(Value::as_i64)
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .or_else(|| {
            value
                .get("time")
                .and_then(Value::as_i64)
                .and_then(|s| Utc.timestamp_opt(s, 0).single())
        })
        .unwrap_or_else(Utc::now);

    let entries = match value.get("result") {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(entry @ Value::Object(_)) => std::slice::from_ref(entry),
        _ => return Ok(Vec::new()),
    };

    Ok(entries
        .iter()
        .filter_map(|entry| {
            let symbol = entry.get("contract")?.as_str()?;
            let price = match entry.get("last")? {
                Value::String(s) => s.parse::<f64>().ok()?,
                Value::Number(n) => n.as_f64()?,
                _ => return None,
            };
            if !price.is_finite() || price <= 0.0 {
                warn!("{}: dropping ticker with price {}", symbol, price);
                return None;
            }
            Some(Tick {
                symbol: symbol.to_string(),
                price,
                timestamp,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Accept connections forever, counting them; each socket gets `handler`
    async fn counting_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accepts = Arc::new(AtomicUsize::new(0));

        let counter = accepts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    tokio::spawn(handler(ws));
                }
            }
        });

        (url, accepts)
    }

    async fn wait_for_accepts(accepts: &AtomicUsize, wanted: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while accepts.load(Ordering::SeqCst) < wanted {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    #[test]
    fn test_parse_ticker_update() {
        let text = r#"{"time":1700000000,"time_ms":1700000000123,"channel":"futures.tickers","event":"update",
            "result":[{"contract":"BTC_USDT","last":"65000.1"},{"contract":"ETH_USDT","last":"bad"}]}"#;
        let ticks = parse_ticker_message(text).unwrap();

        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol, "BTC_USDT");
        assert_eq!(ticks[0].price, 65000.1);
        assert_eq!(ticks[0].timestamp.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_parse_ignores_acks() {
        let ack = r#"{"time":1,"channel":"futures.tickers","event":"subscribe","result":{"status":"success"}}"#;
        assert!(parse_ticker_message(ack).unwrap().is_empty());

        let pong = r#"{"time":1,"channel":"futures.pong","event":"","result":null}"#;
        assert!(parse_ticker_message(pong).unwrap().is_empty());

        assert!(parse_ticker_message("not json").is_err());
    }

    #[tokio::test]
    async fn test_streams_ticks_from_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            assert!(subscribe.to_text().unwrap().contains("BTC_USDT"));

            let update = json!({
                "time": 1_700_000_000,
                "channel": "futures.tickers",
                "event": "update",
                "result": [{"contract": "BTC_USDT", "last": "42000"}]
            });
            ws.send(Message::Text(update.to_string())).await.unwrap();
            // Hold the connection open until the client goes away
            while let Some(Ok(_)) = ws.next().await {}
        });

        let feed = GateWsFeed::new(
            format!("ws://{}", addr),
            Backoff::Fixed(Duration::from_millis(10)),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let symbols = vec!["BTC_USDT".to_string()];

        let token = shutdown.clone();
        let handle = tokio::spawn(async move { feed.run(&symbols, tx, token).await });

        let tick = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tick.price, 42000.0);

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_silent_connection_is_replaced() {
        // Reads our pings but never sends a frame back
        let (url, accepts) = counting_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let feed = GateWsFeed::new(url, Backoff::Fixed(Duration::from_millis(10)))
            .with_ping_interval(Duration::from_millis(50))
            .with_stale_after(Duration::from_millis(200));
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let symbols = vec!["BTC_USDT".to_string()];

        let token = shutdown.clone();
        let handle = tokio::spawn(async move { feed.run(&symbols, tx, token).await });

        let reconnected = wait_for_accepts(&accepts, 2, Duration::from_secs(3)).await;
        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

        assert!(reconnected, "silent connection was never replaced");
    }

    #[tokio::test]
    async fn test_backoff_restarts_after_successful_subscribe() {
        // Takes the subscription, then drops the socket without a close frame
        let (url, accepts) = counting_server(|mut ws| async move {
            let _ = ws.next().await;
        })
        .await;

        // Without a reset, five reconnects would wait 40+80+160+320+640 ms
        let feed = GateWsFeed::new(
            url,
            Backoff::Exponential {
                base: Duration::from_millis(40),
                max: Duration::from_secs(10),
            },
        );
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let symbols = vec!["BTC_USDT".to_string()];

        let token = shutdown.clone();
        let handle = tokio::spawn(async move { feed.run(&symbols, tx, token).await });

        let fast = wait_for_accepts(&accepts, 6, Duration::from_millis(1000)).await;
        shutdown.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;

        assert!(fast, "only {} connections", accepts.load(Ordering::SeqCst));
    }
}
