use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::api::BarSource;
use crate::config::Timeframe;
use crate::error::BotError;
use crate::models::{OhlcvBar, Tick};
use crate::Result;

/// Candlestick endpoint refuses ranges above this many points
const MAX_BARS_PER_REQUEST: usize = 1000;
const RATE_LIMIT_PER_SECOND: u32 = 10;

type GateRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Gate.io USDT-margined futures REST client (public endpoints)
///
/// Cloneable; clones share the HTTP pool and the rate limiter.
#[derive(Clone)]
pub struct GateClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<GateRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct GateCandle {
    t: f64,
    #[serde(default)]
    v: Option<Value>,
    o: String,
    h: String,
    l: String,
    c: String,
}

#[derive(Debug, Deserialize)]
struct GateTicker {
    contract: String,
    last: String,
}

#[derive(Debug, Deserialize)]
struct GateContract {
    #[serde(default)]
    last_price: Option<String>,
    quanto_multiplier: String,
}

/// Contract metadata needed for sizing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContractInfo {
    pub last_price: Option<f64>,
    pub quanto_multiplier: f64,
}

impl GateClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let quota = Quota::per_second(
            NonZeroU32::new(RATE_LIMIT_PER_SECOND).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::from_status(status.as_u16(), body));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// One page of candles between `from` and `to` (unix seconds, inclusive)
    pub async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
    ) -> Result<Vec<OhlcvBar>> {
        let rows: Vec<Value> = self
            .get(
                "/futures/usdt/candlesticks",
                &[
                    ("contract", symbol.to_string()),
                    ("interval", timeframe.as_str().to_string()),
                    ("from", from.to_string()),
                    ("to", to.to_string()),
                ],
            )
            .await?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_candle(row) {
                Ok(bar) => bars.push(bar),
                Err(e) => tracing::warn!("{}: skipping candle: {}", symbol, e),
            }
        }
        Ok(bars)
    }

    /// Last traded price for each requested contract
    pub async fn fetch_last_prices(&self, symbols: &[String]) -> Result<Vec<Tick>> {
        let tickers: Vec<GateTicker> = self.get("/futures/usdt/tickers", &[]).await?;
        let now = Utc::now();

        Ok(tickers
            .into_iter()
            .filter(|t| symbols.iter().any(|s| s == &t.contract))
            .filter_map(|t| match t.last.parse::<f64>() {
                Ok(price) if price.is_finite() && price > 0.0 => Some(Tick {
                    symbol: t.contract,
                    price,
                    timestamp: now,
                }),
                _ => {
                    tracing::warn!("{}: unusable last price {:?}", t.contract, t.last);
                    None
                }
            })
            .collect())
    }

    pub async fn fetch_contract(&self, symbol: &str) -> Result<ContractInfo> {
        let contract: GateContract = self
            .get(&format!("/futures/usdt/contracts/{}", symbol), &[])
            .await?;

        let quanto_multiplier = parse_price(&contract.quanto_multiplier)?;
        let last_price = contract
            .last_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok());

        Ok(ContractInfo {
            last_price,
            quanto_multiplier,
        })
    }
}

#[async_trait]
impl BarSource for GateClient {
    /// Walks backwards from now in pages until `count` bars are collected
    /// or the exchange runs out of history.
    async fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<OhlcvBar>> {
        let step = timeframe.seconds() as i64;
        let mut to = Utc::now().timestamp();
        let mut bars: BTreeMap<i64, OhlcvBar> = BTreeMap::new();

        while bars.len() < count {
            let page = (count - bars.len()).min(MAX_BARS_PER_REQUEST);
            let from = to - step * (page as i64 - 1);

            let chunk = self.fetch_candles(symbol, timeframe, from, to).await?;
            if chunk.is_empty() {
                break;
            }

            let before = bars.len();
            let mut oldest = i64::MAX;
            for bar in chunk {
                let ts = bar.timestamp.timestamp();
                oldest = oldest.min(ts);
                bars.entry(ts).or_insert(bar);
            }

            tracing::debug!(
                "{}: fetched {} bars back to {}",
                symbol,
                bars.len() - before,
                oldest
            );

            if bars.len() == before {
                break;
            }
            to = oldest - step;
        }

        let skip = bars.len().saturating_sub(count);
        Ok(bars.into_values().skip(skip).collect())
    }
}

fn parse_price(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| BotError::MalformedData(format!("bad number {:?}: {}", raw, e)))
}

fn parse_candle(row: Value) -> Result<OhlcvBar> {
    let candle: GateCandle = serde_json::from_value(row)?;

    let timestamp = Utc
        .timestamp_opt(candle.t as i64, 0)
        .single()
        .ok_or_else(|| BotError::MalformedData(format!("bad candle time {}", candle.t)))?;

    let volume = match candle.v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    };

    let bar = OhlcvBar {
        timestamp,
        open: parse_price(&candle.o)?,
        high: parse_price(&candle.h)?,
        low: parse_price(&candle.l)?,
        close: parse_price(&candle.c)?,
        volume,
    };
    bar.validate()?;
    Ok(bar)
}
