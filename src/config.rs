//! Bot configuration.
//!
//! Loaded once at startup from `.env`, an optional `renkobot.toml` and
//! `RENKO_*` environment variables, then passed explicitly to the pipeline.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::BotError;
use crate::execution::SizingPolicy;
use crate::indicators::VolatilityMethod;
use crate::pipeline::{Backoff, RetryPolicy};
use crate::Result;

const TIMEFRAMES: &[(&str, u64)] = &[
    ("1s", 1),
    ("1m", 60),
    ("5m", 300),
    ("15m", 900),
    ("30m", 1800),
    ("1h", 3600),
    ("4h", 14400),
    ("1d", 86400),
    ("1w", 604800),
];

/// Candle interval understood by the exchange (`1m`, `1h`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    label: &'static str,
    seconds: u64,
}

impl Timeframe {
    pub fn parse(value: &str) -> Result<Self> {
        TIMEFRAMES
            .iter()
            .find(|(label, _)| *label == value.trim())
            .map(|&(label, seconds)| Timeframe { label, seconds })
            .ok_or_else(|| BotError::Config(format!("unsupported timeframe: {}", value)))
    }

    pub fn as_str(&self) -> &'static str {
        self.label
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.seconds)
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Timeframe::parse(&label).map_err(de::Error::custom)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    Fixed,
    Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Websocket,
    Polling,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub volatility_period: usize,
    pub volatility_method: VolatilityMethod,
    pub volatility_multiplier: f64,
    pub bar_count: usize,
    pub brick_history_limit: usize,

    pub sizing_mode: SizingMode,
    pub trade_amount: f64,
    pub leverage: f64,

    pub align_on_startup: bool,
    pub refresh_brick_size_live: bool,

    pub feed: FeedKind,
    pub poll_interval_secs: u64,
    pub rest_url: String,
    pub ws_url: String,

    pub discord_webhook_url: Option<String>,

    pub paper_balance: f64,
    pub taker_fee_rate: f64,

    pub fetch_max_attempts: u32,
    pub fetch_retry_delay_secs: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC_USDT".to_string()],
            timeframe: Timeframe {
                label: "1h",
                seconds: 3600,
            },
            volatility_period: 14,
            volatility_method: VolatilityMethod::Mean,
            volatility_multiplier: 1.0,
            bar_count: 1000,
            brick_history_limit: 200,
            sizing_mode: SizingMode::Balance,
            trade_amount: 1.0,
            leverage: 1.0,
            align_on_startup: true,
            refresh_brick_size_live: true,
            feed: FeedKind::Websocket,
            poll_interval_secs: 1,
            rest_url: "https://api.gateio.ws/api/v4".to_string(),
            ws_url: "wss://fx-ws.gateio.ws/v4/ws/usdt".to_string(),
            discord_webhook_url: None,
            paper_balance: 10000.0,
            taker_fee_rate: 0.0005,
            fetch_max_attempts: 3,
            fetch_retry_delay_secs: 5,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
        }
    }
}

impl BotConfig {
    /// Load `.env`, `renkobot.toml` (optional) and `RENKO_*` variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("renkobot").required(false))
            .add_source(
                config::Environment::with_prefix("RENKO")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("symbols"),
            )
            .build()
            .map_err(|e| BotError::Config(e.to_string()))?;

        let config: BotConfig = settings
            .try_deserialize()
            .map_err(|e| BotError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() || self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(BotError::Config("at least one symbol is required".into()));
        }
        if self.volatility_period == 0 {
            return Err(BotError::Config("volatility_period must be positive".into()));
        }
        if !(self.volatility_multiplier > 0.0) {
            return Err(BotError::Config(
                "volatility_multiplier must be positive".into(),
            ));
        }
        if self.bar_count <= self.volatility_period {
            return Err(BotError::Config(format!(
                "bar_count ({}) must exceed volatility_period ({})",
                self.bar_count, self.volatility_period
            )));
        }
        if self.brick_history_limit == 0 {
            return Err(BotError::Config("brick_history_limit must be positive".into()));
        }
        match self.sizing_mode {
            SizingMode::Fixed if !(self.trade_amount > 0.0) => {
                return Err(BotError::Config("trade_amount must be positive".into()));
            }
            SizingMode::Balance if !(self.leverage > 0.0) => {
                return Err(BotError::Config("leverage must be positive".into()));
            }
            _ => {}
        }
        if self.fetch_max_attempts == 0 {
            return Err(BotError::Config("fetch_max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn sizing_policy(&self) -> SizingPolicy {
        match self.sizing_mode {
            SizingMode::Fixed => SizingPolicy::Fixed {
                amount: self.trade_amount,
            },
            SizingMode::Balance => SizingPolicy::Balance {
                leverage: self.leverage,
            },
        }
    }

    /// Bars kept per symbol: the fetched history, never less than one
    /// true-range window
    pub fn window_capacity(&self) -> usize {
        self.bar_count.max(self.volatility_period + 1)
    }

    pub fn fetch_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch_max_attempts,
            Backoff::Fixed(Duration::from_secs(self.fetch_retry_delay_secs)),
        )
    }

    pub fn reconnect_backoff(&self) -> Backoff {
        Backoff::Exponential {
            base: Duration::from_millis(self.reconnect_base_delay_ms),
            max: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }
}
