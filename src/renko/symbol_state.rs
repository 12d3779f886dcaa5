use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::error::BotError;
use crate::indicators::VolatilityMethod;
use crate::models::{Brick, BrickDirection, OhlcvBar, Tick};
use crate::Result;

use super::{BarAggregator, BarWindow, BrickBuilder, VolatilityEstimator};

/// Per-symbol Renko parameters
#[derive(Debug, Clone, Copy)]
pub struct RenkoSettings {
    pub period: usize,
    pub method: VolatilityMethod,
    pub multiplier: f64,
    pub window_capacity: usize,
    pub history_limit: usize,
    pub timeframe_secs: u64,
    pub refresh_live: bool,
}

impl RenkoSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            period: config.volatility_period,
            method: config.volatility_method,
            multiplier: config.volatility_multiplier,
            window_capacity: config.window_capacity(),
            history_limit: config.brick_history_limit,
            timeframe_secs: config.timeframe.seconds(),
            refresh_live: config.refresh_brick_size_live,
        }
    }
}

/// Everything one symbol needs to turn prices into bricks
///
/// Owned by exactly one lane; never shared across tasks.
#[derive(Debug, Clone)]
pub struct SymbolState {
    symbol: String,
    window: BarWindow,
    estimator: VolatilityEstimator,
    brick_size: Option<f64>,
    builder: BrickBuilder,
    aggregator: BarAggregator,
    refresh_live: bool,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>, settings: RenkoSettings) -> Self {
        Self {
            symbol: symbol.into(),
            window: BarWindow::new(settings.window_capacity),
            estimator: VolatilityEstimator::new(settings.period, settings.method)
                .with_multiplier(settings.multiplier),
            brick_size: None,
            builder: BrickBuilder::new(settings.history_limit),
            aggregator: BarAggregator::new(settings.timeframe_secs),
            refresh_live: settings.refresh_live,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn brick_size(&self) -> Option<f64> {
        self.brick_size
    }

    pub fn window(&self) -> &BarWindow {
        &self.window
    }

    pub fn anchor(&self) -> Option<f64> {
        self.builder.anchor()
    }

    pub fn last_direction(&self) -> Option<BrickDirection> {
        self.builder.last_direction()
    }

    pub fn bricks(&self) -> impl Iterator<Item = &Brick> {
        self.builder.history().iter()
    }

    pub fn brick_count(&self) -> usize {
        self.builder.history().len()
    }

    /// Add a completed bar and re-derive the brick size
    pub fn push_bar(&mut self, bar: OhlcvBar) -> Result<Option<f64>> {
        self.window.push(bar)?;
        self.refresh_brick_size();
        Ok(self.brick_size)
    }

    /// Fill the window from history without building bricks.
    ///
    /// Malformed or out-of-order bars are skipped. Returns how many were kept.
    pub fn load_bars(&mut self, bars: Vec<OhlcvBar>) -> usize {
        let mut kept = 0;
        for bar in bars {
            match self.window.push(bar) {
                Ok(()) => kept += 1,
                Err(e) => warn!("{}: dropping historical bar: {}", self.symbol, e),
            }
        }
        self.refresh_brick_size();

        if let Some(last) = self.window.last() {
            self.aggregator.resume_after(last.timestamp);
        }
        kept
    }

    /// Rebuild bricks from the window's closes using the current brick size
    pub fn replay_closes(&mut self) -> usize {
        self.builder.reset();
        let closes: Vec<f64> = self.window.iter().map(|bar| bar.close).collect();
        let mut emitted = 0;
        for close in closes {
            emitted += self.builder.on_price(close, self.brick_size).len();
        }
        emitted
    }

    /// Load history, size bricks from the full window, then replay closes
    pub fn bootstrap(&mut self, bars: Vec<OhlcvBar>) -> usize {
        let kept = self.load_bars(bars);
        let emitted = self.replay_closes();

        match self.brick_size {
            Some(size) => info!(
                "{}: bootstrapped {} bars, brick size {:.6}, {} bricks, direction {:?}",
                self.symbol,
                kept,
                size,
                emitted,
                self.builder.last_direction()
            ),
            None => warn!(
                "{}: only {} bars, need {} to size bricks",
                self.symbol,
                kept,
                self.estimator.required_bars()
            ),
        }
        emitted
    }

    /// Feed one price and return the bricks it completed
    pub fn apply_price(&mut self, price: f64) -> Result<Vec<Brick>> {
        if !price.is_finite() || price <= 0.0 {
            return Err(BotError::MalformedData(format!(
                "{}: invalid price {}",
                self.symbol, price
            )));
        }
        Ok(self.builder.on_price(price, self.brick_size))
    }

    /// Handle a live tick: roll bars forward when enabled, then build bricks
    pub fn on_tick(&mut self, tick: &Tick) -> Result<Vec<Brick>> {
        if tick.symbol != self.symbol {
            return Err(BotError::MalformedData(format!(
                "tick for {} routed to {}",
                tick.symbol, self.symbol
            )));
        }

        if self.refresh_live && tick.price.is_finite() && tick.price > 0.0 {
            if let Some(bar) = self.aggregator.on_tick(tick.price, tick.timestamp)? {
                debug!("{}: bar closed at {}", self.symbol, bar.timestamp);
                if let Err(e) = self.push_bar(bar) {
                    warn!("{}: dropping live bar: {}", self.symbol, e);
                }
            }
        }

        self.apply_price(tick.price)
    }

    fn refresh_brick_size(&mut self) {
        let size = self.estimator.estimate(&self.window);
        if size != self.brick_size {
            debug!("{}: brick size {:?} -> {:?}", self.symbol, self.brick_size, size);
        }
        self.brick_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn settings() -> RenkoSettings {
        RenkoSettings {
            period: 14,
            method: VolatilityMethod::Mean,
            multiplier: 1.0,
            window_capacity: 1000,
            history_limit: 200,
            timeframe_secs: 3600,
            refresh_live: true,
        }
    }

    fn bars(closes: &[f64]) -> Vec<OhlcvBar> {
        let start = Utc.timestamp_opt(1_699_999_200, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close + 5.0,
                low: close - 5.0,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn tick(symbol: &str, price: f64, secs: i64) -> Tick {
        Tick {
            symbol: symbol.to_string(),
            price,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_brick_size_boundary() {
        let mut state = SymbolState::new("BTC_USDT", settings());
        state.bootstrap(bars(&[100.0; 14]));
        assert_eq!(state.brick_size(), None);
        assert_eq!(state.anchor(), None);

        let mut state = SymbolState::new("BTC_USDT", settings());
        state.bootstrap(bars(&[100.0; 15]));
        assert_eq!(state.brick_size(), Some(10.0));
    }

    #[test]
    fn test_bootstrap_builds_bricks() {
        let mut closes = vec![100.0; 15];
        closes.extend([115.0, 130.0, 145.0, 160.0]);
        let mut state = SymbolState::new("BTC_USDT", settings());

        let emitted = state.bootstrap(bars(&closes));
        assert!(emitted >= 3);
        assert_eq!(state.last_direction(), Some(BrickDirection::Up));
        assert_eq!(state.brick_count(), emitted);
    }

    #[test]
    fn test_bootstrap_matches_replay() {
        let closes: Vec<f64> = (0..300)
            .map(|i| 1000.0 + (i as f64 * 0.11).sin() * 80.0 + (i as f64 * 0.023).cos() * 40.0)
            .collect();

        let mut bootstrapped = SymbolState::new("ETH_USDT", settings());
        bootstrapped.bootstrap(bars(&closes));

        let mut replayed = SymbolState::new("ETH_USDT", settings());
        replayed.load_bars(bars(&closes));
        for close in &closes {
            replayed.apply_price(*close).unwrap();
        }

        let a: Vec<_> = bootstrapped.bricks().copied().collect();
        let b: Vec<_> = replayed.bricks().copied().collect();
        assert!(!a.is_empty());
        assert_eq!(a, b);
        assert_eq!(bootstrapped.anchor(), replayed.anchor());
    }

    #[test]
    fn test_invalid_price_rejected() {
        let mut state = SymbolState::new("BTC_USDT", settings());
        assert!(matches!(state.apply_price(f64::NAN), Err(BotError::MalformedData(_))));
        assert!(state.apply_price(-1.0).is_err());
    }

    #[test]
    fn test_tick_for_other_symbol_rejected() {
        let mut state = SymbolState::new("BTC_USDT", settings());
        assert!(state.on_tick(&tick("ETH_USDT", 100.0, 1_700_000_000)).is_err());
    }

    #[test]
    fn test_live_bars_refresh_brick_size() {
        let mut state = SymbolState::new("BTC_USDT", settings());
        let history = bars(&[100.0; 15]);
        let last_ts = history.last().unwrap().timestamp.timestamp();
        state.bootstrap(history);
        assert_eq!(state.brick_size(), Some(10.0));

        // A wide live bar, then a tick in the following hour to close it
        let next_hour = last_ts + 3600;
        state.on_tick(&tick("BTC_USDT", 100.0, next_hour)).unwrap();
        state.on_tick(&tick("BTC_USDT", 150.0, next_hour + 60)).unwrap();
        state.on_tick(&tick("BTC_USDT", 50.0, next_hour + 120)).unwrap();
        state.on_tick(&tick("BTC_USDT", 100.0, next_hour + 3600)).unwrap();

        assert_eq!(state.window().len(), 16);
        let size = state.brick_size().unwrap();
        assert!(size > 10.0, "size {} should grow after a 100 point bar", size);
    }

    #[test]
    fn test_bootstrap_skips_bad_bars() {
        let mut history = bars(&[100.0; 16]);
        history[3].low = 500.0;
        let mut state = SymbolState::new("BTC_USDT", settings());
        let kept = state.load_bars(history);
        assert_eq!(kept, 15);
        assert_eq!(state.brick_size(), Some(10.0));
    }
}
