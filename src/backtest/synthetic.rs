use crate::models::OhlcvBar;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Mean-reverting chop around the start price
    Sideways,
    /// Large swings in both directions
    Volatile,
}

impl MarketScenario {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "uptrend" => Some(Self::Uptrend),
            "downtrend" => Some(Self::Downtrend),
            "sideways" => Some(Self::Sideways),
            "volatile" => Some(Self::Volatile),
            _ => None,
        }
    }
}

/// Seeded bar generator for backtests and tests
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start: DateTime<Utc>,
}

impl SyntheticDataGenerator {
    /// Same seed, same bars
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000_000.0,
            start: Utc
                .timestamp_opt(1_700_000_000 - 1_700_000_000 % 86_400, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    /// Generate `count` bars spaced `interval_secs` apart
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        count: usize,
        interval_secs: i64,
    ) -> Vec<OhlcvBar> {
        let mut bars = Vec::with_capacity(count);
        let mut price = self.base_price;
        let mean_price = self.base_price;

        for i in 0..count {
            let timestamp = self.start + Duration::seconds(i as i64 * interval_secs);

            let change = match scenario {
                MarketScenario::Uptrend => price * (0.002 + self.rng.gen_range(-0.004..0.004)),
                MarketScenario::Downtrend => price * (-0.002 + self.rng.gen_range(-0.004..0.004)),
                MarketScenario::Sideways => {
                    (mean_price - price) * 0.1 + price * self.rng.gen_range(-0.01..0.01)
                }
                MarketScenario::Volatile => price * self.rng.gen_range(-0.05..0.05),
            };
            price = (price + change).max(self.base_price * 0.1);

            bars.push(self.create_bar(price, timestamp));
        }

        bars
    }

    fn create_bar(&mut self, close: f64, timestamp: DateTime<Utc>) -> OhlcvBar {
        let noise_pct = 0.004;

        let high = close * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = close * (1.0 - self.rng.gen_range(0.0..noise_pct));
        let open = (close * (1.0 + self.rng.gen_range(-noise_pct..noise_pct))).clamp(low, high);
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        OhlcvBar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uptrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let bars = gen.generate(MarketScenario::Uptrend, 500, 300);

        assert_eq!(bars.len(), 500);
        let first = bars.first().unwrap().close;
        let last = bars.last().unwrap().close;
        assert!(last > first, "Uptrend should end higher: {} -> {}", first, last);
    }

    #[test]
    fn test_generate_downtrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let bars = gen.generate(MarketScenario::Downtrend, 500, 300);

        let first = bars.first().unwrap().close;
        let last = bars.last().unwrap().close;
        assert!(last < first, "Downtrend should end lower: {} -> {}", first, last);
    }

    #[test]
    fn test_same_seed_same_bars() {
        let a = SyntheticDataGenerator::new(7).generate(MarketScenario::Volatile, 200, 60);
        let b = SyntheticDataGenerator::new(7).generate(MarketScenario::Volatile, 200, 60);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bars_are_valid_and_sequential() {
        let mut gen = SyntheticDataGenerator::new(42);
        let bars = gen.generate(MarketScenario::Sideways, 300, 3600);

        for bar in &bars {
            assert!(bar.validate().is_ok());
            assert!(bar.high >= bar.open && bar.high >= bar.close);
            assert!(bar.low <= bar.open && bar.low <= bar.close);
        }
        for pair in bars.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }

    #[test]
    fn test_base_price_sets_starting_level() {
        let bars = SyntheticDataGenerator::new(5)
            .with_base_price(20.0)
            .generate(MarketScenario::Sideways, 10, 60);

        let first = bars[0].close;
        assert!(first > 19.0 && first < 21.0, "first close {}", first);
    }

    #[test]
    fn test_parse_scenario() {
        assert_eq!(MarketScenario::parse("Volatile"), Some(MarketScenario::Volatile));
        assert_eq!(MarketScenario::parse("crash"), None);
    }
}
