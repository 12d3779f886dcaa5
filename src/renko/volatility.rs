use crate::indicators::{calculate_atr, VolatilityMethod};

use super::BarWindow;

/// Turns the bar window into a brick size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityEstimator {
    period: usize,
    method: VolatilityMethod,
    multiplier: f64,
}

impl VolatilityEstimator {
    pub fn new(period: usize, method: VolatilityMethod) -> Self {
        Self {
            period,
            method,
            multiplier: 1.0,
        }
    }

    /// Scale the estimate, e.g. 2.0 for a double-ATR brick
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Bars needed before an estimate exists
    pub fn required_bars(&self) -> usize {
        self.period + 1
    }

    /// Current brick size, or None while the window is too short.
    ///
    /// A zero or non-finite estimate is reported as unavailable: a flat
    /// window would otherwise ask for an unbounded number of bricks.
    pub fn estimate(&self, window: &BarWindow) -> Option<f64> {
        if window.len() < self.required_bars() {
            return None;
        }

        calculate_atr(window.iter(), self.period, self.method)
            .map(|atr| atr * self.multiplier)
            .filter(|size| size.is_finite() && *size > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OhlcvBar;
    use chrono::{Duration, Utc};

    fn window_with(count: usize, high: f64, low: f64) -> BarWindow {
        let start = Utc::now();
        let mut window = BarWindow::new(100);
        for i in 0..count {
            window
                .push(OhlcvBar {
                    timestamp: start + Duration::hours(i as i64),
                    open: 100.0,
                    high,
                    low,
                    close: 100.0,
                    volume: 1.0,
                })
                .unwrap();
        }
        window
    }

    #[test]
    fn test_availability_boundary() {
        let estimator = VolatilityEstimator::new(14, VolatilityMethod::Mean);

        assert_eq!(estimator.estimate(&window_with(14, 105.0, 95.0)), None);

        let size = estimator.estimate(&window_with(15, 105.0, 95.0));
        assert_eq!(size, Some(10.0));
    }

    #[test]
    fn test_zero_volatility_is_unavailable() {
        let estimator = VolatilityEstimator::new(14, VolatilityMethod::Mean);
        assert_eq!(estimator.estimate(&window_with(20, 100.0, 100.0)), None);
    }

    #[test]
    fn test_multiplier() {
        let estimator = VolatilityEstimator::new(3, VolatilityMethod::Wilder).with_multiplier(2.0);
        assert_eq!(estimator.estimate(&window_with(10, 101.0, 99.0)), Some(4.0));
        assert_eq!(estimator.required_bars(), 4);
    }
}
