/// Average True Range (ATR) indicator
///
/// Measures market volatility by averaging true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Two averaging methods are supported: a plain mean of the last `period`
/// true ranges, and Wilder's smoothing seeded with a simple average.
use serde::Deserialize;

use crate::models::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityMethod {
    /// Arithmetic mean of the last `period` true ranges
    Mean,
    /// Wilder's smoothing over every available true range
    Wilder,
}

/// True range of `bar` given the previous bar's close
pub fn true_range(prev_close: f64, bar: &OhlcvBar) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

fn true_ranges<'a, I>(bars: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a OhlcvBar>,
{
    let mut ranges = Vec::new();
    let mut prev_close: Option<f64> = None;
    for bar in bars {
        if let Some(prev) = prev_close {
            ranges.push(true_range(prev, bar));
        }
        prev_close = Some(bar.close);
    }
    ranges
}

/// Calculate ATR for the given bars
///
/// Returns the current ATR value, or None if fewer than `period + 1` bars exist
pub fn calculate_atr<'a, I>(bars: I, period: usize, method: VolatilityMethod) -> Option<f64>
where
    I: IntoIterator<Item = &'a OhlcvBar>,
{
    if period == 0 {
        return None;
    }

    let ranges = true_ranges(bars);
    if ranges.len() < period {
        return None;
    }

    match method {
        VolatilityMethod::Mean => {
            let recent = &ranges[ranges.len() - period..];
            Some(recent.iter().sum::<f64>() / period as f64)
        }
        VolatilityMethod::Wilder => calculate_atr_series_from(&ranges, period).last().copied(),
    }
}

/// Calculate Wilder ATR and return all intermediate values (for analysis)
///
/// Returns vector of ATR values aligned with bars (starting from index period)
pub fn calculate_atr_series(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return Vec::new();
    }
    calculate_atr_series_from(&true_ranges(bars), period)
}

fn calculate_atr_series_from(ranges: &[f64], period: usize) -> Vec<f64> {
    if ranges.len() < period {
        return Vec::new();
    }

    let mut atr_series = Vec::with_capacity(ranges.len() - period + 1);

    // First ATR is simple average of first 'period' true ranges
    let mut atr: f64 = ranges.iter().take(period).sum::<f64>() / period as f64;
    atr_series.push(atr);

    for tr in &ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        atr_series.push(atr);
    }

    atr_series
}
