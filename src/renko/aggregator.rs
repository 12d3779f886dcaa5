use chrono::{DateTime, TimeZone, Utc};

use crate::error::BotError;
use crate::models::OhlcvBar;
use crate::Result;

/// Builds timeframe bars out of live ticks
///
/// A bar is only handed out once a tick from a later period arrives, so
/// every returned bar is complete.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    period_secs: i64,
    current: Option<OhlcvBar>,
    resume_after: Option<i64>,
}

impl BarAggregator {
    pub fn new(period_secs: u64) -> Self {
        Self {
            period_secs: period_secs.max(1) as i64,
            current: None,
            resume_after: None,
        }
    }

    /// Ignore ticks up to and including the period holding `timestamp`.
    ///
    /// Used after bootstrap so the last fetched bar is not built twice.
    pub fn resume_after(&mut self, timestamp: DateTime<Utc>) {
        self.resume_after = Some(self.bucket(timestamp));
        self.current = None;
    }

    /// Bar currently being built, if any
    pub fn current(&self) -> Option<&OhlcvBar> {
        self.current.as_ref()
    }

    /// Fold a tick in; returns the previous bar when this tick opens a new one
    pub fn on_tick(&mut self, price: f64, timestamp: DateTime<Utc>) -> Result<Option<OhlcvBar>> {
        let bucket = self.bucket(timestamp);

        if matches!(self.resume_after, Some(skip) if bucket <= skip) {
            return Ok(None);
        }

        let Some(current) = self.current.as_mut() else {
            self.current = Some(self.open_bar(bucket, price)?);
            return Ok(None);
        };

        let current_bucket = current.timestamp.timestamp();
        if bucket == current_bucket {
            current.high = current.high.max(price);
            current.low = current.low.min(price);
            current.close = price;
            return Ok(None);
        }

        if bucket < current_bucket {
            return Err(BotError::MalformedData(format!(
                "tick at {} is older than the open bar at {}",
                timestamp, current.timestamp
            )));
        }

        let next = self.open_bar(bucket, price)?;
        Ok(self.current.replace(next))
    }

    fn bucket(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp().div_euclid(self.period_secs) * self.period_secs
    }

    fn open_bar(&self, bucket: i64, price: f64) -> Result<OhlcvBar> {
        let timestamp = Utc
            .timestamp_opt(bucket, 0)
            .single()
            .ok_or_else(|| BotError::MalformedData(format!("invalid bar timestamp {}", bucket)))?;

        Ok(OhlcvBar {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        })
    }
}
