use std::collections::VecDeque;

use crate::error::BotError;
use crate::models::OhlcvBar;
use crate::Result;

/// Rolling window of bars for one symbol
///
/// Owned by the symbol's lane, so no locking is needed. Once full, the
/// oldest bar is evicted on every insert.
#[derive(Debug, Clone)]
pub struct BarWindow {
    bars: VecDeque<OhlcvBar>,
    capacity: usize,
}

impl BarWindow {
    /// Create a new window
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of bars to keep
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Add a bar, evicting the oldest if the window is full
    ///
    /// Bars must be valid and strictly newer than the last stored bar.
    pub fn push(&mut self, bar: OhlcvBar) -> Result<()> {
        bar.validate()?;

        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return Err(BotError::MalformedData(format!(
                    "bar at {} is not newer than last bar at {}",
                    bar.timestamp, last.timestamp
                )));
            }
        }

        self.bars.push_back(bar);

        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OhlcvBar> {
        self.bars.iter()
    }
}
