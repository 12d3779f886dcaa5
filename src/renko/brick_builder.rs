use std::collections::VecDeque;

use crate::models::{Brick, BrickDirection};

/// Converts a price stream into Renko bricks
///
/// The anchor is the close of the last emitted brick. A move of one brick
/// size continues the current direction; turning around takes two.
#[derive(Debug, Clone)]
pub struct BrickBuilder {
    anchor: Option<f64>,
    last_direction: Option<BrickDirection>,
    history: VecDeque<Brick>,
    history_limit: usize,
}

impl BrickBuilder {
    pub fn new(history_limit: usize) -> Self {
        Self {
            anchor: None,
            last_direction: None,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn anchor(&self) -> Option<f64> {
        self.anchor
    }

    pub fn last_direction(&self) -> Option<BrickDirection> {
        self.last_direction
    }

    pub fn last_brick(&self) -> Option<&Brick> {
        self.history.back()
    }

    /// Emitted bricks, oldest first, capped at the history limit
    pub fn history(&self) -> &VecDeque<Brick> {
        &self.history
    }

    /// Forget the anchor and every emitted brick
    pub fn reset(&mut self) {
        self.anchor = None;
        self.last_direction = None;
        self.history.clear();
    }

    /// Feed one price and return the bricks it completes, in order.
    ///
    /// Without a brick size nothing happens, not even anchoring. The first
    /// price seen with a size sets the anchor to the nearest multiple of
    /// that size.
    pub fn on_price(&mut self, price: f64, brick_size: Option<f64>) -> Vec<Brick> {
        let size = match brick_size {
            Some(size) if size.is_finite() && size > 0.0 => size,
            _ => return Vec::new(),
        };

        let mut anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                let anchor = (price / size).round() * size;
                self.anchor = Some(anchor);
                return Vec::new();
            }
        };

        let mut emitted = Vec::new();
        loop {
            let diff = price - anchor;
            let direction = if diff >= 0.0 {
                BrickDirection::Up
            } else {
                BrickDirection::Down
            };
            let threshold = match self.last_direction {
                Some(last) if last != direction => 2.0 * size,
                _ => size,
            };

            if diff.abs() < threshold {
                break;
            }

            let close = anchor + direction.sign() * threshold;
            let brick = Brick {
                open: anchor,
                close,
                direction,
            };

            anchor = close;
            self.last_direction = Some(direction);
            self.push_history(brick);
            emitted.push(brick);
        }

        self.anchor = Some(anchor);
        emitted
    }

    fn push_history(&mut self, brick: Brick) {
        self.history.push_back(brick);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchored_at(anchor: f64, size: f64) -> BrickBuilder {
        let mut builder = BrickBuilder::new(200);
        assert!(builder.on_price(anchor, Some(size)).is_empty());
        assert_eq!(builder.anchor(), Some(anchor));
        builder
    }

    fn assert_brick(brick: &Brick, open: f64, close: f64, direction: BrickDirection) {
        assert!((brick.open - open).abs() < 1e-9, "open {} != {}", brick.open, open);
        assert!((brick.close - close).abs() < 1e-9, "close {} != {}", brick.close, close);
        assert_eq!(brick.direction, direction);
    }

    #[test]
    fn test_anchor_rounds_to_brick_multiple() {
        let mut builder = BrickBuilder::new(10);
        builder.on_price(1234.0, Some(10.0));
        assert_eq!(builder.anchor(), Some(1230.0));
        assert!(builder.history().is_empty());
    }

    #[test]
    fn test_no_size_means_no_anchor() {
        let mut builder = BrickBuilder::new(10);
        assert!(builder.on_price(100.0, None).is_empty());
        assert!(builder.on_price(100.0, Some(0.0)).is_empty());
        assert_eq!(builder.anchor(), None);

        // Anchoring waits until a usable size exists
        builder.on_price(104.0, Some(10.0));
        assert_eq!(builder.anchor(), Some(100.0));
    }

    #[test]
    fn test_lost_size_pauses_without_moving_anchor() {
        let mut builder = anchored_at(100.0, 10.0);
        builder.on_price(110.0, Some(10.0));
        assert_eq!(builder.anchor(), Some(110.0));

        // Large moves while the size is unavailable are ignored
        assert!(builder.on_price(150.0, None).is_empty());
        assert!(builder.on_price(60.0, Some(f64::NAN)).is_empty());
        assert_eq!(builder.anchor(), Some(110.0));
        assert_eq!(builder.last_direction(), Some(BrickDirection::Up));
        assert_eq!(builder.history().len(), 1);

        // Once the size is back, bricks continue from the same anchor
        let bricks = builder.on_price(125.0, Some(10.0));
        assert_eq!(bricks.len(), 1);
        assert_brick(&bricks[0], 110.0, 120.0, BrickDirection::Up);
        assert_eq!(builder.anchor(), Some(120.0));
    }

    #[test]
    fn test_single_up_brick() {
        let mut builder = anchored_at(100.0, 10.0);
        let bricks = builder.on_price(110.0, Some(10.0));

        assert_eq!(bricks.len(), 1);
        assert_brick(&bricks[0], 100.0, 110.0, BrickDirection::Up);
        assert_eq!(builder.anchor(), Some(110.0));
    }

    #[test]
    fn test_burst_emits_each_brick() {
        let mut builder = anchored_at(100.0, 10.0);
        let bricks = builder.on_price(137.0, Some(10.0));

        assert_eq!(bricks.len(), 3);
        assert_brick(&bricks[0], 100.0, 110.0, BrickDirection::Up);
        assert_brick(&bricks[1], 110.0, 120.0, BrickDirection::Up);
        assert_brick(&bricks[2], 120.0, 130.0, BrickDirection::Up);
        assert_eq!(builder.anchor(), Some(130.0));
    }

    #[test]
    fn test_reversal_needs_double_move() {
        let mut builder = anchored_at(90.0, 10.0);
        builder.on_price(100.0, Some(10.0));
        assert_eq!(builder.last_direction(), Some(BrickDirection::Up));
        assert_eq!(builder.anchor(), Some(100.0));

        // 15 down against an up brick is not enough
        assert!(builder.on_price(85.0, Some(10.0)).is_empty());

        let bricks = builder.on_price(75.0, Some(10.0));
        assert_eq!(bricks.len(), 1);
        assert_brick(&bricks[0], 100.0, 80.0, BrickDirection::Down);
        assert!((bricks[0].height() - 20.0).abs() < 1e-9);
        assert_eq!(builder.anchor(), Some(80.0));
    }

    #[test]
    fn test_reversal_then_continuation() {
        let mut builder = anchored_at(90.0, 10.0);
        builder.on_price(100.0, Some(10.0));

        // Reversal brick is double height, the rest are single
        let bricks = builder.on_price(55.0, Some(10.0));
        assert_eq!(bricks.len(), 3);
        assert_brick(&bricks[0], 100.0, 80.0, BrickDirection::Down);
        assert_brick(&bricks[1], 80.0, 70.0, BrickDirection::Down);
        assert_brick(&bricks[2], 70.0, 60.0, BrickDirection::Down);
    }

    #[test]
    fn test_no_brick_below_threshold() {
        let mut builder = anchored_at(100.0, 10.0);
        assert!(builder.on_price(109.99, Some(10.0)).is_empty());
        assert!(builder.on_price(90.01, Some(10.0)).is_empty());
        assert_eq!(builder.anchor(), Some(100.0));
    }

    #[test]
    fn test_first_brick_uses_single_threshold_either_way() {
        let mut builder = anchored_at(100.0, 10.0);
        let bricks = builder.on_price(90.0, Some(10.0));
        assert_eq!(bricks.len(), 1);
        assert_brick(&bricks[0], 100.0, 90.0, BrickDirection::Down);
    }

    #[test]
    fn test_bricks_are_contiguous() {
        let mut builder = BrickBuilder::new(1000);
        let prices = [100.0, 131.0, 95.0, 60.0, 140.0, 20.0, 180.0];
        for price in prices {
            builder.on_price(price, Some(10.0));
        }

        let history: Vec<_> = builder.history().iter().collect();
        assert!(history.len() > 5);
        for pair in history.windows(2) {
            assert_eq!(pair[0].close, pair[1].open);
        }
        for brick in &history {
            assert_eq!(brick.close - brick.open > 0.0, brick.direction == BrickDirection::Up);
        }
        assert_eq!(builder.anchor(), history.last().map(|b| b.close));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut builder = BrickBuilder::new(5);
        builder.on_price(100.0, Some(1.0));
        let bricks = builder.on_price(120.0, Some(1.0));

        assert_eq!(bricks.len(), 20);
        assert_eq!(builder.history().len(), 5);
        assert_eq!(builder.last_brick().map(|b| b.close), Some(120.0));
    }

    #[test]
    fn test_deterministic() {
        let prices: Vec<f64> = (0..500)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 25.0 + i as f64 * 0.05)
            .collect();

        let run = || {
            let mut builder = BrickBuilder::new(1000);
            prices
                .iter()
                .flat_map(|&p| builder.on_price(p, Some(2.5)))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_reset() {
        let mut builder = anchored_at(100.0, 10.0);
        builder.on_price(130.0, Some(10.0));
        builder.reset();

        assert_eq!(builder.anchor(), None);
        assert_eq!(builder.last_direction(), None);
        assert!(builder.history().is_empty());
    }
}
