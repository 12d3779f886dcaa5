// Technical indicators module
// Volatility measures used to size bricks

pub mod atr;

pub use atr::{calculate_atr, calculate_atr_series, true_range, VolatilityMethod};
