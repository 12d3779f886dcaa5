// Order execution and position tracking
pub mod executor;
pub mod paper;
pub mod position_engine;
pub mod sizing;

pub use executor::OrderExecutor;
pub use paper::{PaperExecutor, PaperSummary, PaperTrade};
pub use position_engine::{PositionEngine, PositionRecord, TradeAction};
pub use sizing::SizingPolicy;
