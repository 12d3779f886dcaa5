// Renko brick construction
// Bars feed the volatility estimate, prices feed the brick builder

pub mod aggregator;
pub mod bar_window;
pub mod brick_builder;
pub mod symbol_state;
pub mod volatility;

pub use aggregator::BarAggregator;
pub use bar_window::BarWindow;
pub use brick_builder::BrickBuilder;
pub use symbol_state::{RenkoSettings, SymbolState};
pub use volatility::VolatilityEstimator;
