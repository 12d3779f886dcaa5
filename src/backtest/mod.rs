pub mod loader;
pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use loader::{closes_as_ticks, load_bars_csv, read_bars};
pub use metrics::BacktestMetrics;
pub use runner::BacktestRunner;
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
