// Bootstrap and live streaming
pub mod lane;
pub mod retry;
pub mod stream;

pub use lane::{LaneReport, SymbolLane};
pub use retry::{Backoff, RetryPolicy};
pub use stream::StreamPipeline;
