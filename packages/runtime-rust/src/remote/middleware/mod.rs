//! Tower middleware for the remote request pipeline.
//!
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`timeout`]: Per-request timeout that also cancels the operation
//! - [`metrics`]: Timing, outcome, and counters per operation key
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::{build_remote_pipeline, RemotePipeline};
pub use timeout::TimeoutLayer;
