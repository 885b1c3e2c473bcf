//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`timeout`]: Caller-deadline enforcement
//! - [`metrics`]: Dispatch timing and outcome via `tracing` spans and `metrics`
//! - [`pipeline`]: Composes all layers around the gateway

pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use metrics::MetricsLayer;
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
pub use timeout::TimeoutLayer;
