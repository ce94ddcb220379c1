//! Pipeline composition for remote requests.

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use super::timeout::{TimeoutLayer, TimeoutService};
use crate::config::RuntimeConfig;
use crate::remote::RemoteRequestHandler;

/// Concrete pipeline type, nameable so endpoints can store and clone it.
pub type RemotePipeline = LoadShedService<TimeoutService<MetricsService<RemoteRequestHandler>>>;

/// Wraps the request handler with the middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `LoadShedLayer` -- reject when overloaded, before any work
/// 2. `TimeoutLayer` -- enforce the per-request timeout
/// 3. `MetricsLayer` -- record timing and outcome next to the handler
#[must_use]
pub fn build_remote_pipeline(handler: RemoteRequestHandler, config: &RuntimeConfig) -> RemotePipeline {
    ServiceBuilder::new()
        .layer(LoadShedLayer::new(config.max_concurrent_operations))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(handler)
}
