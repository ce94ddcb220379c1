//! HTTP layers in front of the remote endpoint.
//!
//! Load shedding, the per-operation timeout and metrics belong to the remote
//! pipeline. Here every request gets a correlation id before anything logs,
//! and no request outlives `request_timeout`.

use axum::body::Body;
use axum::http::header::HeaderName;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info_span, Span};

use super::config::NetworkConfig;
use crate::remote::CORRELATION_HEADER;

/// Wraps `router` in the HTTP layers, outermost first:
///
/// 1. `SetRequestId` -- fills in `x-correlation-id` when the caller sent none
/// 2. `Trace` -- one `http` span per request, tagged with the correlation id
/// 3. `Timeout` -- answers 408 once `request_timeout` has passed
pub fn with_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(CORRELATION_HEADER),
            MakeRequestUuid,
        ))
}

fn request_span(request: &Request<Body>) -> Span {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");
    info_span!(
        "http",
        method = %request.method(),
        path = request.uri().path(),
        correlation_id
    )
}
