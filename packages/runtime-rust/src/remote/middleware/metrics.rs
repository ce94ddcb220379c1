//! Timing and outcome recording for remote requests.
//!
//! Every request gets a `tracing` span plus two `metrics` series:
//! `tandem_operations_total{operation, outcome}` and
//! `tandem_operation_duration_ms{operation}`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use rmpv::Value;
use tandem_core::OperationError;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::remote::RemoteRequest;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Records duration and outcome of each request.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<RemoteRequest> for MetricsService<S>
where
    S: Service<RemoteRequest, Response = Value, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RemoteRequest) -> Self::Future {
        let operation = req.operation().to_string();
        let correlation_id = req.correlation_id.clone();

        let span = info_span!(
            "remote_operation",
            operation = %operation,
            correlation_id = %correlation_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.label(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    "tandem_operations_total",
                    "operation" => operation.clone(),
                    "outcome" => outcome,
                )
                .increment(1);
                metrics::histogram!("tandem_operation_duration_ms", "operation" => operation.clone())
                    .record(elapsed.as_secs_f64() * 1000.0);

                tracing::info!(
                    operation = %operation,
                    correlation_id = %correlation_id,
                    duration_ms,
                    outcome,
                    "remote operation complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
