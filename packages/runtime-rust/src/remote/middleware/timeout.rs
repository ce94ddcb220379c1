//! Timeout for remote requests.
//!
//! Requests that exceed their `timeout_ms` fail with
//! `OperationError::Timeout`, and their cancellation token is fired so work
//! spawned on behalf of the request winds down too.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use rmpv::Value;
use tandem_core::OperationError;
use tower::{Layer, Service};

use crate::remote::RemoteRequest;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer enforcing each request's own `timeout_ms`.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<RemoteRequest> for TimeoutService<S>
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
        let timeout_ms = req.timeout_ms;
        let cancel = req.cancel.clone();
        let fut = self.inner.call(req);
        Box::pin(async move {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    cancel.cancel();
                    Err(OperationError::Timeout { timeout_ms })
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
