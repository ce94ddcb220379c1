//! Transport boundary between a remote invoker and its peer.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tandem_core::{OperationError, RequestContext};
use tokio_util::sync::CancellationToken;

use super::endpoint::RemoteEndpoint;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Content type of encoded envelopes.
pub const MSGPACK_CONTENT_TYPE: &str = "application/msgpack";

/// Path of the single remote endpoint.
pub const REMOTE_PATH: &str = "/api/remote";

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub correlation_id: String,
    /// Encoded `RequestEnvelope`.
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub correlation_id: String,
    /// Encoded `ResponseEnvelope`.
    pub body: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("peer answered with HTTP status {status}")]
    Status { status: u16 },
    #[error("transport closed")]
    Closed,
}

impl From<TransportError> for OperationError {
    fn from(err: TransportError) -> Self {
        match err {
            // The peer shed the request before doing any work.
            TransportError::Status { status: 503 } => Self::Overloaded,
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Moves one encoded request to the peer and its encoded response back.
///
/// Dropping the returned future must abort the exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the exchange itself fails. Errors
    /// raised by the operation travel inside the response body instead.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// POSTs envelopes to `{base}/api/remote`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    bearer: Option<String>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{REMOTE_PATH}", base_url.trim_end_matches('/')),
            bearer: None,
        }
    }

    /// Sends `authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, MSGPACK_CONTENT_TYPE)
            .header(CORRELATION_HEADER, &request.correlation_id)
            .body(request.body);
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        let correlation_id = response
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map_or(request.correlation_id, str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(TransportResponse {
            correlation_id,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// Hands envelopes straight to an in-process [`RemoteEndpoint`].
///
/// Exercises the full encode/decode path without a socket.
#[derive(Clone)]
pub struct LoopbackTransport {
    endpoint: Arc<RemoteEndpoint>,
    context: RequestContext,
    cancel: CancellationToken,
}

impl LoopbackTransport {
    /// `context` stands in for what the hosting layer would extract from the
    /// request (node id, principal).
    #[must_use]
    pub fn new(endpoint: Arc<RemoteEndpoint>, context: RequestContext) -> Self {
        Self {
            endpoint,
            context,
            cancel: CancellationToken::new(),
        }
    }

    /// Token standing in for the peer's own shutdown signal.
    #[must_use]
    pub fn with_peer_shutdown(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let context = self
            .context
            .clone()
            .with_correlation_id(request.correlation_id.clone());
        let body = self
            .endpoint
            .handle(&request.correlation_id, &request.body, context, self.cancel.child_token())
            .await;
        Ok(TransportResponse {
            correlation_id: request.correlation_id,
            body,
        })
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
