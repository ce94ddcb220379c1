//! Transport-agnostic entry point for encoded remote requests.

use bytes::Bytes;
use tandem_core::envelope::{decode_envelope, encode_envelope};
use tandem_core::{OperationError, PayloadFormat, RequestContext, RequestEnvelope, ResponseEnvelope, WireError, WireErrorKind};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tracing::{debug, error};

use super::handler::RemoteRequest;
use super::middleware::RemotePipeline;
use crate::config::RuntimeConfig;

/// Decodes request envelopes, runs them through the pipeline, and encodes
/// the reply. Infrastructure failures never leave this type with their
/// internal message attached.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pipeline: RemotePipeline,
    format: PayloadFormat,
    default_timeout_ms: u64,
    node_id: String,
}

impl RemoteEndpoint {
    #[must_use]
    pub fn new(pipeline: RemotePipeline, config: &RuntimeConfig) -> Self {
        Self {
            pipeline,
            format: config.format,
            default_timeout_ms: config.default_operation_timeout_ms,
            node_id: config.node_id.clone(),
        }
    }

    #[must_use]
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Node id stamped on the contexts of requests received here.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Handles one encoded request and returns the encoded reply.
    ///
    /// Always produces a reply body; failures are carried inside it.
    pub async fn handle(
        &self,
        correlation_id: &str,
        body: &[u8],
        context: RequestContext,
        cancel: CancellationToken,
    ) -> Bytes {
        let reply = match decode_envelope::<RequestEnvelope>(body) {
            Ok(envelope) => {
                let operation = envelope.operation.clone();
                let req = RemoteRequest {
                    correlation_id: correlation_id.to_string(),
                    envelope,
                    context,
                    cancel,
                    timeout_ms: self.default_timeout_ms,
                };
                match self.pipeline.clone().oneshot(req).await {
                    Ok(value) => ResponseEnvelope::Ok(value),
                    Err(err) => ResponseEnvelope::Err(Self::report(&operation, correlation_id, &err)),
                }
            }
            Err(err) => {
                error!(%correlation_id, error = %err, "undecodable request envelope");
                ResponseEnvelope::Err(OperationError::from(err).to_wire(correlation_id))
            }
        };

        match encode_envelope(self.format, &reply) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                error!(%correlation_id, error = %err, "failed to encode reply");
                let fallback = ResponseEnvelope::Err(WireError {
                    kind: WireErrorKind::RemoteExecution,
                    message: format!("remote operation failed (correlation id {correlation_id})"),
                });
                // A bare error envelope holds only strings and always encodes.
                Bytes::from(encode_envelope(self.format, &fallback).unwrap_or_default())
            }
        }
    }

    fn report(operation: &str, correlation_id: &str, err: &OperationError) -> WireError {
        let wire = err.to_wire(correlation_id);
        match wire.kind {
            WireErrorKind::RemoteExecution => {
                error!(operation, correlation_id, error = %err, "remote operation failed");
            }
            _ => {
                debug!(operation, correlation_id, outcome = err.label(), "remote operation rejected");
            }
        }
        wire
    }
}
