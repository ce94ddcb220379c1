//! Client half of a remote call.

use std::sync::Arc;

use bytes::Bytes;
use rmpv::Value;
use tandem_core::codec::args_to_wire;
use tandem_core::envelope::{decode_envelope, encode_envelope};
use tandem_core::{Encoder, OperationError, PayloadFormat, RequestEnvelope, ResponseEnvelope};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::transport::{Transport, TransportRequest};
use crate::dispatch::Invocation;

/// Encodes invocations, sends them through a [`Transport`], and decodes the
/// reply.
#[derive(Clone)]
pub struct RemoteInvoker {
    transport: Arc<dyn Transport>,
    format: PayloadFormat,
}

impl RemoteInvoker {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, format: PayloadFormat) -> Self {
        Self { transport, format }
    }

    #[must_use]
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Sends one invocation and returns the encoded result value.
    ///
    /// The correlation id comes from the caller's context when present,
    /// otherwise a fresh UUID v4 is used. Cancellation drops the in-flight
    /// exchange without waiting for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Cancelled`], a transport or codec error, or
    /// the error the peer reported.
    pub async fn invoke(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<Value, OperationError> {
        let correlation_id = invocation
            .context
            .correlation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let key = invocation.descriptor.key.clone();

        // One encoder for target and args: shared values may span both.
        let mut encoder = Encoder::new(self.format);
        let target = invocation
            .target
            .as_deref()
            .map(|target| target.encode_payload(&mut encoder))
            .transpose()?;
        let args = invocation.args.encode_payload(&mut encoder)?;
        let args = args_to_wire(self.format, &invocation.descriptor.value_param_names(), args)?;

        let envelope = RequestEnvelope {
            operation: key.clone(),
            target,
            args,
        };
        let body = encode_envelope(self.format, &envelope)?;
        let request = TransportRequest {
            correlation_id: correlation_id.clone(),
            body: Bytes::from(body),
        };

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(operation = %key, %correlation_id, "remote call cancelled");
                return Err(OperationError::Cancelled);
            }
            response = self.transport.send(request) => response?,
        };

        if response.correlation_id != correlation_id {
            warn!(
                operation = %key,
                sent = %correlation_id,
                received = %response.correlation_id,
                "correlation id mismatch"
            );
        }
        let reply: ResponseEnvelope = decode_envelope(&response.body)?;
        reply.into_result(&correlation_id)
    }
}

impl std::fmt::Debug for RemoteInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInvoker")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}
