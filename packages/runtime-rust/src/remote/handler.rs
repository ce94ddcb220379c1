//! Server half of a remote call: decode, authorize, execute, encode.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rmpv::Value;
use tandem_core::codec::args_from_wire;
use tandem_core::{Decoder, Encoder, OperationError, OperationKind, PayloadFormat, RequestContext, RequestEnvelope};
use tokio_util::sync::CancellationToken;
use tower::Service;

use crate::dispatch::{DispatchCore, Invocation};

/// One decoded remote request travelling through the middleware pipeline.
#[derive(Debug)]
pub struct RemoteRequest {
    pub correlation_id: String,
    pub envelope: RequestEnvelope,
    /// Built by the hosting layer: node id, principal, correlation id.
    pub context: RequestContext,
    /// Fires on caller disconnect, timeout, or host shutdown.
    pub cancel: CancellationToken,
    pub timeout_ms: u64,
}

impl RemoteRequest {
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.envelope.operation
    }
}

/// Innermost service of the remote pipeline.
///
/// Rebuilds the typed invocation with the handler's own decoders and hands
/// it to the local [`DispatchCore`], so authorization and lifecycle hooks
/// run on this side of the wire.
#[derive(Debug, Clone)]
pub struct RemoteRequestHandler {
    core: Arc<DispatchCore>,
    format: PayloadFormat,
}

impl RemoteRequestHandler {
    #[must_use]
    pub fn new(core: Arc<DispatchCore>, format: PayloadFormat) -> Self {
        Self { core, format }
    }

    async fn handle(
        core: Arc<DispatchCore>,
        format: PayloadFormat,
        req: RemoteRequest,
    ) -> Result<Value, OperationError> {
        let key = req.envelope.operation;
        let descriptor = core
            .table()
            .get(&key)
            .cloned()
            .ok_or_else(|| OperationError::UnknownOperation { key: key.clone() })?;
        if !descriptor.remote_capable {
            return Err(OperationError::not_authorized(format!(
                "{key} cannot be invoked remotely"
            )));
        }
        let handler = core.local_handler(&key).ok_or_else(|| {
            OperationError::configuration(format!("no local handler for {key}"))
        })?;

        // Same decoder for target then args, mirroring the encoding side.
        let mut decoder = Decoder::new(format);
        let target = req
            .envelope
            .target
            .as_ref()
            .map(|value| handler.decode_target(&mut decoder, value))
            .transpose()?;
        let args = args_from_wire(format, &descriptor.value_param_names(), &req.envelope.args)?;
        let args = handler.decode_args(&mut decoder, &args)?;

        if descriptor.kind == OperationKind::Event {
            let events = core
                .events()
                .ok_or_else(|| OperationError::configuration("no event tracker configured"))?;
            events.fire_invocation(descriptor, args)?;
            return Ok(Value::Nil);
        }

        let invocation = Invocation {
            descriptor,
            target,
            args,
            context: req.context,
        };
        let reply = core.dispatch(invocation, req.cancel).await?;
        let mut encoder = Encoder::new(format);
        Ok(reply.encode(&mut encoder)?)
    }
}

impl Service<RemoteRequest> for RemoteRequestHandler {
    type Response = Value;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RemoteRequest) -> Self::Future {
        Box::pin(Self::handle(Arc::clone(&self.core), self.format, req))
    }
}
