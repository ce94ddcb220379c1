//! Local and remote execution strategies.

use std::sync::Arc;

use rmpv::Value;
use tandem_core::{CodecError, Decoder, Encoder, OperationError, PayloadFormat, Wire};
use tokio_util::sync::CancellationToken;

use super::handler::OperationHandler;
use super::payload::{downcast, Invocation, Payload};
use super::registry::HandlerRegistry;
use crate::remote::RemoteInvoker;
use crate::services::{Scope, ServiceRegistry};

/// Runs operations in this process, each in a fresh [`Scope`].
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    handlers: Arc<HandlerRegistry>,
    services: Arc<ServiceRegistry>,
}

impl LocalExecutor {
    #[must_use]
    pub fn new(handlers: Arc<HandlerRegistry>, services: Arc<ServiceRegistry>) -> Self {
        Self { handlers, services }
    }

    #[must_use]
    pub fn handler(&self, key: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(key)
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Executes one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::UnknownOperation`] when no handler is
    /// registered for the key, otherwise whatever the handler returns.
    pub async fn execute(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<Box<dyn Payload>, OperationError> {
        let handler = self.handler(&invocation.descriptor.key).ok_or_else(|| {
            OperationError::UnknownOperation {
                key: invocation.descriptor.key.clone(),
            }
        })?;
        let scope = Scope::new(Arc::clone(&self.services), invocation.context.clone());
        handler.call(invocation, scope, cancel).await
    }
}

/// Execution strategy, fixed when a [`DispatchCore`](super::DispatchCore) is
/// composed.
#[derive(Debug, Clone)]
pub enum Executor {
    Local(LocalExecutor),
    Remote(RemoteInvoker),
}

/// Result of a dispatched operation.
pub enum Reply {
    /// Produced in-process; recovered by downcast.
    Local(Box<dyn Payload>),
    /// Received from a peer; decoded with the caller's declared type.
    Remote { value: Value, format: PayloadFormat },
}

impl Reply {
    /// Recovers the typed result.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a remote value does not decode as `R`, or a
    /// configuration error if a local value has another type.
    pub fn into_typed<R: Wire + 'static>(self) -> Result<R, OperationError> {
        match self {
            Self::Local(payload) => downcast::<R>(payload),
            Self::Remote { value, format } => Ok(Decoder::new(format).decode::<R>(&value)?),
        }
    }

    /// Encodes the result for the wire.
    ///
    /// # Errors
    ///
    /// Propagates the payload's codec error.
    pub fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        match self {
            Self::Local(payload) => payload.encode_payload(encoder),
            Self::Remote { value, .. } => Ok(value.clone()),
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(payload) => f.debug_tuple("Local").field(&payload.type_name()).finish(),
            Self::Remote { value, format } => f
                .debug_struct("Remote")
                .field("value", value)
                .field("format", format)
                .finish(),
        }
    }
}
