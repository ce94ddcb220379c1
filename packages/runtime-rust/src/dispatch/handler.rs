//! Executable side of an operation, and the adapters a stub generator emits.
//!
//! Each adapter wraps a typed body into an [`OperationHandler`] that works on
//! erased [`Payload`]s. The adapters own the local half of the dispatch state
//! machine: lifecycle hooks, cancellation, and save-flag normalisation.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use rmpv::Value;
use tandem_core::{Args, CodecError, Decoder, Lifecycle, OperationError, OperationKind, SaveMeta, Wire};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::payload::{downcast, Invocation, Payload};
use crate::services::Scope;

/// Erased executable registered under one operation key.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Runs the operation in the given scope.
    ///
    /// # Errors
    ///
    /// Returns whatever the body or its hooks returned, or
    /// [`OperationError::Cancelled`] when `cancel` fired first.
    async fn call(
        &self,
        invocation: Invocation,
        scope: Scope,
        cancel: CancellationToken,
    ) -> Result<Box<dyn Payload>, OperationError>;

    /// Decodes a wire target into the handler's entity type.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the value does not match the type, or
    /// when the operation takes no target.
    fn decode_target(&self, decoder: &mut Decoder, value: &Value) -> Result<Box<dyn Payload>, CodecError>;

    /// Decodes wire arguments (already in declared order) into the
    /// handler's argument tuple.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the value does not match the tuple.
    fn decode_args(&self, decoder: &mut Decoder, value: &Value) -> Result<Box<dyn Payload>, CodecError>;
}

fn no_target() -> CodecError {
    CodecError::Malformed("operation does not take a target".to_string())
}

// ---------------------------------------------------------------------------
// Entity operations: Create, Fetch, Insert, Update, Delete
// ---------------------------------------------------------------------------

/// Handler for an operation on an entity instance.
pub struct EntityOperation<T, A, F> {
    body: F,
    _types: PhantomData<fn(T, A)>,
}

/// Wraps an entity body.
///
/// The body receives the target (a fresh `T::default()` for Create and
/// Fetch), the argument tuple, and the unit-of-work scope.
pub fn entity_operation<T, A, F>(body: F) -> EntityOperation<T, A, F>
where
    F: for<'t> Fn(&'t mut T, A, Scope) -> BoxFuture<'t, Result<(), OperationError>> + Send + Sync + 'static,
{
    EntityOperation {
        body,
        _types: PhantomData,
    }
}

/// Normalises the save flags after a successful entity operation.
fn settle<T: SaveMeta>(entity: &mut T, kind: OperationKind) {
    match kind {
        OperationKind::Create => {
            entity.set_new(true);
            entity.set_deleted(false);
        }
        OperationKind::Fetch | OperationKind::Insert | OperationKind::Update => {
            entity.set_new(false);
            entity.set_deleted(false);
        }
        OperationKind::Delete | OperationKind::Execute | OperationKind::Event => {}
    }
}

#[async_trait]
impl<T, A, F> OperationHandler for EntityOperation<T, A, F>
where
    T: Wire + Lifecycle + SaveMeta + Default + Send + Sync + 'static,
    A: Args + Send + Sync + 'static,
    F: for<'t> Fn(&'t mut T, A, Scope) -> BoxFuture<'t, Result<(), OperationError>> + Send + Sync + 'static,
{
    async fn call(
        &self,
        invocation: Invocation,
        scope: Scope,
        cancel: CancellationToken,
    ) -> Result<Box<dyn Payload>, OperationError> {
        let kind = invocation.descriptor.kind;
        let mut entity = match invocation.target {
            Some(target) => downcast::<T>(target)?,
            None => T::default(),
        };
        let args = downcast::<A>(invocation.args)?;

        entity.on_start(kind).await?;

        let outcome = {
            let body = (self.body)(&mut entity, args, scope);
            tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = body => Some(result),
            }
        };

        match outcome {
            None => {
                debug!(operation = %invocation.descriptor.key, "operation cancelled");
                entity.on_cancelled(kind).await;
                Err(OperationError::Cancelled)
            }
            Some(Err(err)) => Err(err),
            Some(Ok(())) => {
                settle(&mut entity, kind);
                entity.on_complete(kind).await;
                Ok(Box::new(entity))
            }
        }
    }

    fn decode_target(&self, decoder: &mut Decoder, value: &Value) -> Result<Box<dyn Payload>, CodecError> {
        Ok(Box::new(decoder.decode::<T>(value)?))
    }

    fn decode_args(&self, decoder: &mut Decoder, value: &Value) -> Result<Box<dyn Payload>, CodecError> {
        Ok(Box::new(decoder.decode::<A>(value)?))
    }
}

// ---------------------------------------------------------------------------
// Execute operations
// ---------------------------------------------------------------------------

/// Handler for a command that returns a value and has no target instance.
pub struct ExecuteOperation<A, R, F> {
    body: F,
    _types: PhantomData<fn(A) -> R>,
}

pub fn execute_operation<A, R, F, Fut>(body: F) -> ExecuteOperation<A, R, F>
where
    F: Fn(A, Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
{
    ExecuteOperation {
        body,
        _types: PhantomData,
    }
}

#[async_trait]
impl<A, R, F, Fut> OperationHandler for ExecuteOperation<A, R, F>
where
    A: Args + Send + Sync + 'static,
    R: Wire + Send + Sync + 'static,
    F: Fn(A, Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, OperationError>> + Send + 'static,
{
    async fn call(
        &self,
        invocation: Invocation,
        scope: Scope,
        cancel: CancellationToken,
    ) -> Result<Box<dyn Payload>, OperationError> {
        let args = downcast::<A>(invocation.args)?;
        let body = (self.body)(args, scope);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(operation = %invocation.descriptor.key, "operation cancelled");
                Err(OperationError::Cancelled)
            }
            result = body => result.map(|value| Box::new(value) as Box<dyn Payload>),
        }
    }

    fn decode_target(&self, _decoder: &mut Decoder, _value: &Value) -> Result<Box<dyn Payload>, CodecError> {
        Err(no_target())
    }

    fn decode_args(&self, decoder: &mut Decoder, value: &Value) -> Result<Box<dyn Payload>, CodecError> {
        Ok(Box::new(decoder.decode::<A>(value)?))
    }
}

// ---------------------------------------------------------------------------
// Event operations
// ---------------------------------------------------------------------------

/// Handler for a fire-and-forget operation.
///
/// The body receives the cancellation token and decides itself when to stop;
/// nothing aborts it from outside.
pub struct EventOperation<A, F> {
    body: F,
    _types: PhantomData<fn(A)>,
}

pub fn event_operation<A, F, Fut>(body: F) -> EventOperation<A, F>
where
    F: Fn(A, Scope, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
{
    EventOperation {
        body,
        _types: PhantomData,
    }
}

#[async_trait]
impl<A, F, Fut> OperationHandler for EventOperation<A, F>
where
    A: Args + Send + Sync + 'static,
    F: Fn(A, Scope, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), OperationError>> + Send + 'static,
{
    async fn call(
        &self,
        invocation: Invocation,
        scope: Scope,
        cancel: CancellationToken,
    ) -> Result<Box<dyn Payload>, OperationError> {
        // No race on `cancel`: the body is never aborted from outside.
        let args = downcast::<A>(invocation.args)?;
        (self.body)(args, scope, cancel)
            .await
            .map(|()| Box::new(()) as Box<dyn Payload>)
    }

    fn decode_target(&self, _decoder: &mut Decoder, _value: &Value) -> Result<Box<dyn Payload>, CodecError> {
        Err(no_target())
    }

    fn decode_args(&self, decoder: &mut Decoder, value: &Value) -> Result<Box<dyn Payload>, CodecError> {
        Ok(Box::new(decoder.decode::<A>(value)?))
    }
}
