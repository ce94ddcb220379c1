//! Dispatch core: authorization, executor selection, save routing.
//!
//! Per call: `authorize -> execute (local | remote) -> result`. Lifecycle
//! hooks and cancellation handling run inside the executing process (see
//! [`handler`]); the remote path only forwards and decodes.

pub mod executor;
pub mod handler;
pub mod payload;
pub mod registry;

use std::any::Any;
use std::sync::Arc;

use tandem_core::{
    route_save, Args, AuthorizationGate, Entity, OperationDescriptor, OperationError, OperationKind,
    OperationTable, RequestContext, SaveMeta, SaveRoute, Wire,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use executor::{Executor, LocalExecutor, Reply};
pub use handler::{
    entity_operation, event_operation, execute_operation, EntityOperation, EventOperation,
    ExecuteOperation, OperationHandler,
};
pub use payload::{args_payload, downcast, Invocation, Payload};
pub use registry::HandlerRegistry;

use crate::events::{EventHandle, EventTracker};

/// Entry point generated stubs call into.
///
/// The executor is chosen once at composition time; the same call sites run
/// unchanged whether this instance executes locally or forwards to a peer.
#[derive(Debug)]
pub struct DispatchCore {
    table: Arc<OperationTable>,
    gate: Arc<AuthorizationGate>,
    executor: Executor,
    events: Option<EventTracker>,
}

impl DispatchCore {
    #[must_use]
    pub fn new(table: Arc<OperationTable>, gate: Arc<AuthorizationGate>, executor: Executor) -> Self {
        Self {
            table,
            gate,
            executor,
            events: None,
        }
    }

    /// Attaches the tracker that runs fired events.
    #[must_use]
    pub fn with_events(mut self, events: EventTracker) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn table(&self) -> &Arc<OperationTable> {
        &self.table
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    #[must_use]
    pub fn events(&self) -> Option<&EventTracker> {
        self.events.as_ref()
    }

    /// Local handler for `key`, if this core executes locally.
    #[must_use]
    pub fn local_handler(&self, key: &str) -> Option<Arc<dyn OperationHandler>> {
        match &self.executor {
            Executor::Local(local) => local.handler(key),
            Executor::Remote(_) => None,
        }
    }

    fn descriptor(&self, key: &str, expected: OperationKind) -> Result<Arc<OperationDescriptor>, OperationError> {
        let descriptor = self
            .table
            .get(key)
            .ok_or_else(|| OperationError::UnknownOperation { key: key.to_string() })?;
        if descriptor.kind != expected {
            return Err(OperationError::configuration(format!(
                "{key} is a {} operation, called as {expected}",
                descriptor.kind
            )));
        }
        Ok(Arc::clone(descriptor))
    }

    // -----------------------------------------------------------------------
    // Erased entry point
    // -----------------------------------------------------------------------

    /// Authorizes and executes one invocation.
    ///
    /// Events bypass the authorization gate.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotAuthorized`] on denial (the executor is
    /// never reached), [`OperationError::Cancelled`] when `cancel` fires
    /// first, or the executor's error.
    pub async fn dispatch(
        &self,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<Reply, OperationError> {
        if invocation.descriptor.kind != OperationKind::Event {
            let target = invocation.target.as_deref().map(Payload::as_any);
            self.gate
                .check(&invocation.descriptor, target, &invocation.context)
                .await?;
        }

        let key = invocation.descriptor.key.clone();
        let result = match &self.executor {
            Executor::Local(local) => local.execute(invocation, cancel).await.map(Reply::Local),
            Executor::Remote(remote) => remote
                .invoke(invocation, cancel)
                .await
                .map(|value| Reply::Remote {
                    value,
                    format: remote.format(),
                }),
        };
        if let Err(OperationError::Cancelled) = &result {
            debug!(operation = %key, "dispatch cancelled");
        }
        result
    }

    // -----------------------------------------------------------------------
    // Typed entry points
    // -----------------------------------------------------------------------

    async fn call<R: Wire + 'static>(
        &self,
        descriptor: Arc<OperationDescriptor>,
        target: Option<Box<dyn Payload>>,
        args: Box<dyn Payload>,
        context: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<R, OperationError> {
        let invocation = Invocation {
            descriptor,
            target,
            args,
            context: context.clone(),
        };
        self.dispatch(invocation, cancel).await?.into_typed::<R>()
    }

    /// Creates a new entity with default values.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn create<T, A>(
        &self,
        key: &str,
        args: A,
        context: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<T, OperationError>
    where
        T: Wire + Send + Sync + 'static,
        A: Args + Send + Sync + 'static,
    {
        let descriptor = self.descriptor(key, OperationKind::Create)?;
        let args = args_payload(&descriptor, args)?;
        self.call(descriptor, None, args, context, cancel).await
    }

    /// Loads an existing entity.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn fetch<T, A>(
        &self,
        key: &str,
        args: A,
        context: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<T, OperationError>
    where
        T: Wire + Send + Sync + 'static,
        A: Args + Send + Sync + 'static,
    {
        let descriptor = self.descriptor(key, OperationKind::Fetch)?;
        let args = args_payload(&descriptor, args)?;
        self.call(descriptor, None, args, context, cancel).await
    }

    /// Runs a command and returns its result.
    ///
    /// # Errors
    ///
    /// See [`dispatch`](Self::dispatch).
    pub async fn execute<A, R>(
        &self,
        key: &str,
        args: A,
        context: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<R, OperationError>
    where
        A: Args + Send + Sync + 'static,
        R: Wire + Send + Sync + 'static,
    {
        let descriptor = self.descriptor(key, OperationKind::Execute)?;
        let args = args_payload(&descriptor, args)?;
        self.call(descriptor, None, args, context, cancel).await
    }

    /// Persists an entity through the route its flags select.
    ///
    /// Returns the updated entity for Insert and Update, and `None` for
    /// Delete and for a new entity that was deleted before it was ever
    /// saved (no handler or rule is invoked in that case).
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::NotImplemented`] when the entity type has no
    /// operation for the selected route, otherwise see
    /// [`dispatch`](Self::dispatch).
    pub async fn save<T>(
        &self,
        entity: T,
        context: &RequestContext,
        cancel: CancellationToken,
    ) -> Result<Option<T>, OperationError>
    where
        T: Entity + SaveMeta + Wire + Send + Sync + 'static,
    {
        let route = route_save(&entity);
        let Some(kind) = route.kind() else {
            debug!(target_type = T::TYPE_NAME, "save skipped: new entity already deleted");
            return Ok(None);
        };
        let descriptor = self
            .table
            .save_route(T::TYPE_NAME, kind)
            .cloned()
            .ok_or_else(|| OperationError::NotImplemented {
                type_name: T::TYPE_NAME.to_string(),
                route: route.to_string(),
            })?;

        let mut saved: T = self
            .call(descriptor, Some(Box::new(entity)), Box::new(()), context, cancel)
            .await?;
        match route {
            SaveRoute::Delete => Ok(None),
            SaveRoute::Insert | SaveRoute::Update => {
                saved.set_new(false);
                saved.set_deleted(false);
                Ok(Some(saved))
            }
            SaveRoute::NoOp => Ok(None),
        }
    }

    /// Fires an event and returns immediately.
    ///
    /// Events run in their own scope under the tracker's shutdown token and
    /// are not authorized.
    ///
    /// # Errors
    ///
    /// Fails only for unknown keys, non-event operations, or a core without
    /// an event tracker.
    pub fn fire<A>(&self, key: &str, args: A, context: &RequestContext) -> Result<EventHandle, OperationError>
    where
        A: Args + Send + Sync + 'static,
    {
        let descriptor = self.descriptor(key, OperationKind::Event)?;
        let args = args_payload(&descriptor, args)?;
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| OperationError::configuration("no event tracker configured"))?;

        match &self.executor {
            Executor::Local(_) => events.fire_invocation(descriptor, args),
            Executor::Remote(remote) => {
                let remote = remote.clone();
                let invocation = Invocation {
                    descriptor: Arc::clone(&descriptor),
                    target: None,
                    args,
                    context: context.clone(),
                };
                Ok(events.track(descriptor.key.clone(), move |cancel| async move {
                    remote.invoke(invocation, cancel).await.map(|_| ())
                }))
            }
        }
    }

    // -----------------------------------------------------------------------
    // "Can I do this" queries
    // -----------------------------------------------------------------------

    /// Whether the caller may run `key` against `target`. Nothing executes.
    ///
    /// Unknown keys answer `false`; events always answer `true`.
    pub async fn can(
        &self,
        key: &str,
        target: Option<&(dyn Any + Send + Sync)>,
        context: &RequestContext,
    ) -> bool {
        let Some(descriptor) = self.table.get(key) else {
            return false;
        };
        if descriptor.kind == OperationKind::Event {
            return true;
        }
        self.gate.can(descriptor, target, context).await
    }

    /// Whether saving `entity` would be allowed in its current state.
    pub async fn can_save<T>(&self, entity: &T, context: &RequestContext) -> bool
    where
        T: Entity + SaveMeta + Send + Sync + 'static,
    {
        let Some(kind) = route_save(entity).kind() else {
            return true;
        };
        match self.table.save_route(T::TYPE_NAME, kind) {
            Some(descriptor) => self.gate.can(descriptor, Some(entity), context).await,
            None => false,
        }
    }
}
