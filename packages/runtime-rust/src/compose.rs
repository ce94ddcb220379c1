//! Composition root helpers: wire descriptors, handlers, collaborators and
//! the gate into a ready-to-use dispatch core.

use std::collections::BTreeSet;
use std::sync::Arc;

use tandem_core::{AuthorizationGate, OperationError, OperationKind, OperationTable};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::dispatch::{DispatchCore, Executor, HandlerRegistry, LocalExecutor};
use crate::events::EventTracker;
use crate::remote::{build_remote_pipeline, RemoteEndpoint, RemoteInvoker, RemoteRequestHandler, Transport};
use crate::services::ServiceRegistry;

/// A node that executes operations itself and can serve remote callers.
#[derive(Debug, Clone)]
pub struct LocalRuntime {
    pub core: Arc<DispatchCore>,
    pub events: EventTracker,
    pub endpoint: Arc<RemoteEndpoint>,
}

impl LocalRuntime {
    /// Verifies the composition and builds the local core, its event
    /// tracker, and the remote endpoint in front of it.
    ///
    /// Events and operations received remotely are cancelled when `shutdown`
    /// fires.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Configuration`] when a descriptor has no
    /// handler or an injected collaborator is not registered.
    pub fn build(
        config: &RuntimeConfig,
        table: Arc<OperationTable>,
        gate: AuthorizationGate,
        handlers: HandlerRegistry,
        services: Arc<ServiceRegistry>,
        shutdown: &CancellationToken,
    ) -> Result<Self, OperationError> {
        handlers.verify(&table)?;
        services.verify(&table)?;
        warn_missing_save_routes(&table);

        let executor = LocalExecutor::new(Arc::new(handlers), services);
        let events = EventTracker::new(
            Arc::clone(&table),
            executor.clone(),
            shutdown.child_token(),
            config.node_id.clone(),
        );
        let core = Arc::new(
            DispatchCore::new(Arc::clone(&table), Arc::new(gate), Executor::Local(executor))
                .with_events(events.clone()),
        );
        let handler = RemoteRequestHandler::new(Arc::clone(&core), config.format);
        let endpoint = Arc::new(RemoteEndpoint::new(build_remote_pipeline(handler, config), config));

        info!(
            node_id = %config.node_id,
            format = %config.format,
            operations = table.len(),
            "local runtime composed"
        );
        Ok(Self {
            core,
            events,
            endpoint,
        })
    }
}

/// Builds a core that forwards every call to a peer through `transport`.
///
/// Authorization still runs here first; the peer re-checks on its side.
/// Forwarded events are tracked locally under `shutdown`.
#[must_use]
pub fn forwarding_core(
    config: &RuntimeConfig,
    table: Arc<OperationTable>,
    gate: AuthorizationGate,
    transport: Arc<dyn Transport>,
    shutdown: &CancellationToken,
) -> DispatchCore {
    let events = EventTracker::forwarding(Arc::clone(&table), shutdown.child_token(), config.node_id.clone());
    let invoker = RemoteInvoker::new(transport, config.format);
    DispatchCore::new(table, Arc::new(gate), Executor::Remote(invoker)).with_events(events)
}

/// Logs every entity type that lacks an Insert, Update, or Delete operation.
/// Saving such an entity along the missing route fails at call time.
pub fn warn_missing_save_routes(table: &OperationTable) {
    let entity_types: BTreeSet<&'static str> = table
        .iter()
        .filter(|descriptor| !matches!(descriptor.kind, OperationKind::Execute | OperationKind::Event))
        .map(|descriptor| descriptor.target_type)
        .collect();
    for target_type in entity_types {
        for kind in table.missing_save_routes(target_type) {
            warn!(target_type, route = %kind, "entity type has no operation for save route");
        }
    }
}
