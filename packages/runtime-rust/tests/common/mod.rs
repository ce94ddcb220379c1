//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tandem_core::{
    AuthorizationGate, OperationDescriptor, OperationError, OperationKind, OperationTable,
    PayloadFormat, Principal, RequestContext,
};
use tandem_runtime::demo::{self, AuditLog, InMemoryPersonStore, People, Person, PersonStore};
use tandem_runtime::dispatch::execute_operation;
use tandem_runtime::{
    forwarding_core, HandlerRegistry, LocalRuntime, LoopbackTransport, RuntimeConfig, Scope,
    ServiceRegistry,
};
use tokio_util::sync::CancellationToken;

pub const SLOW: &str = "ops.slow";
pub const EXPLODE: &str = "ops.explode";
pub const LOCAL_ONLY: &str = "ops.local_only";

/// Counts store calls so tests can prove a call never reached persistence.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryPersonStore,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub removes: AtomicUsize,
}

impl CountingStore {
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.inserts() + self.updates() + self.removes()
    }
}

#[async_trait]
impl PersonStore for CountingStore {
    async fn get(&self, id: u64) -> Option<Person> {
        self.inner.get(id).await
    }

    async fn insert(&self, person: &mut Person) -> Result<(), OperationError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(person).await
    }

    async fn update(&self, person: &Person) -> Result<(), OperationError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(person).await
    }

    async fn remove(&self, id: u64) -> Result<(), OperationError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(id).await
    }

    async fn count(&self) -> u64 {
        self.inner.count().await
    }
}

/// A server node hosting the demo domain plus a few operational fixtures.
pub struct Server {
    pub runtime: LocalRuntime,
    pub store: Arc<CountingStore>,
    pub audit: Arc<AuditLog>,
    pub shutdown: CancellationToken,
}

pub fn config(format: PayloadFormat) -> RuntimeConfig {
    RuntimeConfig {
        node_id: "server".to_string(),
        format,
        ..RuntimeConfig::default()
    }
}

/// Demo descriptors plus `ops.slow`, `ops.explode` and a server-only operation.
pub fn table() -> OperationTable {
    let mut builder = OperationTable::builder();
    for descriptor in demo::operation_table().unwrap().iter() {
        builder = builder.register((**descriptor).clone());
    }
    builder
        .register(
            OperationDescriptor::new(SLOW, "Ops", OperationKind::Execute)
                .param(tandem_core::ParamDescriptor::value("delay_ms"))
                .returns("u64"),
        )
        .register(OperationDescriptor::new(EXPLODE, "Ops", OperationKind::Execute).returns("u64"))
        .register(OperationDescriptor::new(LOCAL_ONLY, "Ops", OperationKind::Execute).returns("u64").local_only())
        .build()
        .unwrap()
}

pub fn handlers() -> HandlerRegistry {
    demo::handlers()
        .with(
            SLOW,
            execute_operation(|(delay_ms,): (u64,), _scope: Scope| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(delay_ms)
            }),
        )
        .with(
            EXPLODE,
            execute_operation(|(): (), _scope: Scope| async move {
                Err::<u64, _>(OperationError::Internal(anyhow::anyhow!(
                    "connection to postgres://admin:hunter2@db failed"
                )))
            }),
        )
        .with(LOCAL_ONLY, execute_operation(|(): (), _scope: Scope| async move { Ok(7u64) }))
}

pub fn server_with(config: &RuntimeConfig) -> Server {
    let store = Arc::new(CountingStore::default());
    let audit = Arc::new(AuditLog::new());
    let services: ServiceRegistry = demo::services(Arc::clone(&store) as Arc<dyn PersonStore>, Arc::clone(&audit));
    let shutdown = CancellationToken::new();
    let runtime = LocalRuntime::build(
        config,
        Arc::new(table()),
        demo::gate(),
        handlers(),
        Arc::new(services),
        &shutdown,
    )
    .unwrap();
    Server {
        runtime,
        store,
        audit,
        shutdown,
    }
}

pub fn server(format: PayloadFormat) -> Server {
    server_with(&config(format))
}

pub fn client_gate() -> AuthorizationGate {
    demo::gate()
}

/// Forwarding client whose calls arrive at `server` as `peer_context`.
pub fn loopback_people(server: &Server, format: PayloadFormat, peer_context: RequestContext) -> People {
    let transport = LoopbackTransport::new(Arc::clone(&server.runtime.endpoint), peer_context)
        .with_peer_shutdown(server.shutdown.clone());
    let core = forwarding_core(
        &RuntimeConfig {
            node_id: "client".to_string(),
            format,
            ..RuntimeConfig::default()
        },
        Arc::new(table()),
        client_gate(),
        Arc::new(transport),
        &CancellationToken::new(),
    );
    People::new(Arc::new(core))
}

pub fn admin(node: &str) -> RequestContext {
    RequestContext::new(node).with_principal(Principal::new("alice").with_role(demo::ADMIN_ROLE))
}

pub fn member(node: &str) -> RequestContext {
    RequestContext::new(node).with_principal(Principal::new("bob"))
}

pub fn anonymous(node: &str) -> RequestContext {
    RequestContext::new(node)
}
