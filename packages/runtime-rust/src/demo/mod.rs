//! Demo `Person` domain served by `tandem-server`.
//!
//! Shows everything a stub generator would emit for one entity type: the
//! wire mapping, descriptors, handler adapters, and a typed client over the
//! dispatch core. Also used as the fixture for the runtime's own tests.

mod store;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use rmpv::Value;
use tandem_core::{
    Authorization, AuthorizationGate, AuthorizeOperation, CodecError, Decoder, DescriptorError,
    Encoder, Entity, FnRule, Lifecycle, OperationDescriptor, OperationError, OperationKind,
    OperationTable, ParamDescriptor, RequestContext, RolePolicy, SaveMeta, TypeShape, Wire,
};
use tokio_util::sync::CancellationToken;

pub use store::{AuditLog, InMemoryPersonStore, PersonStore};

use crate::dispatch::{
    entity_operation, event_operation, execute_operation, DispatchCore, HandlerRegistry,
};
use crate::events::EventHandle;
use crate::services::{Scope, ServiceRegistry};

pub const PERSON_CREATE: &str = "person.create";
pub const PERSON_FETCH: &str = "person.fetch";
pub const PERSON_INSERT: &str = "person.insert";
pub const PERSON_UPDATE: &str = "person.update";
pub const PERSON_DELETE: &str = "person.delete";
pub const PERSON_COUNT: &str = "person.count";
pub const AUDIT_RECORD: &str = "audit.record";

/// Role required to delete people.
pub const ADMIN_ROLE: &str = "admin";

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Person {
    pub id: u64,
    pub name: String,
    pub email: Option<String>,
    pub age: u32,
    pub is_new: bool,
    pub is_deleted: bool,
}

impl Person {
    fn shape() -> &'static TypeShape {
        static SHAPE: OnceLock<TypeShape> = OnceLock::new();
        SHAPE.get_or_init(|| {
            TypeShape::new("Person", &["id", "name", "email", "age", "is_new", "is_deleted"])
        })
    }
}

impl Entity for Person {
    const TYPE_NAME: &'static str = "Person";
}

impl Wire for Person {
    fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        let mut object = encoder.object(Self::shape());
        object
            .field("id", &self.id)?
            .field("name", &self.name)?
            .field("email", &self.email)?
            .field("age", &self.age)?
            .field("is_new", &self.is_new)?
            .field("is_deleted", &self.is_deleted)?;
        object.finish()
    }

    fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        let mut object = decoder.object(Self::shape(), value)?;
        Ok(Self {
            id: object.required("id")?,
            name: object.required("name")?,
            email: object.optional("email")?,
            age: object.required("age")?,
            is_new: object.required("is_new")?,
            is_deleted: object.required("is_deleted")?,
        })
    }
}

impl SaveMeta for Person {
    fn is_new(&self) -> bool {
        self.is_new
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn set_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    fn set_deleted(&mut self, is_deleted: bool) {
        self.is_deleted = is_deleted;
    }
}

#[async_trait]
impl Lifecycle for Person {
    async fn on_start(&mut self, kind: OperationKind) -> Result<(), OperationError> {
        if matches!(kind, OperationKind::Insert | OperationKind::Update) && self.name.trim().is_empty() {
            return Err(OperationError::validation("name must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Descriptor table for the demo domain.
///
/// # Errors
///
/// Only on a duplicate key, which would be a bug in this function.
pub fn operation_table() -> Result<OperationTable, DescriptorError> {
    let store = || ParamDescriptor::injected::<dyn PersonStore>("store");
    OperationTable::builder()
        .register(
            OperationDescriptor::new(PERSON_CREATE, Person::TYPE_NAME, OperationKind::Create)
                .param(ParamDescriptor::value("name"))
                .returns(Person::TYPE_NAME),
        )
        .register(
            OperationDescriptor::new(PERSON_FETCH, Person::TYPE_NAME, OperationKind::Fetch)
                .param(ParamDescriptor::value("id"))
                .param(store())
                .returns(Person::TYPE_NAME),
        )
        .register(
            OperationDescriptor::new(PERSON_INSERT, Person::TYPE_NAME, OperationKind::Insert)
                .param(store())
                .returns(Person::TYPE_NAME),
        )
        .register(
            OperationDescriptor::new(PERSON_UPDATE, Person::TYPE_NAME, OperationKind::Update)
                .param(store())
                .returns(Person::TYPE_NAME),
        )
        .register(
            OperationDescriptor::new(PERSON_DELETE, Person::TYPE_NAME, OperationKind::Delete)
                .param(store())
                .returns(Person::TYPE_NAME),
        )
        .register(
            OperationDescriptor::new(PERSON_COUNT, Person::TYPE_NAME, OperationKind::Execute)
                .param(store())
                .returns("u64"),
        )
        .register(
            OperationDescriptor::new(AUDIT_RECORD, "Audit", OperationKind::Event)
                .param(ParamDescriptor::value("message"))
                .param(ParamDescriptor::injected::<AuditLog>("log")),
        )
        .build()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn create_person<'t>(person: &'t mut Person, (name,): (String,), _scope: Scope) -> BoxFuture<'t, Result<(), OperationError>> {
    Box::pin(async move {
        person.name = name;
        Ok(())
    })
}

fn fetch_person<'t>(person: &'t mut Person, (id,): (u64,), scope: Scope) -> BoxFuture<'t, Result<(), OperationError>> {
    Box::pin(async move {
        let store = scope.resolve::<dyn PersonStore>()?;
        *person = store
            .get(id)
            .await
            .ok_or_else(|| OperationError::not_found(format!("no person with id {id}")))?;
        Ok(())
    })
}

fn insert_person<'t>(person: &'t mut Person, (): (), scope: Scope) -> BoxFuture<'t, Result<(), OperationError>> {
    Box::pin(async move { scope.resolve::<dyn PersonStore>()?.insert(person).await })
}

fn update_person<'t>(person: &'t mut Person, (): (), scope: Scope) -> BoxFuture<'t, Result<(), OperationError>> {
    Box::pin(async move { scope.resolve::<dyn PersonStore>()?.update(person).await })
}

fn delete_person<'t>(person: &'t mut Person, (): (), scope: Scope) -> BoxFuture<'t, Result<(), OperationError>> {
    Box::pin(async move { scope.resolve::<dyn PersonStore>()?.remove(person.id).await })
}

/// Handlers for every descriptor in [`operation_table`].
#[must_use]
pub fn handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(PERSON_CREATE, entity_operation(create_person))
        .with(PERSON_FETCH, entity_operation(fetch_person))
        .with(PERSON_INSERT, entity_operation(insert_person))
        .with(PERSON_UPDATE, entity_operation(update_person))
        .with(PERSON_DELETE, entity_operation(delete_person))
        .with(
            PERSON_COUNT,
            execute_operation(|(): (), scope: Scope| async move {
                Ok(scope.resolve::<dyn PersonStore>()?.count().await)
            }),
        )
        .with(
            AUDIT_RECORD,
            event_operation(|(message,): (String,), scope: Scope, _cancel| async move {
                scope.resolve::<AuditLog>()?.record(message);
                Ok(())
            }),
        )
}

/// Registers the demo collaborators.
#[must_use]
pub fn services(store: Arc<dyn PersonStore>, audit: Arc<AuditLog>) -> ServiceRegistry {
    let registry = ServiceRegistry::new();
    registry.register::<dyn PersonStore>(store);
    registry.register(audit);
    registry
}

/// Authorization for the demo domain.
///
/// Writes need a signed-in caller; deleting needs the admin role.
#[must_use]
pub fn gate() -> AuthorizationGate {
    AuthorizationGate::new()
        .class_rule(
            Person::TYPE_NAME,
            FnRule::new("signed-in-writes", AuthorizeOperation::WRITE, |request| {
                if request.context.principal.is_some() {
                    Authorization::Allowed
                } else {
                    Authorization::deny("sign in to modify people")
                }
            }),
        )
        .policy(RolePolicy::new().require(
            Some(Person::TYPE_NAME),
            AuthorizeOperation::DELETE,
            [ADMIN_ROLE],
        ))
}

// ---------------------------------------------------------------------------
// Typed client
// ---------------------------------------------------------------------------

/// Typed calls over a [`DispatchCore`], identical for local and remote cores.
#[derive(Debug, Clone)]
pub struct People {
    core: Arc<DispatchCore>,
}

impl People {
    #[must_use]
    pub fn new(core: Arc<DispatchCore>) -> Self {
        Self { core }
    }

    /// # Errors
    ///
    /// See [`DispatchCore::create`].
    pub async fn create(&self, name: &str, context: &RequestContext, cancel: CancellationToken) -> Result<Person, OperationError> {
        self.core.create(PERSON_CREATE, (name.to_string(),), context, cancel).await
    }

    /// # Errors
    ///
    /// See [`DispatchCore::fetch`].
    pub async fn fetch(&self, id: u64, context: &RequestContext, cancel: CancellationToken) -> Result<Person, OperationError> {
        self.core.fetch(PERSON_FETCH, (id,), context, cancel).await
    }

    /// # Errors
    ///
    /// See [`DispatchCore::save`].
    pub async fn save(&self, person: Person, context: &RequestContext, cancel: CancellationToken) -> Result<Option<Person>, OperationError> {
        self.core.save(person, context, cancel).await
    }

    /// # Errors
    ///
    /// See [`DispatchCore::execute`].
    pub async fn count(&self, context: &RequestContext, cancel: CancellationToken) -> Result<u64, OperationError> {
        self.core.execute(PERSON_COUNT, (), context, cancel).await
    }

    /// # Errors
    ///
    /// See [`DispatchCore::fire`].
    pub fn audit(&self, message: &str, context: &RequestContext) -> Result<EventHandle, OperationError> {
        self.core.fire(AUDIT_RECORD, (message.to_string(),), context)
    }

    pub async fn can_save(&self, person: &Person, context: &RequestContext) -> bool {
        self.core.can_save(person, context).await
    }
}
