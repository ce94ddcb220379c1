//! Collaborator resolution: typed registry plus per-unit-of-work scopes.
//!
//! Collaborators (repositories, clocks, clients) are registered once at the
//! composition root. Every operation execution gets its own [`Scope`], so
//! scoped collaborators are never shared between two units of work.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tandem_core::{OperationError, OperationTable, RequestContext};

/// Type-erased `Arc<T>`; `T` may be unsized (e.g. `dyn Repository`).
type Instance = Box<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(&ServiceRegistry) -> Instance + Send + Sync>;

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry of collaborators keyed by `TypeId`.
///
/// Two lifetimes are supported:
/// - **Singleton** (`register`): one shared instance for the whole process.
/// - **Scoped** (`register_scoped`): a factory invoked once per [`Scope`].
#[derive(Default)]
pub struct ServiceRegistry {
    singletons: DashMap<TypeId, Instance>,
    scoped: DashMap<TypeId, Factory>,
    /// Type names of everything registered, for composition-time checks.
    names: DashMap<&'static str, TypeId>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a process-wide instance.
    pub fn register<T: ?Sized + Send + Sync + 'static>(&self, instance: Arc<T>) {
        let id = TypeId::of::<T>();
        self.singletons.insert(id, Box::new(instance));
        self.names.insert(std::any::type_name::<T>(), id);
    }

    /// Registers a factory that builds a fresh instance for every scope.
    pub fn register_scoped<T, F>(&self, factory: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceRegistry) -> Arc<T> + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        self.scoped.insert(
            id,
            Arc::new(move |registry: &ServiceRegistry| -> Instance { Box::new(factory(registry)) }),
        );
        self.names.insert(std::any::type_name::<T>(), id);
    }

    /// Retrieves a singleton by type.
    #[must_use]
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.singletons
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value().downcast_ref::<Arc<T>>().cloned())
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.names.contains_key(type_name)
    }

    /// Checks that every injected parameter in `table` can be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Configuration`] listing every operation
    /// whose collaborators are missing.
    pub fn verify(&self, table: &OperationTable) -> Result<(), OperationError> {
        let mut missing: Vec<String> = table
            .iter()
            .flat_map(|descriptor| {
                descriptor
                    .injected_types()
                    .filter(|type_name| !self.contains(type_name))
                    .map(|type_name| format!("{} needs {type_name}", descriptor.key))
                    .collect::<Vec<_>>()
            })
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(OperationError::configuration(format!(
            "unresolvable collaborators: {}",
            missing.join("; ")
        )))
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("singletons", &self.singletons.len())
            .field("scoped", &self.scoped.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// One unit of work: the caller context plus the collaborators resolved for
/// it. Dropped when the operation finishes.
pub struct Scope {
    registry: Arc<ServiceRegistry>,
    context: RequestContext,
    instances: Mutex<HashMap<TypeId, Instance>>,
}

impl Scope {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>, context: RequestContext) -> Self {
        Self {
            registry,
            context,
            instances: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Resolves a collaborator: scoped instances first, then singletons.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Configuration`] naming the type when nothing
    /// is registered for it.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, OperationError> {
        let id = TypeId::of::<T>();

        // Clone the factory out so no registry guard is held while it runs.
        let factory = self.registry.scoped.get(&id).map(|entry| Arc::clone(entry.value()));
        if let Some(factory) = factory {
            // Held across the factory call: one instance per type per scope.
            let mut instances = self.instances.lock();
            let instance = instances.entry(id).or_insert_with(|| factory(&self.registry));
            if let Some(resolved) = instance.downcast_ref::<Arc<T>>().cloned() {
                return Ok(resolved);
            }
        }

        self.registry.get::<T>().ok_or_else(|| {
            OperationError::configuration(format!(
                "no collaborator registered for {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
