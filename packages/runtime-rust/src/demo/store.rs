//! Collaborators the demo operations resolve from their scope.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tandem_core::OperationError;

use super::Person;

/// Persistence for [`Person`] records.
#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn get(&self, id: u64) -> Option<Person>;

    /// Stores a new record and assigns its id.
    async fn insert(&self, person: &mut Person) -> Result<(), OperationError>;

    /// # Errors
    ///
    /// [`OperationError::NotFound`] when the record does not exist.
    async fn update(&self, person: &Person) -> Result<(), OperationError>;

    /// # Errors
    ///
    /// [`OperationError::NotFound`] when the record does not exist.
    async fn remove(&self, id: u64) -> Result<(), OperationError>;

    async fn count(&self) -> u64;
}

#[derive(Debug)]
pub struct InMemoryPersonStore {
    records: RwLock<BTreeMap<u64, Person>>,
    next_id: AtomicU64,
}

impl InMemoryPersonStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryPersonStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(id: u64) -> OperationError {
    OperationError::not_found(format!("no person with id {id}"))
}

#[async_trait]
impl PersonStore for InMemoryPersonStore {
    async fn get(&self, id: u64) -> Option<Person> {
        self.records.read().get(&id).cloned()
    }

    async fn insert(&self, person: &mut Person) -> Result<(), OperationError> {
        person.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stored = person.clone();
        stored.is_new = false;
        self.records.write().insert(person.id, stored);
        Ok(())
    }

    async fn update(&self, person: &Person) -> Result<(), OperationError> {
        let mut records = self.records.write();
        let slot = records.get_mut(&person.id).ok_or_else(|| missing(person.id))?;
        *slot = person.clone();
        Ok(())
    }

    async fn remove(&self, id: u64) -> Result<(), OperationError> {
        self.records.write().remove(&id).map(|_| ()).ok_or_else(|| missing(id))
    }

    async fn count(&self) -> u64 {
        u64::try_from(self.records.read().len()).unwrap_or(u64::MAX)
    }
}

/// Sink for audit events.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<String>>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}
