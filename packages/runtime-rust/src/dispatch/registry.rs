//! Operation key -> handler map used by the local executor.

use std::collections::HashMap;
use std::sync::Arc;

use tandem_core::{OperationError, OperationTable};

use super::handler::OperationHandler;

/// Routes operation keys to their registered [`OperationHandler`].
///
/// Built once at the composition root, then shared read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `key`, replacing any previous one.
    pub fn register<H: OperationHandler + 'static>(&mut self, key: impl Into<String>, handler: H) {
        self.handlers.insert(key.into(), Arc::new(handler));
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with<H: OperationHandler + 'static>(mut self, key: impl Into<String>, handler: H) -> Self {
        self.register(key, handler);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Checks that every descriptor in `table` has a handler.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Configuration`] listing the keys without one.
    pub fn verify(&self, table: &OperationTable) -> Result<(), OperationError> {
        let mut missing: Vec<&str> = table
            .iter()
            .map(|descriptor| descriptor.key.as_str())
            .filter(|key| !self.handlers.contains_key(*key))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        Err(OperationError::configuration(format!(
            "operations without a local handler: {}",
            missing.join(", ")
        )))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("HandlerRegistry").field("keys", &keys).finish()
    }
}
