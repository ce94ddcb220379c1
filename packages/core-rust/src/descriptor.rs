//! Operation descriptors and the table they are registered in.
//!
//! A descriptor is the metadata a stub generator emits for one callable unit.
//! The [`OperationTable`] is built once at startup and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// What an operation does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Fetch,
    Insert,
    Update,
    Delete,
    Execute,
    Event,
}

impl OperationKind {
    pub const ALL: [Self; 7] = [
        Self::Create,
        Self::Fetch,
        Self::Insert,
        Self::Update,
        Self::Delete,
        Self::Execute,
        Self::Event,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Fetch => "fetch",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Execute => "execute",
            Self::Event => "event",
        }
    }

    /// Whether the operation runs against an entity instance.
    #[must_use]
    pub fn has_target(self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type that operations can target. The name links the type to the
/// descriptors registered for it.
pub trait Entity {
    const TYPE_NAME: &'static str;
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where a parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Supplied by the caller and carried on the wire.
    Value,
    /// Resolved from the executing process's collaborator registry.
    Injected { type_name: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamDescriptor {
    #[must_use]
    pub fn value(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Value,
        }
    }

    /// A collaborator parameter, resolved by type on the executing side.
    #[must_use]
    pub fn injected<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Injected {
                type_name: std::any::type_name::<T>(),
            },
        }
    }

    #[must_use]
    pub fn is_injected(&self) -> bool {
        matches!(self.kind, ParamKind::Injected { .. })
    }
}

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// Immutable metadata for one callable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    /// Stable key shared by both ends of the wire, e.g. `"person.insert"`.
    pub key: String,
    pub target_type: &'static str,
    pub kind: OperationKind,
    /// Parameters in declared order.
    pub params: Vec<ParamDescriptor>,
    pub return_type: &'static str,
    pub remote_capable: bool,
}

impl OperationDescriptor {
    #[must_use]
    pub fn new(key: impl Into<String>, target_type: &'static str, kind: OperationKind) -> Self {
        Self {
            key: key.into(),
            target_type,
            kind,
            params: Vec::new(),
            return_type: "()",
            remote_capable: true,
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn returns(mut self, return_type: &'static str) -> Self {
        self.return_type = return_type;
        self
    }

    /// Marks the operation as server-only: remote peers may not invoke it.
    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.remote_capable = false;
        self
    }

    /// Names of the parameters carried on the wire, in declared order.
    #[must_use]
    pub fn value_param_names(&self) -> Vec<&'static str> {
        self.params
            .iter()
            .filter(|p| !p.is_injected())
            .map(|p| p.name)
            .collect()
    }

    /// Type names of the collaborators the operation needs.
    pub fn injected_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().filter_map(|p| match p.kind {
            ParamKind::Injected { type_name } => Some(type_name),
            ParamKind::Value => None,
        })
    }
}

// ---------------------------------------------------------------------------
// OperationTable
// ---------------------------------------------------------------------------

/// Errors raised while building an [`OperationTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("operation key registered twice: {key}")]
    Duplicate { key: String },
    #[error("{target_type} declares more than one {kind} operation ({first}, {second})")]
    AmbiguousSaveRoute {
        target_type: &'static str,
        kind: OperationKind,
        first: String,
        second: String,
    },
}

/// Read-only index of every operation known to the process.
#[derive(Debug, Default)]
pub struct OperationTable {
    by_key: HashMap<String, Arc<OperationDescriptor>>,
    by_route: HashMap<(&'static str, OperationKind), Arc<OperationDescriptor>>,
}

impl OperationTable {
    #[must_use]
    pub fn builder() -> OperationTableBuilder {
        OperationTableBuilder::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<OperationDescriptor>> {
        self.by_key.get(key)
    }

    /// Descriptor that handles `kind` for `target_type`.
    ///
    /// Only Insert, Update and Delete are indexed: these are the operations a
    /// save can route to.
    #[must_use]
    pub fn save_route(
        &self,
        target_type: &'static str,
        kind: OperationKind,
    ) -> Option<&Arc<OperationDescriptor>> {
        self.by_route.get(&(target_type, kind))
    }

    /// Save routes a target type declares no operation for.
    ///
    /// Composition roots call this at startup so a missing handler is found
    /// before the first save hits it.
    #[must_use]
    pub fn missing_save_routes(&self, target_type: &'static str) -> Vec<OperationKind> {
        [OperationKind::Insert, OperationKind::Update, OperationKind::Delete]
            .into_iter()
            .filter(|kind| self.save_route(target_type, *kind).is_none())
            .collect()
    }

    /// Distinct target types, sorted.
    #[must_use]
    pub fn target_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.by_key.values().map(|d| d.target_type).collect();
        types.sort_unstable();
        types.dedup();
        types
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<OperationDescriptor>> {
        self.by_key.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct OperationTableBuilder {
    descriptors: Vec<OperationDescriptor>,
}

impl OperationTableBuilder {
    #[must_use]
    pub fn register(mut self, descriptor: OperationDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Freezes the table.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::Duplicate`] when two descriptors share a
    /// key, and [`DescriptorError::AmbiguousSaveRoute`] when a target type
    /// declares two operations for the same save route.
    pub fn build(self) -> Result<OperationTable, DescriptorError> {
        let mut table = OperationTable::default();
        for descriptor in self.descriptors {
            if table.by_key.contains_key(&descriptor.key) {
                return Err(DescriptorError::Duplicate {
                    key: descriptor.key,
                });
            }
            let descriptor = Arc::new(descriptor);
            if descriptor.kind.has_target() {
                let route = (descriptor.target_type, descriptor.kind);
                if let Some(first) = table.by_route.get(&route) {
                    return Err(DescriptorError::AmbiguousSaveRoute {
                        target_type: descriptor.target_type,
                        kind: descriptor.kind,
                        first: first.key.clone(),
                        second: descriptor.key.clone(),
                    });
                }
                table.by_route.insert(route, Arc::clone(&descriptor));
            }
            table.by_key.insert(descriptor.key.clone(), descriptor);
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repository;

    fn person_table() -> OperationTable {
        OperationTable::builder()
            .register(
                OperationDescriptor::new("person.create", "Person", OperationKind::Create)
                    .returns("Person"),
            )
            .register(
                OperationDescriptor::new("person.insert", "Person", OperationKind::Insert)
                    .param(ParamDescriptor::injected::<Repository>("repo"))
                    .returns("Person"),
            )
            .register(
                OperationDescriptor::new("person.rename", "Person", OperationKind::Execute)
                    .param(ParamDescriptor::value("id"))
                    .param(ParamDescriptor::injected::<Repository>("repo"))
                    .param(ParamDescriptor::value("name")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_by_key() {
        let table = person_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("person.insert").unwrap().kind, OperationKind::Insert);
        assert!(table.get("person.delete").is_none());
    }

    #[test]
    fn save_routes_are_indexed_by_type_and_kind() {
        let table = person_table();
        assert_eq!(
            table.save_route("Person", OperationKind::Insert).unwrap().key,
            "person.insert"
        );
        assert!(table.save_route("Person", OperationKind::Update).is_none());
        assert_eq!(
            table.missing_save_routes("Person"),
            vec![OperationKind::Update, OperationKind::Delete]
        );
    }

    #[test]
    fn value_params_skip_injected_collaborators() {
        let table = person_table();
        let rename = table.get("person.rename").unwrap();
        assert_eq!(rename.value_param_names(), vec!["id", "name"]);
        let injected: Vec<_> = rename.injected_types().collect();
        assert_eq!(injected.len(), 1);
        assert!(injected[0].ends_with("Repository"));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let err = OperationTable::builder()
            .register(OperationDescriptor::new("a", "A", OperationKind::Execute))
            .register(OperationDescriptor::new("a", "A", OperationKind::Execute))
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::Duplicate { key: "a".to_string() });
    }

    #[test]
    fn two_deletes_for_one_type_are_rejected() {
        let err = OperationTable::builder()
            .register(OperationDescriptor::new("a.delete", "A", OperationKind::Delete))
            .register(OperationDescriptor::new("a.purge", "A", OperationKind::Delete))
            .build()
            .unwrap_err();
        assert!(matches!(err, DescriptorError::AmbiguousSaveRoute { .. }));
    }

    #[test]
    fn target_types_are_distinct() {
        assert_eq!(person_table().target_types(), vec!["Person"]);
    }
}
