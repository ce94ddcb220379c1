//! Save routing: one `save` call, four possible outcomes.

use std::fmt;

use crate::descriptor::OperationKind;

/// An entity whose persistence state is tracked by two flags.
///
/// Routing looks at these flags and nothing else.
pub trait SaveMeta {
    fn is_new(&self) -> bool;
    fn is_deleted(&self) -> bool;
    fn set_new(&mut self, is_new: bool);
    fn set_deleted(&mut self, is_deleted: bool);

    /// Marks the entity for deletion on the next save.
    fn mark_deleted(&mut self) {
        self.set_deleted(true);
    }
}

/// Outcome of [`route_save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveRoute {
    Insert,
    Update,
    Delete,
    /// Created and deleted before ever being persisted.
    NoOp,
}

impl SaveRoute {
    /// Operation kind the route dispatches to; `None` for [`SaveRoute::NoOp`].
    #[must_use]
    pub fn kind(self) -> Option<OperationKind> {
        match self {
            Self::Insert => Some(OperationKind::Insert),
            Self::Update => Some(OperationKind::Update),
            Self::Delete => Some(OperationKind::Delete),
            Self::NoOp => None,
        }
    }
}

impl fmt::Display for SaveRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        })
    }
}

/// Selects the save route for an entity.
#[must_use]
pub fn route_save<E: SaveMeta + ?Sized>(entity: &E) -> SaveRoute {
    match (entity.is_new(), entity.is_deleted()) {
        (true, false) => SaveRoute::Insert,
        (false, false) => SaveRoute::Update,
        (false, true) => SaveRoute::Delete,
        (true, true) => SaveRoute::NoOp,
    }
}
