//! Declared property layout of an encodable type.

/// Name and property layout of a declared type.
///
/// Properties are kept in lexicographic order; that order is the ordinal wire
/// contract. A property added later only stays compatible with older peers if
/// it also sorts after every existing property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeShape {
    name: &'static str,
    properties: Vec<&'static str>,
}

impl TypeShape {
    /// Creates a shape, sorting and de-duplicating the property names.
    #[must_use]
    pub fn new(name: &'static str, properties: &[&'static str]) -> Self {
        let mut properties = properties.to_vec();
        properties.sort_unstable();
        properties.dedup();
        Self { name, properties }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Properties in wire order.
    #[must_use]
    pub fn properties(&self) -> &[&'static str] {
        &self.properties
    }

    /// Array position of `property`, if the type declares it.
    #[must_use]
    pub fn position(&self, property: &str) -> Option<usize> {
        self.properties
            .binary_search_by(|candidate| (*candidate).cmp(property))
            .ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
