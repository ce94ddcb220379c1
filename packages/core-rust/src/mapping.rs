//! Helpers for explicit domain <-> persistence mapping functions.
//!
//! Mappers are plain functions written next to the types they convert. A
//! mapper that reads a nullable source into a non-nullable target goes
//! through [`require`] so the failure names the property.

use crate::codec::MappingError;

/// Unwraps a value that the target type declares non-nullable.
///
/// # Errors
///
/// Returns a [`MappingError`] naming `type_name.property` if `value` is `None`.
pub fn require<T>(type_name: &str, property: &str, value: Option<T>) -> Result<T, MappingError> {
    value.ok_or_else(|| MappingError::new(type_name, property))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PersonRecord {
        name: Option<String>,
        email: Option<String>,
    }

    struct Person {
        name: String,
        email: Option<String>,
    }

    fn to_domain(record: PersonRecord) -> Result<Person, MappingError> {
        Ok(Person {
            name: require("Person", "name", record.name)?,
            email: record.email,
        })
    }

    #[test]
    fn present_value_passes_through() {
        let person = to_domain(PersonRecord {
            name: Some("Grace".to_string()),
            email: None,
        })
        .unwrap();
        assert_eq!(person.name, "Grace");
        assert!(person.email.is_none());
    }

    #[test]
    fn absent_value_names_the_property() {
        let Err(err) = to_domain(PersonRecord {
            name: None,
            email: Some("g@example.com".to_string()),
        }) else {
            panic!("expected a mapping error");
        };
        assert_eq!(err.type_name, "Person");
        assert_eq!(err.property, "name");
        assert!(err.to_string().contains("Person.name"));
    }
}
