//! Codec failure types.

use thiserror::Error;

/// A non-nullable property received no value.
///
/// Names the offending property rather than the whole object so a contract
/// mismatch between peers can be located from the log line alone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot map {type_name}.{property}: value is absent but the target is not nullable")]
pub struct MappingError {
    /// Declared type that owns the property.
    pub type_name: String,
    /// Property that was absent or nil.
    pub property: String,
}

impl MappingError {
    #[must_use]
    pub fn new(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            property: property.into(),
        }
    }
}

/// Errors produced while encoding or decoding a payload.
///
/// Every variant indicates a contract mismatch between peers and is fatal to
/// the call that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("unknown type discriminator: {discriminator}")]
    UnknownType { discriminator: String },
    #[error("unknown variant {value} for {type_name}")]
    UnknownVariant { type_name: String, value: String },
    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: String,
    },
    #[error("{type_name} has no property named {property}")]
    UnknownProperty { type_name: String, property: String },
    #[error("reference {id} was used before it was defined")]
    DanglingReference { id: u32 },
    #[error("reference {id} points at a {expected} value of another type")]
    ReferenceType { id: u32, expected: &'static str },
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl CodecError {
    /// Builds a [`CodecError::Type`] describing the value that was found.
    #[must_use]
    pub fn type_mismatch(expected: &'static str, found: &rmpv::Value) -> Self {
        Self::Type {
            expected,
            found: describe(found),
        }
    }
}

/// Short human-readable name of a MsgPack value's kind.
pub(crate) fn describe(value: &rmpv::Value) -> String {
    match value {
        rmpv::Value::Nil => "nil".to_string(),
        rmpv::Value::Boolean(_) => "boolean".to_string(),
        rmpv::Value::Integer(_) => "integer".to_string(),
        rmpv::Value::F32(_) | rmpv::Value::F64(_) => "float".to_string(),
        rmpv::Value::String(_) => "string".to_string(),
        rmpv::Value::Binary(_) => "binary".to_string(),
        rmpv::Value::Array(items) => format!("array of {}", items.len()),
        rmpv::Value::Map(entries) => format!("map of {}", entries.len()),
        rmpv::Value::Ext(tag, _) => format!("ext {tag}"),
    }
}

impl From<rmp_serde::encode::Error> for CodecError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
