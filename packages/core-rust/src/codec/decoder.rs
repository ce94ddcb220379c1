//! Decoding side of the ordinal codec.

use std::any::Any;
use std::collections::HashMap;

use rmpv::Value;

use super::error::{CodecError, MappingError};
use super::shape::TypeShape;
use super::{PayloadFormat, Wire, ID_KEY, REF_KEY, TYPE_KEY, VALUE_KEY};

/// How a shared value appears on the wire.
pub(crate) enum ReferenceForm<'v> {
    /// First occurrence: the id followed by the full payload.
    Definition(u32, &'v Value),
    /// Later occurrence: the id alone.
    Reference(u32),
}

/// Single-pass decoder.
///
/// Shared values are registered in the reference table as soon as they are
/// allocated, before their payload is decoded, so back-references inside the
/// payload resolve to the same allocation.
pub struct Decoder {
    format: PayloadFormat,
    references: HashMap<u32, Box<dyn Any + Send + Sync>>,
}

impl Decoder {
    #[must_use]
    pub fn new(format: PayloadFormat) -> Self {
        Self {
            format,
            references: HashMap::new(),
        }
    }

    #[must_use]
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Decodes a value as part of this pass.
    ///
    /// # Errors
    ///
    /// Propagates any error raised by the type's [`Wire`] implementation.
    pub fn decode<T: Wire>(&mut self, value: &Value) -> Result<T, CodecError> {
        T::decode(self, value)
    }

    /// Opens an object payload for property-by-property reading.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Type`] if the payload is not an array (ordinal)
    /// or a map (named).
    pub fn object<'d, 'v>(
        &'d mut self,
        shape: &'static TypeShape,
        value: &'v Value,
    ) -> Result<ObjectReader<'d, 'v>, CodecError> {
        let fields = match (self.format, value) {
            (PayloadFormat::Ordinal, Value::Array(items)) => Fields::Ordinal(items.as_slice()),
            (PayloadFormat::Named, Value::Map(entries)) => Fields::Named(entries.as_slice()),
            (PayloadFormat::Ordinal, other) => {
                return Err(CodecError::type_mismatch("object array", other))
            }
            (PayloadFormat::Named, other) => return Err(CodecError::type_mismatch("object map", other)),
        };
        Ok(ObjectReader {
            decoder: self,
            shape,
            fields,
        })
    }

    /// Decodes an enum variant and returns its index within `names`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownVariant`] when the index or name is not
    /// one of `names`.
    pub fn variant(
        &self,
        type_name: &str,
        value: &Value,
        names: &[&str],
    ) -> Result<usize, CodecError> {
        let unknown = || CodecError::UnknownVariant {
            type_name: type_name.to_string(),
            value: value.to_string(),
        };
        match (self.format, value) {
            (PayloadFormat::Ordinal, Value::Integer(index)) => index
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i < names.len())
                .ok_or_else(unknown),
            (PayloadFormat::Named, Value::String(name)) => name
                .as_str()
                .and_then(|name| names.iter().position(|candidate| *candidate == name))
                .ok_or_else(unknown),
            (PayloadFormat::Ordinal, other) => Err(CodecError::type_mismatch("variant index", other)),
            (PayloadFormat::Named, other) => Err(CodecError::type_mismatch("variant name", other)),
        }
    }

    /// Splits a polymorphic payload into its discriminator and inner payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Type`] if the value is not a tagged payload.
    pub fn tagged<'v>(&self, value: &'v Value) -> Result<(&'v str, &'v Value), CodecError> {
        let parts = match (self.format, value) {
            (PayloadFormat::Ordinal, Value::Array(items)) if items.len() == 2 => {
                items[0].as_str().map(|tag| (tag, &items[1]))
            }
            (PayloadFormat::Named, Value::Map(_)) => {
                map_get(value, TYPE_KEY).and_then(Value::as_str).zip(map_get(value, VALUE_KEY))
            }
            _ => None,
        };
        parts.ok_or_else(|| CodecError::type_mismatch("tagged value", value))
    }

    pub(crate) fn reference_form<'v>(
        &self,
        value: &'v Value,
    ) -> Result<ReferenceForm<'v>, CodecError> {
        let form = match (self.format, value) {
            (PayloadFormat::Ordinal, Value::Integer(id)) => {
                reference_id(id).map(ReferenceForm::Reference)
            }
            (PayloadFormat::Ordinal, Value::Array(items)) if items.len() == 2 => match &items[0] {
                Value::Integer(id) => reference_id(id).map(|id| ReferenceForm::Definition(id, &items[1])),
                _ => None,
            },
            (PayloadFormat::Named, Value::Map(_)) => {
                if let Some(Value::Integer(id)) = map_get(value, REF_KEY) {
                    reference_id(id).map(ReferenceForm::Reference)
                } else if let (Some(Value::Integer(id)), Some(payload)) =
                    (map_get(value, ID_KEY), map_get(value, VALUE_KEY))
                {
                    reference_id(id).map(|id| ReferenceForm::Definition(id, payload))
                } else {
                    None
                }
            }
            _ => None,
        };
        form.ok_or_else(|| CodecError::type_mismatch("shared reference", value))
    }

    pub(crate) fn register_reference(&mut self, id: u32, cell: Box<dyn Any + Send + Sync>) {
        self.references.insert(id, cell);
    }

    pub(crate) fn resolve_reference<T: Clone + 'static>(
        &self,
        id: u32,
        expected: &'static str,
    ) -> Result<T, CodecError> {
        let cell = self
            .references
            .get(&id)
            .ok_or(CodecError::DanglingReference { id })?;
        cell.downcast_ref::<T>()
            .cloned()
            .ok_or(CodecError::ReferenceType { id, expected })
    }
}

fn reference_id(id: &rmpv::Integer) -> Option<u32> {
    id.as_u64().and_then(|id| u32::try_from(id).ok())
}

/// Looks up a string key in a MsgPack map.
pub(crate) fn map_get<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v),
        _ => None,
    }
}

#[derive(Clone, Copy)]
enum Fields<'v> {
    Ordinal(&'v [Value]),
    Named(&'v [(Value, Value)]),
}

/// Reads the properties of one object.
///
/// Ordinal payloads shorter than the shape are tolerated: trailing properties
/// a peer does not know about yet read as absent.
pub struct ObjectReader<'d, 'v> {
    decoder: &'d mut Decoder,
    shape: &'static TypeShape,
    fields: Fields<'v>,
}

impl<'v> ObjectReader<'_, 'v> {
    fn raw(&self, property: &str) -> Result<Option<&'v Value>, CodecError> {
        let Some(position) = self.shape.position(property) else {
            return Err(CodecError::UnknownProperty {
                type_name: self.shape.name().to_string(),
                property: property.to_string(),
            });
        };
        Ok(match self.fields {
            Fields::Ordinal(items) => items.get(position),
            Fields::Named(entries) => entries
                .iter()
                .find(|(key, _)| key.as_str() == Some(property))
                .map(|(_, value)| value),
        })
    }

    /// Reads a non-nullable property.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] naming the property if it is absent or nil.
    pub fn required<T: Wire>(&mut self, property: &str) -> Result<T, CodecError> {
        match self.raw(property)? {
            None | Some(Value::Nil) => {
                Err(MappingError::new(self.shape.name(), property).into())
            }
            Some(value) => T::decode(&mut *self.decoder, value),
        }
    }

    /// Reads a nullable property.
    ///
    /// # Errors
    ///
    /// Propagates decode errors for present, non-nil values.
    pub fn optional<T: Wire>(&mut self, property: &str) -> Result<Option<T>, CodecError> {
        match self.raw(property)? {
            None | Some(Value::Nil) => Ok(None),
            Some(value) => T::decode(&mut *self.decoder, value).map(Some),
        }
    }
}
