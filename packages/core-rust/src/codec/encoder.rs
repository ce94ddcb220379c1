//! Encoding side of the ordinal codec.

use std::collections::HashMap;

use rmpv::Value;

use super::error::{CodecError, MappingError};
use super::shape::TypeShape;
use super::{PayloadFormat, Wire, ID_KEY, REF_KEY, TYPE_KEY, VALUE_KEY};

/// Single-pass encoder.
///
/// Owns the reference table used for shared (possibly cyclic) values, so one
/// encoder must not be reused across unrelated calls.
#[derive(Debug)]
pub struct Encoder {
    format: PayloadFormat,
    references: HashMap<usize, u32>,
    next_reference: u32,
}

impl Encoder {
    #[must_use]
    pub fn new(format: PayloadFormat) -> Self {
        Self {
            format,
            references: HashMap::new(),
            next_reference: 1,
        }
    }

    #[must_use]
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Encodes a value as part of this pass.
    ///
    /// # Errors
    ///
    /// Propagates any error raised by the value's [`Wire`] implementation.
    pub fn encode<T: Wire>(&mut self, value: &T) -> Result<Value, CodecError> {
        value.encode(self)
    }

    /// Starts writing an object with the given shape.
    pub fn object(&mut self, shape: &'static TypeShape) -> ObjectWriter<'_> {
        ObjectWriter {
            slots: vec![None; shape.len()],
            encoder: self,
            shape,
        }
    }

    /// Encodes an enum variant: its index (ordinal) or its name (named).
    #[must_use]
    pub fn variant(&self, index: u32, name: &str) -> Value {
        match self.format {
            PayloadFormat::Ordinal => Value::from(index),
            PayloadFormat::Named => Value::from(name),
        }
    }

    /// Wraps a payload with the discriminator of its concrete type.
    #[must_use]
    pub fn tagged(&self, discriminator: &str, payload: Value) -> Value {
        match self.format {
            PayloadFormat::Ordinal => Value::Array(vec![Value::from(discriminator), payload]),
            PayloadFormat::Named => Value::Map(vec![
                (Value::from(TYPE_KEY), Value::from(discriminator)),
                (Value::from(VALUE_KEY), payload),
            ]),
        }
    }

    pub(crate) fn known_reference(&self, address: usize) -> Option<u32> {
        self.references.get(&address).copied()
    }

    pub(crate) fn register_reference(&mut self, address: usize) -> u32 {
        let id = self.next_reference;
        self.next_reference += 1;
        self.references.insert(address, id);
        id
    }

    /// Marker written for every occurrence after the first.
    pub(crate) fn reference(&self, id: u32) -> Value {
        match self.format {
            PayloadFormat::Ordinal => Value::from(id),
            PayloadFormat::Named => Value::Map(vec![(Value::from(REF_KEY), Value::from(id))]),
        }
    }

    /// Full payload written for the first occurrence, tagged with its id.
    pub(crate) fn definition(&self, id: u32, payload: Value) -> Value {
        match self.format {
            PayloadFormat::Ordinal => Value::Array(vec![Value::from(id), payload]),
            PayloadFormat::Named => Value::Map(vec![
                (Value::from(ID_KEY), Value::from(id)),
                (Value::from(VALUE_KEY), payload),
            ]),
        }
    }
}

/// Writes the properties of one object.
///
/// Properties may be written in any order; the output always follows the
/// shape's lexicographic order.
pub struct ObjectWriter<'e> {
    encoder: &'e mut Encoder,
    shape: &'static TypeShape,
    slots: Vec<Option<Value>>,
}

impl ObjectWriter<'_> {
    /// Encodes one property.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownProperty`] if the shape does not declare
    /// `property`, or any error from encoding the value itself.
    pub fn field<T: Wire>(&mut self, property: &str, value: &T) -> Result<&mut Self, CodecError> {
        let Some(position) = self.shape.position(property) else {
            return Err(CodecError::UnknownProperty {
                type_name: self.shape.name().to_string(),
                property: property.to_string(),
            });
        };
        let encoded = value.encode(self.encoder)?;
        self.slots[position] = Some(encoded);
        Ok(self)
    }

    /// Emits the object.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] naming the first declared property that was
    /// never written.
    pub fn finish(self) -> Result<Value, CodecError> {
        let ObjectWriter {
            encoder,
            shape,
            slots,
        } = self;

        let mut values = Vec::with_capacity(slots.len());
        for (property, slot) in shape.properties().iter().zip(slots) {
            match slot {
                Some(value) => values.push(value),
                None => return Err(MappingError::new(shape.name(), *property).into()),
            }
        }

        Ok(match encoder.format {
            PayloadFormat::Ordinal => Value::Array(values),
            PayloadFormat::Named => Value::Map(
                shape
                    .properties()
                    .iter()
                    .map(|property| Value::from(*property))
                    .zip(values)
                    .collect(),
            ),
        })
    }
}
