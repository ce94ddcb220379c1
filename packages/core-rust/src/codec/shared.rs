//! Shared values: the only values that take part in reference tracking.

use std::sync::Arc;

use parking_lot::RwLock;
use rmpv::Value;

use super::decoder::ReferenceForm;
use super::{CodecError, Decoder, Encoder, Wire};

/// A value with identity. Object graphs, including cyclic ones, are built
/// from `Shared` cells.
///
/// Cycles made of `Arc`s are never freed on their own; break them (for
/// example by clearing a back-pointer) when the graph is no longer needed.
pub type Shared<T> = Arc<RwLock<T>>;

/// Wraps a value in a new [`Shared`] cell.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

impl<T> Wire for Arc<RwLock<T>>
where
    T: Wire + Default + Send + Sync + 'static,
{
    fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        let address = Arc::as_ptr(self) as usize;
        if let Some(id) = encoder.known_reference(address) {
            return Ok(encoder.reference(id));
        }
        // Registered before the payload so nested occurrences become references.
        let id = encoder.register_reference(address);
        let payload = self.read().encode(encoder)?;
        Ok(encoder.definition(id, payload))
    }

    fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        match decoder.reference_form(value)? {
            ReferenceForm::Reference(id) => {
                decoder.resolve_reference::<Self>(id, std::any::type_name::<T>())
            }
            ReferenceForm::Definition(id, payload) => {
                let cell = shared(T::default());
                decoder.register_reference(id, Box::new(Arc::clone(&cell)));
                let inner = T::decode(decoder, payload)?;
                *cell.write() = inner;
                Ok(cell)
            }
        }
    }
}
