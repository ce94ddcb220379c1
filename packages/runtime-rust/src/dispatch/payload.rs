//! Type-erased values carried through the dispatch path.

use std::any::Any;
use std::sync::Arc;

use rmpv::Value;
use tandem_core::{Args, CodecError, Encoder, OperationDescriptor, OperationError, RequestContext, Wire};

/// A value the dispatch core can hand around without knowing its type.
///
/// Implemented for every [`Wire`] type; the concrete type is recovered with
/// [`downcast`] at the typed edges.
pub trait Payload: Any + Send + Sync {
    fn encode_payload(&self, encoder: &mut Encoder) -> Result<Value, CodecError>;

    fn as_any(&self) -> &(dyn Any + Send + Sync);

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    fn type_name(&self) -> &'static str;
}

impl<T: Wire + Send + Sync + 'static> Payload for T {
    fn encode_payload(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        self.encode(encoder)
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Erases a typed argument list once its arity matches the descriptor's
/// value parameters.
///
/// # Errors
///
/// A count mismatch is an [`OperationError::Configuration`], raised before
/// the executor runs so both topologies reject the call alike.
pub fn args_payload<A>(descriptor: &OperationDescriptor, args: A) -> Result<Box<dyn Payload>, OperationError>
where
    A: Args + Send + Sync + 'static,
{
    let declared = descriptor.value_param_names().len();
    if A::ARITY != declared {
        return Err(OperationError::configuration(format!(
            "{} takes {declared} arguments, called with {}",
            descriptor.key,
            A::ARITY
        )));
    }
    Ok(Box::new(args))
}

/// Recovers the concrete type of a payload.
///
/// # Errors
///
/// A mismatch means a handler was registered under the wrong descriptor and
/// is reported as [`OperationError::Configuration`].
pub fn downcast<T: 'static>(payload: Box<dyn Payload>) -> Result<T, OperationError> {
    let found = payload.type_name();
    payload
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| {
            OperationError::configuration(format!(
                "expected {}, got {found}",
                std::any::type_name::<T>()
            ))
        })
}

/// One call travelling through the dispatch core.
pub struct Invocation {
    pub descriptor: Arc<OperationDescriptor>,
    /// Entity the operation acts on (Insert, Update, Delete).
    pub target: Option<Box<dyn Payload>>,
    /// Value arguments as a tuple in declared order, `()` when there are none.
    pub args: Box<dyn Payload>,
    pub context: RequestContext,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("operation", &self.descriptor.key)
            .field("target", &self.target.as_ref().map(|t| t.type_name()))
            .field("args", &self.args.type_name())
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_the_value() {
        let payload: Box<dyn Payload> = Box::new((7u32, "x".to_string()));
        let (n, s) = downcast::<(u32, String)>(payload).unwrap();
        assert_eq!(n, 7);
        assert_eq!(s, "x");
    }

    #[test]
    fn downcast_mismatch_names_both_types() {
        let payload: Box<dyn Payload> = Box::new(7u32);
        let err = downcast::<String>(payload).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("String"));
        assert!(message.contains("u32"));
    }
}
