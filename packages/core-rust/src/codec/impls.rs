//! [`Wire`] implementations for standard library types.

use std::collections::BTreeMap;

use rmpv::Value;

use super::{Args, CodecError, Decoder, Encoder, Wire};

impl Wire for bool {
    fn encode(&self, _encoder: &mut Encoder) -> Result<Value, CodecError> {
        Ok(Value::Boolean(*self))
    }

    fn decode(_decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        value
            .as_bool()
            .ok_or_else(|| CodecError::type_mismatch("boolean", value))
    }
}

macro_rules! wire_integer {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Wire for $ty {
                fn encode(&self, _encoder: &mut Encoder) -> Result<Value, CodecError> {
                    Ok(Value::from(*self))
                }

                fn decode(_decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
                    let Value::Integer(integer) = value else {
                        return Err(CodecError::type_mismatch(stringify!($ty), value));
                    };
                    integer
                        .as_i64()
                        .and_then(|n| <$ty>::try_from(n).ok())
                        .or_else(|| integer.as_u64().and_then(|n| <$ty>::try_from(n).ok()))
                        .ok_or_else(|| CodecError::type_mismatch(stringify!($ty), value))
                }
            }
        )*
    };
}

wire_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl Wire for f64 {
    fn encode(&self, _encoder: &mut Encoder) -> Result<Value, CodecError> {
        Ok(Value::F64(*self))
    }

    #[allow(clippy::cast_precision_loss)]
    fn decode(_decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::F64(n) => Ok(*n),
            Value::F32(n) => Ok(f64::from(*n)),
            Value::Integer(n) => n
                .as_f64()
                .ok_or_else(|| CodecError::type_mismatch("f64", value)),
            other => Err(CodecError::type_mismatch("f64", other)),
        }
    }
}

impl Wire for String {
    fn encode(&self, _encoder: &mut Encoder) -> Result<Value, CodecError> {
        Ok(Value::from(self.as_str()))
    }

    fn decode(_decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CodecError::type_mismatch("string", value))
    }
}

impl<T: Wire> Wire for Option<T> {
    fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        match self {
            Some(inner) => inner.encode(encoder),
            None => Ok(Value::Nil),
        }
    }

    fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Nil => Ok(None),
            other => T::decode(decoder, other).map(Some),
        }
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        self.iter()
            .map(|item| item.encode(encoder))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        let Value::Array(items) = value else {
            return Err(CodecError::type_mismatch("array", value));
        };
        items.iter().map(|item| T::decode(decoder, item)).collect()
    }
}

impl<T: Wire> Wire for BTreeMap<String, T> {
    fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
        self.iter()
            .map(|(key, item)| Ok((Value::from(key.as_str()), item.encode(encoder)?)))
            .collect::<Result<Vec<_>, CodecError>>()
            .map(Value::Map)
    }

    fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        let Value::Map(entries) = value else {
            return Err(CodecError::type_mismatch("map", value));
        };
        entries
            .iter()
            .map(|(key, item)| {
                let key = key
                    .as_str()
                    .ok_or_else(|| CodecError::type_mismatch("string key", key))?;
                Ok((key.to_string(), T::decode(decoder, item)?))
            })
            .collect()
    }
}

/// The empty argument list.
impl Wire for () {
    fn encode(&self, _encoder: &mut Encoder) -> Result<Value, CodecError> {
        Ok(Value::Array(Vec::new()))
    }

    fn decode(_decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Nil => Ok(()),
            Value::Array(items) if items.is_empty() => Ok(()),
            other => Err(CodecError::type_mismatch("empty array", other)),
        }
    }
}

impl Args for () {
    const ARITY: usize = 0;
}

// Tuples are positional argument lists: always an array, in both formats.
macro_rules! wire_tuple {
    ($len:expr => $($name:ident : $idx:tt),+) => {
        impl<$($name: Wire),+> Wire for ($($name,)+) {
            fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
                Ok(Value::Array(vec![$(self.$idx.encode(encoder)?),+]))
            }

            fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
                let Value::Array(items) = value else {
                    return Err(CodecError::type_mismatch("argument array", value));
                };
                if items.len() != $len {
                    return Err(CodecError::type_mismatch(concat!("array of ", stringify!($len)), value));
                }
                Ok(($($name::decode(decoder, &items[$idx])?,)+))
            }
        }

        impl<$($name: Wire),+> Args for ($($name,)+) {
            const ARITY: usize = $len;
        }
    };
}

wire_tuple!(1 => A: 0);
wire_tuple!(2 => A: 0, B: 1);
wire_tuple!(3 => A: 0, B: 1, C: 2);
wire_tuple!(4 => A: 0, B: 1, C: 2, D: 3);

/// Raw bytes, written as a MsgPack binary rather than an array of integers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Binary(pub Vec<u8>);

impl Wire for Binary {
    fn encode(&self, _encoder: &mut Encoder) -> Result<Value, CodecError> {
        Ok(Value::Binary(self.0.clone()))
    }

    fn decode(_decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Binary(bytes) => Ok(Self(bytes.clone())),
            other => Err(CodecError::type_mismatch("binary", other)),
        }
    }
}
