//! Ordinal codec: compact positional encoding of typed values.
//!
//! Values are first turned into an [`rmpv::Value`] tree by their [`Wire`]
//! implementation, then written as MsgPack with `rmp-serde`. Two payload
//! shapes exist, selected once per deployment:
//!
//! - [`PayloadFormat::Ordinal`]: objects are arrays whose positions follow the
//!   lexicographic order of property names (see [`TypeShape`]).
//! - [`PayloadFormat::Named`]: objects are maps keyed by property name.
//!
//! Shared values ([`Shared`]) are written once and referenced by id
//! afterwards, which makes cyclic graphs encodable. Polymorphic values carry a
//! discriminator (see [`Encoder::tagged`]).

mod decoder;
mod encoder;
mod error;
mod impls;
mod shape;
mod shared;

use std::fmt;
use std::str::FromStr;

use rmpv::Value;
use serde::{Deserialize, Serialize};

pub use decoder::{Decoder, ObjectReader};
pub use encoder::{Encoder, ObjectWriter};
pub use error::{CodecError, MappingError};
pub use impls::Binary;
pub use shape::TypeShape;
pub use shared::{shared, Shared};

pub(crate) const ID_KEY: &str = "$id";
pub(crate) const REF_KEY: &str = "$ref";
pub(crate) const TYPE_KEY: &str = "$type";
pub(crate) const VALUE_KEY: &str = "$value";

/// Payload shape used for all traffic of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// Array positions; smaller, requires matching type metadata on both ends.
    #[default]
    Ordinal,
    /// Key/value maps; self-describing, larger.
    Named,
}

impl PayloadFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ordinal => "ordinal",
            Self::Named => "named",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`PayloadFormat`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payload format {0:?}, expected \"ordinal\" or \"named\"")]
pub struct ParseFormatError(String);

impl FromStr for PayloadFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ordinal" => Ok(Self::Ordinal),
            "named" => Ok(Self::Named),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

/// A type that can cross the wire.
///
/// Implementations are normally emitted by the stub generator; object types
/// use [`Encoder::object`] / [`Decoder::object`] with a static [`TypeShape`].
pub trait Wire: Sized {
    /// Encodes `self` into a value tree.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if any part of the value cannot be encoded.
    fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError>;

    /// Decodes a value tree produced by [`Wire::encode`].
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the value does not match the declared type.
    fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError>;
}

/// A positional argument list: `()` or a tuple of up to four [`Wire`]
/// values. Encodes as an array in both formats, which is what
/// [`args_to_wire`] reshapes per parameter name.
pub trait Args: Wire {
    /// Number of positional arguments.
    const ARITY: usize;
}

/// Single-pass encode/decode entry points bound to one [`PayloadFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    format: PayloadFormat,
}

impl Codec {
    #[must_use]
    pub fn new(format: PayloadFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Encodes a value with a fresh reference table.
    ///
    /// # Errors
    ///
    /// See [`Wire::encode`].
    pub fn encode<T: Wire>(&self, value: &T) -> Result<Value, CodecError> {
        Encoder::new(self.format).encode(value)
    }

    /// Decodes a value with a fresh reference table.
    ///
    /// # Errors
    ///
    /// See [`Wire::decode`].
    pub fn decode<T: Wire>(&self, value: &Value) -> Result<T, CodecError> {
        Decoder::new(self.format).decode(value)
    }

    /// Encodes a value straight to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// See [`Wire::encode`]; also fails if the tree cannot be written.
    pub fn to_bytes<T: Wire>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let tree = self.encode(value)?;
        Ok(rmp_serde::to_vec(&tree)?)
    }

    /// Decodes a value from MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are not MsgPack or do not match the declared type.
    pub fn from_bytes<T: Wire>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let tree: Value = rmp_serde::from_slice(bytes)?;
        self.decode(&tree)
    }
}

/// Reshapes a positional argument array for the wire.
///
/// Ordinal payloads keep the array; named payloads become a map keyed by
/// parameter name.
///
/// # Errors
///
/// Returns [`CodecError::Type`] if `args` is not an array of `names.len()`.
pub fn args_to_wire(format: PayloadFormat, names: &[&str], args: Value) -> Result<Value, CodecError> {
    let Value::Array(items) = args else {
        return Err(CodecError::type_mismatch("argument array", &args));
    };
    if items.len() != names.len() {
        return Err(CodecError::Malformed(format!(
            "{} arguments supplied for {} parameters",
            items.len(),
            names.len()
        )));
    }
    Ok(match format {
        PayloadFormat::Ordinal => Value::Array(items),
        PayloadFormat::Named => Value::Map(
            names
                .iter()
                .map(|name| Value::from(*name))
                .zip(items)
                .collect(),
        ),
    })
}

/// Inverse of [`args_to_wire`]: restores declared parameter order.
///
/// Named parameters missing from the map read as nil.
///
/// # Errors
///
/// Returns [`CodecError::Type`] if the payload has the wrong shape.
pub fn args_from_wire(format: PayloadFormat, names: &[&str], args: &Value) -> Result<Value, CodecError> {
    match (format, args) {
        (PayloadFormat::Ordinal, Value::Array(_)) => Ok(args.clone()),
        (PayloadFormat::Named, Value::Map(_)) => Ok(Value::Array(
            names
                .iter()
                .map(|name| decoder::map_get(args, name).cloned().unwrap_or(Value::Nil))
                .collect(),
        )),
        (PayloadFormat::Ordinal, other) => Err(CodecError::type_mismatch("argument array", other)),
        (PayloadFormat::Named, other) => Err(CodecError::type_mismatch("argument map", other)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, OnceLock};

    use proptest::prelude::*;

    use super::*;

    // ---- Fixture types, written the way generated stubs write them ----

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    enum Status {
        #[default]
        Active,
        Suspended,
        Closed,
    }

    impl Status {
        const NAMES: [&'static str; 3] = ["Active", "Suspended", "Closed"];
    }

    impl Wire for Status {
        fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
            let index = *self as u32;
            Ok(encoder.variant(index, Self::NAMES[index as usize]))
        }

        fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
            match decoder.variant("Status", value, &Self::NAMES)? {
                0 => Ok(Self::Active),
                1 => Ok(Self::Suspended),
                _ => Ok(Self::Closed),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    impl Address {
        fn shape() -> &'static TypeShape {
            static SHAPE: OnceLock<TypeShape> = OnceLock::new();
            SHAPE.get_or_init(|| TypeShape::new("Address", &["zip", "city"]))
        }
    }

    impl Wire for Address {
        fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
            let mut object = encoder.object(Self::shape());
            object.field("zip", &self.zip)?.field("city", &self.city)?;
            object.finish()
        }

        fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
            let mut object = decoder.object(Self::shape(), value)?;
            Ok(Self {
                city: object.required("city")?,
                zip: object.optional("zip")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Customer {
        name: String,
        age: u32,
        score: f64,
        status: Status,
        addresses: Vec<Address>,
        tags: BTreeMap<String, i64>,
    }

    impl Customer {
        fn shape() -> &'static TypeShape {
            static SHAPE: OnceLock<TypeShape> = OnceLock::new();
            SHAPE.get_or_init(|| {
                TypeShape::new(
                    "Customer",
                    &["name", "age", "score", "status", "addresses", "tags"],
                )
            })
        }
    }

    impl Wire for Customer {
        fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
            let mut object = encoder.object(Self::shape());
            object
                .field("name", &self.name)?
                .field("age", &self.age)?
                .field("score", &self.score)?
                .field("status", &self.status)?
                .field("addresses", &self.addresses)?
                .field("tags", &self.tags)?;
            object.finish()
        }

        fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
            let mut object = decoder.object(Self::shape(), value)?;
            Ok(Self {
                name: object.required("name")?,
                age: object.required("age")?,
                score: object.required("score")?,
                status: object.required("status")?,
                addresses: object.required("addresses")?,
                tags: object.required("tags")?,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Shape {
        Circle { radius: f64 },
        Square { side: f64 },
    }

    impl Wire for Shape {
        fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
            match self {
                Self::Circle { radius } => {
                    let payload = radius.encode(encoder)?;
                    Ok(encoder.tagged("Circle", payload))
                }
                Self::Square { side } => {
                    let payload = side.encode(encoder)?;
                    Ok(encoder.tagged("Square", payload))
                }
            }
        }

        fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
            let (discriminator, payload) = decoder.tagged(value)?;
            match discriminator {
                "Circle" => Ok(Self::Circle {
                    radius: decoder.decode(payload)?,
                }),
                "Square" => Ok(Self::Square {
                    side: decoder.decode(payload)?,
                }),
                other => Err(CodecError::UnknownType {
                    discriminator: other.to_string(),
                }),
            }
        }
    }

    /// Graph node with an optional edge to another shared node.
    #[derive(Debug, Default)]
    struct Node {
        label: String,
        next: Option<Shared<Node>>,
    }

    impl Node {
        fn shape() -> &'static TypeShape {
            static SHAPE: OnceLock<TypeShape> = OnceLock::new();
            SHAPE.get_or_init(|| TypeShape::new("Node", &["label", "next"]))
        }
    }

    impl Wire for Node {
        fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
            let mut object = encoder.object(Self::shape());
            object.field("label", &self.label)?.field("next", &self.next)?;
            object.finish()
        }

        fn decode(decoder: &mut Decoder, value: &Value) -> Result<Self, CodecError> {
            let mut object = decoder.object(Self::shape(), value)?;
            Ok(Self {
                label: object.required("label")?,
                next: object.optional("next")?,
            })
        }
    }

    fn sample_customer() -> Customer {
        Customer {
            name: "Ada".to_string(),
            age: 36,
            score: 9.5,
            status: Status::Suspended,
            addresses: vec![
                Address {
                    city: "London".to_string(),
                    zip: Some("N1".to_string()),
                },
                Address {
                    city: "Paris".to_string(),
                    zip: None,
                },
            ],
            tags: BTreeMap::from([("vip".to_string(), 1), ("region".to_string(), -4)]),
        }
    }

    // ---- Shapes ----

    #[test]
    fn ordinal_objects_are_arrays_in_lexicographic_order() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let value = codec
            .encode(&Address {
                city: "Oslo".to_string(),
                zip: Some("0150".to_string()),
            })
            .unwrap();
        assert_eq!(
            value,
            Value::Array(vec![Value::from("Oslo"), Value::from("0150")])
        );
    }

    #[test]
    fn named_objects_are_maps_keyed_by_property() {
        let codec = Codec::new(PayloadFormat::Named);
        let value = codec
            .encode(&Address {
                city: "Oslo".to_string(),
                zip: None,
            })
            .unwrap();
        assert_eq!(
            value,
            Value::Map(vec![
                (Value::from("city"), Value::from("Oslo")),
                (Value::from("zip"), Value::Nil),
            ])
        );
    }

    #[test]
    fn ordinal_payload_is_smaller_than_named() {
        let customer = sample_customer();
        let ordinal = Codec::new(PayloadFormat::Ordinal).to_bytes(&customer).unwrap();
        let named = Codec::new(PayloadFormat::Named).to_bytes(&customer).unwrap();
        assert!(ordinal.len() < named.len());
    }

    #[test]
    fn enums_use_index_or_name() {
        let ordinal = Codec::new(PayloadFormat::Ordinal).encode(&Status::Closed).unwrap();
        let named = Codec::new(PayloadFormat::Named).encode(&Status::Closed).unwrap();
        assert_eq!(ordinal, Value::from(2u32));
        assert_eq!(named, Value::from("Closed"));
    }

    // ---- Round trips ----

    #[test]
    fn round_trip_both_formats() {
        for format in [PayloadFormat::Ordinal, PayloadFormat::Named] {
            let codec = Codec::new(format);
            let bytes = codec.to_bytes(&sample_customer()).unwrap();
            let decoded: Customer = codec.from_bytes(&bytes).unwrap();
            assert_eq!(decoded, sample_customer(), "format {format}");
        }
    }

    #[test]
    fn polymorphic_values_round_trip() {
        for format in [PayloadFormat::Ordinal, PayloadFormat::Named] {
            let codec = Codec::new(format);
            let shapes = vec![Shape::Circle { radius: 1.5 }, Shape::Square { side: 2.0 }];
            let bytes = codec.to_bytes(&shapes).unwrap();
            let decoded: Vec<Shape> = codec.from_bytes(&bytes).unwrap();
            assert_eq!(decoded, shapes);
        }
    }

    proptest! {
        #[test]
        fn customer_round_trips(
            name in ".{0,24}",
            age in any::<u32>(),
            score in -1.0e9f64..1.0e9,
            status in 0u32..3,
            cities in proptest::collection::vec(("[a-z]{1,8}", proptest::option::of("[0-9]{4}")), 0..4),
            tags in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..4),
            named in any::<bool>(),
        ) {
            let customer = Customer {
                name,
                age,
                score,
                status: [Status::Active, Status::Suspended, Status::Closed][status as usize],
                addresses: cities
                    .into_iter()
                    .map(|(city, zip)| Address { city, zip })
                    .collect(),
                tags,
            };
            let format = if named { PayloadFormat::Named } else { PayloadFormat::Ordinal };
            let codec = Codec::new(format);
            let bytes = codec.to_bytes(&customer).unwrap();
            let decoded: Customer = codec.from_bytes(&bytes).unwrap();
            prop_assert_eq!(decoded, customer);
        }
    }

    // ---- Failure modes ----

    #[test]
    fn absent_required_property_names_the_property() {
        let codec = Codec::new(PayloadFormat::Named);
        let value = Value::Map(vec![
            (Value::from("city"), Value::Nil),
            (Value::from("zip"), Value::from("0150")),
        ]);
        let err = codec.decode::<Address>(&value).unwrap_err();
        assert_eq!(
            err,
            CodecError::Mapping(MappingError::new("Address", "city"))
        );
    }

    #[test]
    fn short_ordinal_array_reads_trailing_properties_as_absent() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let decoded: Address = codec.decode(&Value::Array(vec![Value::from("Rome")])).unwrap();
        assert_eq!(decoded.city, "Rome");
        assert_eq!(decoded.zip, None);

        let err = codec.decode::<Address>(&Value::Array(vec![])).unwrap_err();
        assert!(matches!(err, CodecError::Mapping(MappingError { property, .. }) if property == "city"));
    }

    #[test]
    fn unknown_discriminator_is_rejected() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let value = Value::Array(vec![Value::from("Hexagon"), Value::F64(1.0)]);
        let err = codec.decode::<Shape>(&value).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownType {
                discriminator: "Hexagon".to_string()
            }
        );
    }

    #[test]
    fn unknown_enum_index_is_rejected() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let err = codec.decode::<Status>(&Value::from(7u32)).unwrap_err();
        assert!(matches!(err, CodecError::UnknownVariant { .. }));
    }

    #[test]
    fn writing_an_undeclared_property_fails() {
        struct Rogue;
        impl Wire for Rogue {
            fn encode(&self, encoder: &mut Encoder) -> Result<Value, CodecError> {
                let mut object = encoder.object(Address::shape());
                object.field("country", &"NO".to_string())?;
                object.finish()
            }
            fn decode(_decoder: &mut Decoder, _value: &Value) -> Result<Self, CodecError> {
                Ok(Self)
            }
        }
        let err = Codec::default().encode(&Rogue).unwrap_err();
        assert!(matches!(err, CodecError::UnknownProperty { property, .. } if property == "country"));
    }

    // ---- Shared values and cycles ----

    #[test]
    fn repeated_shared_value_is_written_once() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let leaf = shared(Node {
            label: "leaf".to_string(),
            next: None,
        });
        let pair = vec![Arc::clone(&leaf), Arc::clone(&leaf)];
        let value = codec.encode(&pair).unwrap();
        let Value::Array(items) = value else {
            panic!("expected array");
        };
        assert!(matches!(&items[0], Value::Array(def) if def.len() == 2));
        assert_eq!(items[1], Value::from(1u32));

        let decoded: Vec<Shared<Node>> = codec.decode(&Value::Array(items)).unwrap();
        assert!(Arc::ptr_eq(&decoded[0], &decoded[1]));
    }

    #[test]
    fn cycle_round_trips_with_identity_preserved() {
        for format in [PayloadFormat::Ordinal, PayloadFormat::Named] {
            let codec = Codec::new(format);
            let a = shared(Node {
                label: "a".to_string(),
                next: None,
            });
            let b = shared(Node {
                label: "b".to_string(),
                next: Some(Arc::clone(&a)),
            });
            a.write().next = Some(Arc::clone(&b));

            let bytes = codec.to_bytes(&a).unwrap();
            let decoded: Shared<Node> = codec.from_bytes(&bytes).unwrap();

            let second = decoded.read().next.clone().expect("a -> b");
            let back = second.read().next.clone().expect("b -> a");
            assert_eq!(decoded.read().label, "a");
            assert_eq!(second.read().label, "b");
            assert!(Arc::ptr_eq(&decoded, &back), "format {format}");

            // Break both cycles so the test does not leak.
            a.write().next = None;
            decoded.write().next = None;
        }
    }

    #[test]
    fn self_loop_round_trips() {
        let codec = Codec::new(PayloadFormat::Named);
        let node = shared(Node {
            label: "self".to_string(),
            next: None,
        });
        node.write().next = Some(Arc::clone(&node));

        let decoded: Shared<Node> = codec.decode(&codec.encode(&node).unwrap()).unwrap();
        let next = decoded.read().next.clone().unwrap();
        assert!(Arc::ptr_eq(&decoded, &next));

        node.write().next = None;
        decoded.write().next = None;
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let err = codec.decode::<Shared<Node>>(&Value::from(9u32)).unwrap_err();
        assert_eq!(err, CodecError::DanglingReference { id: 9 });
    }

    #[test]
    fn reference_tables_do_not_leak_between_passes() {
        let codec = Codec::new(PayloadFormat::Ordinal);
        let node = shared(Node::default());
        let first = codec.encode(&node).unwrap();
        let second = codec.encode(&node).unwrap();
        assert_eq!(first, second);
        assert!(matches!(second, Value::Array(_)));
    }

    // ---- Arguments ----

    #[test]
    fn named_arguments_are_keyed_by_parameter() {
        let mut encoder = Encoder::new(PayloadFormat::Named);
        let positional = encoder.encode(&(7u32, "x".to_string())).unwrap();
        let wire = args_to_wire(PayloadFormat::Named, &["id", "name"], positional.clone()).unwrap();
        assert_eq!(
            wire,
            Value::Map(vec![
                (Value::from("id"), Value::from(7u32)),
                (Value::from("name"), Value::from("x")),
            ])
        );
        let restored = args_from_wire(PayloadFormat::Named, &["id", "name"], &wire).unwrap();
        assert_eq!(restored, positional);
    }

    fn reshapes<A: Args>(args: &A, names: &[&str]) -> bool {
        let positional = Encoder::new(PayloadFormat::Named).encode(args).unwrap();
        A::ARITY == names.len() && args_to_wire(PayloadFormat::Named, names, positional).is_ok()
    }

    #[test]
    fn every_argument_list_reshapes_by_name() {
        assert!(reshapes(&(), &[]));
        assert!(reshapes(&(1u32,), &["a"]));
        assert!(reshapes(&(1u32, "b".to_string()), &["a", "b"]));
        assert!(reshapes(&(1u32, true, 2u64), &["a", "b", "c"]));
        assert!(reshapes(&(1u32, true, 2u64, "d".to_string()), &["a", "b", "c", "d"]));
    }

    #[test]
    fn a_bare_value_is_not_an_argument_list() {
        let bare = Encoder::new(PayloadFormat::Named).encode(&7u32).unwrap();
        assert!(args_to_wire(PayloadFormat::Named, &["id"], bare).is_err());
    }

    #[test]
    fn argument_count_mismatch_is_rejected() {
        let err = args_to_wire(PayloadFormat::Ordinal, &["id"], Value::Array(vec![])).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("Named".parse::<PayloadFormat>().unwrap(), PayloadFormat::Named);
        assert_eq!("ordinal".parse::<PayloadFormat>().unwrap(), PayloadFormat::Ordinal);
        assert!("json".parse::<PayloadFormat>().is_err());
    }
}
