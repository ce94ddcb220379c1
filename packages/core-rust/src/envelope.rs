//! Wire envelopes for remote calls.
//!
//! The envelope itself goes through `serde`; its payload fields are already
//! encoded [`rmpv::Value`] trees produced by the ordinal codec. Ordinal
//! deployments write envelopes positionally (`rmp_serde::to_vec`), named
//! deployments as maps (`rmp_serde::to_vec_named`). The correlation id is not
//! part of the body; transports carry it as metadata.

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, PayloadFormat};
use crate::error::{OperationError, WireError};

/// Body of a remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Operation key.
    pub operation: String,
    /// Encoded target entity, for operations that act on one.
    pub target: Option<Value>,
    /// Encoded arguments: an array in declared order (ordinal) or a map keyed
    /// by parameter name (named).
    pub args: Value,
}

/// Body of a remote reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseEnvelope {
    Ok(Value),
    Err(WireError),
}

impl ResponseEnvelope {
    /// Unwraps the reply for the call identified by `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns the error the peer reported, rebuilt as an [`OperationError`].
    pub fn into_result(self, correlation_id: &str) -> Result<Value, OperationError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(err) => Err(err.into_operation_error(correlation_id)),
        }
    }
}

/// Serializes an envelope in the deployment's payload shape.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialization fails.
pub fn encode_envelope<T: Serialize>(format: PayloadFormat, envelope: &T) -> Result<Vec<u8>, CodecError> {
    let bytes = match format {
        PayloadFormat::Ordinal => rmp_serde::to_vec(envelope)?,
        PayloadFormat::Named => rmp_serde::to_vec_named(envelope)?,
    };
    Ok(bytes)
}

/// Deserializes an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the bytes are not a valid envelope.
pub fn decode_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireErrorKind;

    fn request() -> RequestEnvelope {
        RequestEnvelope {
            operation: "person.fetch".to_string(),
            target: None,
            args: Value::Array(vec![Value::from(42u32)]),
        }
    }

    #[test]
    fn request_survives_both_shapes() {
        for format in [PayloadFormat::Ordinal, PayloadFormat::Named] {
            let bytes = encode_envelope(format, &request()).unwrap();
            let decoded: RequestEnvelope = decode_envelope(&bytes).unwrap();
            assert_eq!(decoded, request());
        }
    }

    #[test]
    fn ordinal_envelope_has_no_field_names() {
        let ordinal = encode_envelope(PayloadFormat::Ordinal, &request()).unwrap();
        let named = encode_envelope(PayloadFormat::Named, &request()).unwrap();
        assert!(ordinal.len() < named.len());
        assert!(!ordinal.windows(9).any(|w| w == b"operation"));
        assert!(named.windows(9).any(|w| w == b"operation"));
    }

    #[test]
    fn error_reply_is_rebuilt_on_the_caller() {
        let reply = ResponseEnvelope::Err(WireError {
            kind: WireErrorKind::NotFound,
            message: "no person 42".to_string(),
        });
        let bytes = encode_envelope(PayloadFormat::Ordinal, &reply).unwrap();
        let decoded: ResponseEnvelope = decode_envelope(&bytes).unwrap();
        let err = decoded.into_result("c").unwrap_err();
        assert!(matches!(err, OperationError::NotFound { message } if message == "no person 42"));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = decode_envelope::<RequestEnvelope>(&[0xc1]).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }
}
