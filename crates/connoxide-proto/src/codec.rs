//! Opaque payload codec

use crate::{ProtocolError, Value};
use bytes::Bytes;
use std::fmt;

/// Encoded body of a call, reply or signal.
///
/// The transport moves payloads without looking inside them. Only the client
/// side decodes a payload back into a [`Value`], through [`Payload::decode`].
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Payload(Bytes);

impl Payload {
    /// Encode a value to MessagePack
    pub fn encode(value: &Value) -> Result<Self, ProtocolError> {
        let bytes = rmp_serde::to_vec(value)?;
        Ok(Self(Bytes::from(bytes)))
    }

    /// Payload of the empty structure
    pub fn unit() -> Self {
        // The unit value always encodes
        Self::encode(&Value::unit()).unwrap_or_default()
    }

    /// Decode the payload into a value
    pub fn decode(&self) -> Result<Value, ProtocolError> {
        if self.0.is_empty() {
            return Ok(Value::unit());
        }
        Ok(rmp_serde::from_slice(&self.0)?)
    }

    /// Decode the payload as a structure of exactly `arity` arguments
    pub fn decode_args(&self, arity: usize) -> Result<Vec<Value>, ProtocolError> {
        match self.decode()? {
            Value::Struct(args) if args.len() == arity => Ok(args),
            Value::Struct(args) => Err(ProtocolError::Serialization(format!(
                "Expected {} arguments, got {}",
                arity,
                args.len()
            ))),
            other => Err(ProtocolError::TypeMismatch {
                expected: "struct",
                found: other.type_name(),
            }),
        }
    }

    /// Wrap already-encoded bytes
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Borrow the encoded bytes
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length payload
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.0.len()).finish()
    }
}

impl TryFrom<&Value> for Payload {
    type Error = ProtocolError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::encode(value)
    }
}

impl TryFrom<Value> for Payload {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::encode(&value)
    }
}
