//! Error types for protocol operations

use thiserror::Error;

/// Protocol-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A value had a different shape than the decoder expected
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected value type
        expected: &'static str,
        /// Actual value type
        found: &'static str,
    },

    /// Object path failed validation
    #[error("Invalid object path: {0:?}")]
    InvalidObjectPath(String),

    /// A string did not name any variant of a known enumeration
    #[error("Unknown {kind} value: {value:?}")]
    UnknownVariant {
        /// Enumeration being decoded
        kind: &'static str,
        /// Offending string
        value: String,
    },

    /// A required element was missing from a structure
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(format!("MessagePack encode error: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(format!("MessagePack decode error: {}", err))
    }
}
