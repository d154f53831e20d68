//! # Connoxide Protocol
//!
//! Value model, payload codec and property decoding for the Connoxide
//! connman client.

#![warn(missing_docs)]

/// Error types for protocol operations
pub mod error;

/// Validated bus object paths
pub mod path;

/// Variant values carried on the bus
pub mod value;

/// Opaque payload codec
pub mod codec;

/// Well-known connman bus, interface, method and property names
pub mod names;

/// Per-entity property sets and their decoders
pub mod props;

pub use codec::Payload;
pub use error::ProtocolError;
pub use path::ObjectPath;
pub use props::{Entity, EntityKind, PropertySet};
pub use value::{PropertyMap, Value};

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
