//! # Connoxide Bus
//!
//! Bus connection plumbing for Connoxide: the transport contract, the
//! background dispatch loop, pending-call tracking and per-proxy callback
//! registries.

#![warn(missing_docs)]

/// Bus-level error types
pub mod error;

/// Transport abstraction
pub mod transport;

/// Pending call tracking and loop lifecycle state
pub mod pending;

/// One-shot continuation registry
pub mod registry;

/// Background dispatch loop
mod event_loop;

/// Connection owner and cloneable handle
pub mod connection;

/// In-memory transport
pub mod memory;

pub use connection::{Connection, ConnectionConfig, ConnectionHandle, SubscriptionId};
pub use error::{CallError, MethodError, TransportError, UnknownToken};
pub use memory::MemoryBus;
pub use pending::LoopStats;
pub use registry::{CallToken, CallbackRegistry};
pub use transport::{
    BusEvent, InboundCall, InboundHandler, MethodCall, Signal, SignalMatch, Transport,
};

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, TransportError>;
