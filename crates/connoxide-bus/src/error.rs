//! Bus-level error types

use crate::registry::CallToken;
use connoxide_proto::ProtocolError;
use std::io;
use thiserror::Error;

/// Errors establishing or running a bus connection
#[derive(Debug, Error)]
pub enum TransportError {
    /// The bus could not be reached
    #[error("Bus connection error: {0}")]
    Connection(String),

    /// Introspection of the target object failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The connection was already closed
    #[error("Connection closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Failure of one asynchronous call, delivered to its continuation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The remote side replied with an error
    #[error("Remote error {name}: {message}")]
    Remote {
        /// Error name, e.g. `net.connman.Error.InvalidArguments`
        name: String,
        /// Human-readable message
        message: String,
    },

    /// The loop exited before the call could complete
    #[error("Connection is not running")]
    Disconnected,

    /// The reply could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Error reply to an inbound method call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MethodError {
    /// No object is exported at the path
    #[error("No such object: {0}")]
    UnknownObject(String),

    /// The object does not implement the method
    #[error("No such method: {0}")]
    UnknownMethod(String),

    /// The arguments did not have the expected shape
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    /// The handler failed
    #[error("Failed: {0}")]
    Failed(String),

    /// The handler went away without replying
    #[error("No reply")]
    NoReply,
}

impl MethodError {
    /// Bus error name of the reply
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnknownObject(_) => "org.freedesktop.DBus.Error.UnknownObject",
            Self::UnknownMethod(_) => "org.freedesktop.DBus.Error.UnknownMethod",
            Self::InvalidArgs(_) => "org.freedesktop.DBus.Error.InvalidArgs",
            Self::Failed(_) => "org.freedesktop.DBus.Error.Failed",
            Self::NoReply => "org.freedesktop.DBus.Error.NoReply",
        }
    }
}

impl From<ProtocolError> for MethodError {
    fn from(err: ProtocolError) -> Self {
        Self::InvalidArgs(err.to_string())
    }
}

impl From<MethodError> for CallError {
    fn from(err: MethodError) -> Self {
        Self::Remote {
            name: err.name().to_string(),
            message: err.to_string(),
        }
    }
}

/// A completion arrived for a token with no registered continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown call token: {0}")]
pub struct UnknownToken(pub CallToken);
