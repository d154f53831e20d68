//! Error types for the Connoxide client

use connoxide_bus::{CallError, TransportError};
use connoxide_proto::ProtocolError;
use thiserror::Error;

/// Main error type for Connoxide operations
#[derive(Debug, Error)]
pub enum ConnmanError {
    /// The bus was unreachable or the daemon failed the handshake
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// A value could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A remote call completed with a failure
    #[error("Call failed: {0}")]
    CallFailed(#[from] CallError),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
