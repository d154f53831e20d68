//! Transport abstraction
//!
//! The core never touches the wire. It drives a [`Transport`], which
//! delivers replies as [`Payload`]s and pushes signals and inbound calls on
//! the event channel returned by [`Transport::handshake`].

use crate::{CallError, MethodError, TransportError};
use async_trait::async_trait;
use connoxide_proto::{ObjectPath, Payload};
use tokio::sync::{mpsc, oneshot};

/// Bus transport contract
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Introspect `path` on `destination` and open the event stream.
    ///
    /// Called once, before the dispatch loop starts. Failure is fatal for the
    /// connection.
    async fn handshake(
        &self,
        destination: &str,
        path: &ObjectPath,
    ) -> Result<mpsc::UnboundedReceiver<BusEvent>, TransportError>;

    /// Perform one method call and wait for its reply
    async fn call(&self, call: MethodCall) -> Result<Payload, CallError>;

    /// Ask the bus to deliver signals matching `rule`
    async fn add_match(&self, rule: SignalMatch) -> Result<(), TransportError>;

    /// Withdraw one instance of a rule installed with [`Transport::add_match`]
    async fn remove_match(&self, rule: SignalMatch) -> Result<(), TransportError>;

    /// Announce a local object implementing `interface`
    async fn export(&self, path: &ObjectPath, interface: &str) -> Result<(), TransportError>;

    /// Withdraw a local object
    async fn unexport(&self, path: &ObjectPath, interface: &str) -> Result<(), TransportError>;
}

/// An outbound method call
#[derive(Debug, Clone)]
pub struct MethodCall {
    /// Destination bus name
    pub destination: String,
    /// Target object
    pub path: ObjectPath,
    /// Target interface
    pub interface: String,
    /// Method name
    pub member: String,
    /// Encoded arguments, a structure of the call's arguments
    pub body: Payload,
}

/// A signal match rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMatch {
    /// Emitting object, `None` for any
    pub path: Option<ObjectPath>,
    /// Signal interface
    pub interface: String,
    /// Signal name
    pub member: String,
}

impl SignalMatch {
    /// Match one signal on one object
    pub fn new(path: ObjectPath, interface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            path: Some(path),
            interface: interface.into(),
            member: member.into(),
        }
    }

    /// True if the signal is covered by this rule
    pub fn matches(&self, signal: &Signal) -> bool {
        self.path.as_ref().map_or(true, |p| *p == signal.path)
            && self.interface == signal.interface
            && self.member == signal.member
    }
}

/// A signal received from the bus
#[derive(Debug, Clone)]
pub struct Signal {
    /// Emitting object
    pub path: ObjectPath,
    /// Signal interface
    pub interface: String,
    /// Signal name
    pub member: String,
    /// Encoded arguments
    pub body: Payload,
}

/// A method call issued by the remote side against a local object
#[derive(Debug)]
pub struct InboundCall {
    /// Local object path
    pub path: ObjectPath,
    /// Interface
    pub interface: String,
    /// Method name
    pub member: String,
    /// Encoded arguments
    pub body: Payload,
    /// Reply sink; exactly one reply is sent
    pub reply: oneshot::Sender<Result<Payload, MethodError>>,
}

/// Event pushed by the transport to the dispatch loop
#[derive(Debug)]
pub enum BusEvent {
    /// A signal
    Signal(Signal),
    /// An inbound method call
    MethodCall(InboundCall),
}

/// Handler for inbound method calls on one exported object.
///
/// Runs on a blocking worker; it may wait on user input.
pub trait InboundHandler: Send + Sync {
    /// Handle `member` and produce the reply body
    fn handle(&self, member: &str, body: &Payload) -> Result<Payload, MethodError>;
}
