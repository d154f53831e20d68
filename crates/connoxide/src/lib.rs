//! # Connoxide
//!
//! Client proxies for the connman network daemon.
//!
//! A [`Connman`] owns one bus connection and its dispatch thread. The
//! [`Manager`] mirrors the daemon's ordered service and technology lists,
//! every [`Proxy`] caches its object's properties, and the [`Agent`] answers
//! the daemon's credential requests. All completions and change callbacks run
//! on the connection's loop thread.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub use connoxide_bus as bus;
pub use connoxide_proto as proto;

/// Error types for the Connoxide client
pub mod error;

/// Client configuration and the connect builder
pub mod config;

/// Generic proxy for one remote object
pub mod proxy;

/// Service mutators
pub mod service;

/// Technology mutators
pub mod technology;

/// Clock mutators
pub mod clock;

/// Ordered collection reconciliation
pub mod reconcile;

/// The connman manager and its collections
pub mod manager;

/// Inbound agent requests
pub mod agent;

pub use agent::{
    classify, parse_fields, Agent, Credential, EnterpriseCredentials, FieldDescriptor, InputRequest, NetworkName,
    WisprCredentials,
};
pub use clock::Clock;
pub use config::{ConnmanBuilder, ConnmanConfig};
pub use error::ConnmanError;
pub use manager::Manager;
pub use proxy::{Completion, Proxy, SnapshotCallback};
pub use reconcile::{Collection, Member, Reconciled};
pub use service::Service;
pub use technology::Technology;

use connoxide_bus::{Connection, ConnectionHandle, Transport};
use connoxide_proto::names;
use connoxide_proto::ObjectPath;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Result type alias for Connoxide operations
pub type Result<T> = std::result::Result<T, ConnmanError>;

/// A running client session with the daemon.
///
/// Dropping it, like [`Connman::shutdown`], waits for every pending call to
/// complete before the loop thread is joined.
pub struct Connman {
    config: ConnmanConfig,
    manager: Manager,
    clock: Clock,
    // Dropped last so the proxies release their subscriptions first
    connection: Connection,
}

impl Connman {
    /// Connect with the default configuration
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_config(transport, ConnmanConfig::default())
    }

    /// Start building a configured session
    pub fn builder() -> ConnmanBuilder {
        ConnmanBuilder::new()
    }

    /// Handshake, start the loop, bind the manager and clock and fetch their state
    pub fn with_config(transport: Arc<dyn Transport>, config: ConnmanConfig) -> Result<Self> {
        let connection = Connection::open(transport, config.connection_config())?;
        let handle = connection.handle();

        let manager = Manager::new(&handle, &config)?;
        let clock_path = ObjectPath::new(names::CLOCK_PATH)?;
        let clock = Clock::bind(&handle, clock_path)?;
        clock.refresh(None);

        info!("Connman session {} ready", connection.id());
        Ok(Self {
            config,
            manager,
            clock,
            connection,
        })
    }

    /// The manager proxy and its collections
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// The clock proxy
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Handle for binding further proxies or issuing raw calls
    pub fn handle(&self) -> ConnectionHandle {
        self.connection.handle()
    }

    /// Configuration this session was started with
    pub fn config(&self) -> &ConnmanConfig {
        &self.config
    }

    /// True while the loop accepts work
    pub fn is_running(&self) -> bool {
        self.connection.is_running()
    }

    /// Drain pending calls and stop the loop
    pub fn shutdown(self) {
        info!("Shutting down connman session {}", self.connection.id());
        self.connection.stop();
    }
}

impl fmt::Debug for Connman {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connman")
            .field("connection", &self.connection)
            .field("manager", &self.manager)
            .finish()
    }
}
