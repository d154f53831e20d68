//! Client configuration and the connect builder

use crate::{Connman, ConnmanError, Result};
use connoxide_bus::{ConnectionConfig, Transport};
use connoxide_proto::{names, ObjectPath};
use std::sync::Arc;
use tracing::debug;

/// Environment variable overriding the agent object path
pub const AGENT_PATH_ENV: &str = "CONNOXIDE_AGENT_PATH";

/// Environment variable enabling or disabling agent registration
pub const REGISTER_AGENT_ENV: &str = "CONNOXIDE_REGISTER_AGENT";

/// Default object path of the exported agent
pub const DEFAULT_AGENT_PATH: &str = "/net/connoxide/agent";

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnmanConfig {
    /// Bus name of the daemon
    pub destination: String,
    /// Object path of the manager, also used for the handshake
    pub manager_path: ObjectPath,
    /// Object path the agent is exported at
    pub agent_path: ObjectPath,
    /// Register the agent with the daemon on startup
    pub register_agent: bool,
    /// Name of the dispatch loop thread
    pub thread_name: String,
}

impl Default for ConnmanConfig {
    fn default() -> Self {
        Self {
            destination: names::SERVICE.to_string(),
            manager_path: ObjectPath::root(),
            agent_path: default_agent_path(),
            register_agent: true,
            thread_name: ConnectionConfig::default().thread_name,
        }
    }
}

impl ConnmanConfig {
    /// Defaults with overrides from `CONNOXIDE_AGENT_PATH` and `CONNOXIDE_REGISTER_AGENT`
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(AGENT_PATH_ENV) {
            self.agent_path = ObjectPath::new(path.trim())
                .map_err(|e| ConnmanError::Config(format!("{}: {}", AGENT_PATH_ENV, e)))?;
        }
        if let Some(flag) = lookup(REGISTER_AGENT_ENV) {
            self.register_agent = parse_flag(&flag)
                .ok_or_else(|| ConnmanError::Config(format!("{}: not a boolean: {:?}", REGISTER_AGENT_ENV, flag)))?;
        }
        debug!("Configuration: {:?}", self);
        Ok(self)
    }

    /// Bus-level settings derived from this configuration
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::default()
            .with_destination(self.destination.clone())
            .with_path(self.manager_path.clone())
            .with_thread_name(self.thread_name.clone())
    }
}

fn default_agent_path() -> ObjectPath {
    ObjectPath::new(DEFAULT_AGENT_PATH).unwrap_or_else(|_| ObjectPath::root())
}

fn parse_flag(flag: &str) -> Option<bool> {
    match flag.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for configuring a [`Connman`] client
#[derive(Debug, Clone, Default)]
pub struct ConnmanBuilder {
    config: ConnmanConfig,
}

impl ConnmanBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ConnmanConfig) -> Self {
        Self { config }
    }

    /// Set the daemon's bus name
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.config.destination = destination.into();
        self
    }

    /// Set the manager object path
    pub fn with_manager_path(mut self, path: ObjectPath) -> Self {
        self.config.manager_path = path;
        self
    }

    /// Set the agent object path
    pub fn with_agent_path(mut self, path: ObjectPath) -> Self {
        self.config.agent_path = path;
        self
    }

    /// Enable/disable agent registration on startup
    pub fn with_register_agent(mut self, register: bool) -> Self {
        self.config.register_agent = register;
        self
    }

    /// Set the dispatch loop thread name
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Build the configuration
    pub fn build_config(self) -> ConnmanConfig {
        self.config
    }

    /// Connect over `transport` and run the startup sequence
    pub fn connect(self, transport: Arc<dyn Transport>) -> Result<Connman> {
        Connman::with_config(transport, self.build_config())
    }
}
