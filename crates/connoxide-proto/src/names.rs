//! Well-known connman bus, interface, method and property names

/// Bus name of the connman daemon
pub const SERVICE: &str = "net.connman";

/// Object path of the manager
pub const MANAGER_PATH: &str = "/";

/// Object path of the clock
pub const CLOCK_PATH: &str = "/";

/// Interface names
pub mod interface {
    /// Manager interface
    pub const MANAGER: &str = "net.connman.Manager";
    /// Service interface
    pub const SERVICE: &str = "net.connman.Service";
    /// Technology interface
    pub const TECHNOLOGY: &str = "net.connman.Technology";
    /// Clock interface
    pub const CLOCK: &str = "net.connman.Clock";
    /// Agent interface, implemented by the client
    pub const AGENT: &str = "net.connman.Agent";
    /// Introspection interface used for the handshake
    pub const INTROSPECTABLE: &str = "org.freedesktop.DBus.Introspectable";
}

/// Method names
pub mod method {
    /// Read every property of an object
    pub const GET_PROPERTIES: &str = "GetProperties";
    /// Write one property
    pub const SET_PROPERTY: &str = "SetProperty";
    /// List services with their properties
    pub const GET_SERVICES: &str = "GetServices";
    /// List technologies with their properties
    pub const GET_TECHNOLOGIES: &str = "GetTechnologies";
    /// Register an agent object
    pub const REGISTER_AGENT: &str = "RegisterAgent";
    /// Unregister an agent object
    pub const UNREGISTER_AGENT: &str = "UnregisterAgent";
    /// Connect a service
    pub const CONNECT: &str = "Connect";
    /// Disconnect a service
    pub const DISCONNECT: &str = "Disconnect";
    /// Remove a service
    pub const REMOVE: &str = "Remove";
    /// Scan a technology
    pub const SCAN: &str = "Scan";
    /// Introspect an object
    pub const INTROSPECT: &str = "Introspect";
}

/// Signal names
pub mod signal {
    /// `(s, v)`: one property changed
    pub const PROPERTY_CHANGED: &str = "PropertyChanged";
    /// `(a(oa{sv}), ao)`: ordered services with deltas, plus removed paths
    pub const SERVICES_CHANGED: &str = "ServicesChanged";
    /// `(o, a{sv})`: a technology appeared
    pub const TECHNOLOGY_ADDED: &str = "TechnologyAdded";
    /// `(o)`: a technology disappeared
    pub const TECHNOLOGY_REMOVED: &str = "TechnologyRemoved";
}

/// Agent methods invoked by the daemon
pub mod agent {
    /// The daemon released the agent
    pub const RELEASE: &str = "Release";
    /// The daemon asks for credentials
    pub const REQUEST_INPUT: &str = "RequestInput";
    /// The daemon reports a connection error
    pub const REPORT_ERROR: &str = "ReportError";
    /// The daemon cancelled a pending request
    pub const CANCEL: &str = "Cancel";
}
