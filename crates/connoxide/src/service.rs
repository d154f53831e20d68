//! Service proxies

use crate::proxy::{Completion, Proxy};
use connoxide_proto::names::method;
use connoxide_proto::props::{IPv4, IPv6, ServiceProperties};
use connoxide_proto::{PropertyMap, Value};

/// Proxy for one `net.connman.Service` object
pub type Service = Proxy<ServiceProperties>;

impl Proxy<ServiceProperties> {
    /// Connect the service
    pub fn connect(&self, completion: Option<Completion>) {
        self.dispatch(method::CONNECT, vec![], completion);
    }

    /// Disconnect the service
    pub fn disconnect(&self, completion: Option<Completion>) {
        self.dispatch(method::DISCONNECT, vec![], completion);
    }

    /// Forget the service and its stored credentials
    pub fn remove(&self, completion: Option<Completion>) {
        self.dispatch(method::REMOVE, vec![], completion);
    }

    /// Set `AutoConnect`
    pub fn set_autoconnect(&self, autoconnect: bool, completion: Option<Completion>) {
        self.set_property("AutoConnect", Value::Bool(autoconnect), completion);
    }

    /// Set `Nameservers.Configuration`
    pub fn set_nameservers<S: AsRef<str>>(&self, servers: &[S], completion: Option<Completion>) {
        self.set_property("Nameservers.Configuration", strings(servers), completion);
    }

    /// Set `Timeservers.Configuration`
    pub fn set_timeservers<S: AsRef<str>>(&self, servers: &[S], completion: Option<Completion>) {
        self.set_property("Timeservers.Configuration", strings(servers), completion);
    }

    /// Set `Domains.Configuration`
    pub fn set_domains<S: AsRef<str>>(&self, domains: &[S], completion: Option<Completion>) {
        self.set_property("Domains.Configuration", strings(domains), completion);
    }

    /// Set `mDNS.Configuration`
    pub fn set_mdns(&self, enabled: bool, completion: Option<Completion>) {
        self.set_property("mDNS.Configuration", Value::Bool(enabled), completion);
    }

    /// Set `IPv4.Configuration`
    pub fn set_ipv4(&self, config: &IPv4, completion: Option<Completion>) {
        self.set_property("IPv4.Configuration", Value::Dict(ipv4_configuration(config)), completion);
    }

    /// Set `IPv6.Configuration`
    pub fn set_ipv6(&self, config: &IPv6, completion: Option<Completion>) {
        self.set_property("IPv6.Configuration", Value::Dict(ipv6_configuration(config)), completion);
    }
}

fn strings<S: AsRef<str>>(items: &[S]) -> Value {
    Value::string_array(items.iter().map(|s| s.as_ref().to_string()))
}

/// Empty fields are left out so the daemon keeps its own values
fn ipv4_configuration(config: &IPv4) -> PropertyMap {
    let mut map = PropertyMap::new().with("Method", config.method);
    for (key, value) in [
        ("Address", &config.address),
        ("Netmask", &config.netmask),
        ("Gateway", &config.gateway),
    ] {
        if !value.is_empty() {
            map.insert(key, value.as_str());
        }
    }
    map
}

fn ipv6_configuration(config: &IPv6) -> PropertyMap {
    let mut map = PropertyMap::new().with("Method", config.method);
    if !config.address.is_empty() {
        map.insert("Address", config.address.as_str());
    }
    if config.prefix_length > 0 {
        map.insert("PrefixLength", config.prefix_length);
    }
    if !config.gateway.is_empty() {
        map.insert("Gateway", config.gateway.as_str());
    }
    map.insert("Privacy", config.privacy);
    map
}
