use super::{optional_section, optional_strings, Entity, EntityKind, PropertySet};
use crate::{ProtocolError, Value};
use serde::Serialize;

string_enum! {
    /// Kind of network a service or technology belongs to
    ServiceType, "service type" {
        #[default]
        Ethernet => "ethernet",
        Wifi => "wifi",
        Cellular => "cellular",
        Bluetooth => "bluetooth",
        Vpn => "vpn",
        Wired => "wired",
        P2p => "p2p",
        Gps => "gps",
        Gadget => "gadget",
    }
}

string_enum! {
    /// Connection state of a service
    ServiceState, "service state" {
        #[default]
        Idle => "idle",
        Failure => "failure",
        Association => "association",
        Configuration => "configuration",
        Ready => "ready",
        Disconnect => "disconnect",
        Online => "online",
    }
}

string_enum! {
    /// Last error reported for a service
    ServiceError, "service error" {
        #[default]
        None => "",
        OutOfRange => "out-of-range",
        PinMissing => "pin-missing",
        DhcpFailed => "dhcp-failed",
        ConnectFailed => "connect-failed",
        LoginFailed => "login-failed",
        AuthFailed => "auth-failed",
        InvalidKey => "invalid-key",
        Blocked => "blocked",
        OnlineCheckFailed => "online-check-failed",
    }
}

string_enum! {
    /// Security mechanism offered by a service
    Security, "security" {
        #[default]
        None => "none",
        Wep => "wep",
        Psk => "psk",
        Ieee8021x => "ieee8021x",
        Wps => "wps",
        WpsAdvertising => "wps_advertising",
    }
}

string_enum! {
    /// IPv4 configuration method
    IPv4Method, "IPv4 method" {
        #[default]
        Off => "off",
        Dhcp => "dhcp",
        Manual => "manual",
        Auto => "auto",
    }
}

string_enum! {
    /// IPv6 configuration method
    IPv6Method, "IPv6 method" {
        #[default]
        Off => "off",
        SixToFour => "6to4",
        Manual => "manual",
        Fixed => "fixed",
        Auto => "auto",
    }
}

string_enum! {
    /// IPv6 privacy extension mode
    IPv6Privacy, "IPv6 privacy" {
        #[default]
        Disabled => "disabled",
        Enabled => "enabled",
        Preferred => "preferred",
    }
}

string_enum! {
    /// Ethernet configuration method
    EthernetMethod, "ethernet method" {
        #[default]
        Manual => "manual",
        Auto => "auto",
    }
}

string_enum! {
    /// Proxy configuration method
    ProxyMethod, "proxy method" {
        #[default]
        Direct => "direct",
        Manual => "manual",
        Auto => "auto",
    }
}

/// `IPv4` section of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IPv4 {
    /// Configuration method
    pub method: IPv4Method,
    /// Address
    pub address: String,
    /// Netmask
    pub netmask: String,
    /// Gateway
    pub gateway: String,
}

impl PropertySet for IPv4 {
    const SECTION: &'static str = "IPv4";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Method" => self.method = IPv4Method::decode(value)?,
            "Address" => self.address = value.as_str()?.to_string(),
            "Netmask" => self.netmask = value.as_str()?.to_string(),
            "Gateway" => self.gateway = value.as_str()?.to_string(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// `IPv6` section of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IPv6 {
    /// Configuration method
    pub method: IPv6Method,
    /// Address
    pub address: String,
    /// Gateway
    pub gateway: String,
    /// Privacy extensions
    pub privacy: IPv6Privacy,
    /// Prefix length in bits
    pub prefix_length: u8,
}

impl PropertySet for IPv6 {
    const SECTION: &'static str = "IPv6";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Method" => self.method = IPv6Method::decode(value)?,
            "Address" => self.address = value.as_str()?.to_string(),
            "Gateway" => self.gateway = value.as_str()?.to_string(),
            "Privacy" => self.privacy = IPv6Privacy::decode(value)?,
            "PrefixLength" => self.prefix_length = value.as_byte()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// `Ethernet` section of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ethernet {
    /// Configuration method
    pub method: EthernetMethod,
    /// Kernel interface name
    pub interface: String,
    /// Hardware address
    pub address: String,
    /// MTU
    pub mtu: u16,
}

impl PropertySet for Ethernet {
    const SECTION: &'static str = "Ethernet";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Method" => self.method = EthernetMethod::decode(value)?,
            "Interface" => self.interface = value.as_str()?.to_string(),
            "Address" => self.address = value.as_str()?.to_string(),
            "MTU" => self.mtu = value.as_u16()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// `Provider` section of a VPN service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Provider {
    /// VPN host
    pub host: String,
    /// VPN domain
    pub domain: String,
    /// Provider name
    pub name: String,
    /// Provider type
    pub provider_type: String,
}

impl PropertySet for Provider {
    const SECTION: &'static str = "Provider";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Host" => self.host = value.as_str()?.to_string(),
            "Domain" => self.domain = value.as_str()?.to_string(),
            "Name" => self.name = value.as_str()?.to_string(),
            "Type" => self.provider_type = value.as_str()?.to_string(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// `Proxy` section of a service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProxySettings {
    /// Configuration method
    pub method: ProxyMethod,
    /// Auto-configuration URL
    pub url: String,
    /// Manual proxy servers
    pub servers: Vec<String>,
    /// Hosts bypassing the proxy
    pub excludes: Vec<String>,
}

impl PropertySet for ProxySettings {
    const SECTION: &'static str = "Proxy";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Method" => self.method = ProxyMethod::decode(value)?,
            "Url" => self.url = value.as_str()?.to_string(),
            "Servers" => self.servers = value.to_string_vec()?,
            "Excludes" => self.excludes = value.to_string_vec()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Properties of a `net.connman.Service` object.
///
/// Container-valued properties are `None` when the daemon reports them
/// empty, which is also how the daemon clears them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceProperties {
    /// Human-readable name, usually the SSID
    pub name: String,
    /// Network type
    pub service_type: ServiceType,
    /// Connection state
    pub state: ServiceState,
    /// Last error
    pub error: ServiceError,
    /// The service was connected before and has saved settings
    pub favorite: bool,
    /// Settings come from a provisioning file and cannot be changed
    pub immutable: bool,
    /// Connect automatically
    pub autoconnect: bool,
    /// Cellular roaming
    pub roaming: bool,
    /// Multicast DNS enabled
    pub mdns: bool,
    /// Signal strength, 0 to 100
    pub strength: u8,
    /// Offered security mechanisms
    pub security: Option<Vec<Security>>,
    /// Active nameservers
    pub nameservers: Option<Vec<String>>,
    /// Search domains
    pub domains: Option<Vec<String>>,
    /// Time servers
    pub timeservers: Option<Vec<String>>,
    /// IPv4 settings
    pub ipv4: Option<IPv4>,
    /// IPv6 settings
    pub ipv6: Option<IPv6>,
    /// Ethernet settings
    pub ethernet: Option<Ethernet>,
    /// VPN provider settings
    pub provider: Option<Provider>,
    /// Proxy settings
    pub proxy: Option<ProxySettings>,
}

impl ServiceProperties {
    /// True when the service is ready or online
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ServiceState::Ready | ServiceState::Online)
    }
}

impl PropertySet for ServiceProperties {
    const SECTION: &'static str = "Service";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Name" => self.name = value.as_str()?.to_string(),
            "Type" => self.service_type = ServiceType::decode(value)?,
            "State" => self.state = ServiceState::decode(value)?,
            "Error" => self.error = ServiceError::decode(value)?,
            "Favorite" => self.favorite = value.as_bool()?,
            "Immutable" => self.immutable = value.as_bool()?,
            "AutoConnect" => self.autoconnect = value.as_bool()?,
            "Roaming" => self.roaming = value.as_bool()?,
            "mDNS" => self.mdns = value.as_bool()?,
            "Strength" => self.strength = value.as_byte()?,
            "Security" => {
                self.security = match optional_strings(value)? {
                    Some(items) => Some(
                        items
                            .iter()
                            .map(|s| s.parse())
                            .collect::<Result<Vec<Security>, _>>()?,
                    ),
                    None => None,
                }
            }
            "Nameservers" => self.nameservers = optional_strings(value)?,
            "Domains" => self.domains = optional_strings(value)?,
            "Timeservers" => self.timeservers = optional_strings(value)?,
            "IPv4" => self.ipv4 = optional_section(value)?,
            "IPv6" => self.ipv6 = optional_section(value)?,
            "Ethernet" => self.ethernet = optional_section(value)?,
            "Provider" => self.provider = optional_section(value)?,
            "Proxy" => self.proxy = optional_section(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Entity for ServiceProperties {
    const KIND: EntityKind = EntityKind::Service;
}
