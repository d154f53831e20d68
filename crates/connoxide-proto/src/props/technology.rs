use super::{Entity, EntityKind, PropertySet, ServiceType};
use crate::{ProtocolError, Value};
use serde::Serialize;

/// Technologies share the service type names
pub type TechnologyType = ServiceType;

/// Properties of a `net.connman.Technology` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TechnologyProperties {
    /// Human-readable name
    pub name: String,
    /// Technology type
    pub technology_type: TechnologyType,
    /// Radio or device powered
    pub powered: bool,
    /// At least one service of this technology is connected
    pub connected: bool,
    /// Tethering enabled
    pub tethering: bool,
    /// Tethering SSID
    pub tethering_identifier: String,
    /// Tethering passphrase
    pub tethering_passphrase: String,
    /// Tethering frequency in MHz
    pub tethering_freq: i32,
}

impl PropertySet for TechnologyProperties {
    const SECTION: &'static str = "Technology";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Name" => self.name = value.as_str()?.to_string(),
            "Type" => self.technology_type = TechnologyType::decode(value)?,
            "Powered" => self.powered = value.as_bool()?,
            "Connected" => self.connected = value.as_bool()?,
            "Tethering" => self.tethering = value.as_bool()?,
            "TetheringIdentifier" => self.tethering_identifier = value.as_str()?.to_string(),
            "TetheringPassphrase" => self.tethering_passphrase = value.as_str()?.to_string(),
            "TetheringFreq" => self.tethering_freq = value.as_i32()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Entity for TechnologyProperties {
    const KIND: EntityKind = EntityKind::Technology;
}
