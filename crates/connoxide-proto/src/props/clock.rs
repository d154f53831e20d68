use super::{optional_strings, Entity, EntityKind, PropertySet};
use crate::{ProtocolError, Value};
use serde::Serialize;

string_enum! {
    /// Whether time or timezone follow the network or are set by hand
    UpdatePolicy, "update policy" {
        #[default]
        Auto => "auto",
        Manual => "manual",
    }
}

/// Properties of the `net.connman.Clock` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClockProperties {
    /// Seconds since the epoch
    pub time: u64,
    /// Time update policy
    pub time_updates: UpdatePolicy,
    /// Timezone name such as `Europe/Rome`
    pub timezone: String,
    /// Timezone update policy
    pub timezone_updates: UpdatePolicy,
    /// Configured time servers
    pub timeservers: Vec<String>,
    /// The clock is synchronized with a time server
    pub timeserver_synced: bool,
}

impl PropertySet for ClockProperties {
    const SECTION: &'static str = "Clock";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "Time" => self.time = value.as_u64()?,
            "TimeUpdates" => self.time_updates = UpdatePolicy::decode(value)?,
            "Timezone" => self.timezone = value.as_str()?.to_string(),
            "TimezoneUpdates" => self.timezone_updates = UpdatePolicy::decode(value)?,
            "Timeservers" => self.timeservers = optional_strings(value)?.unwrap_or_default(),
            "TimeserverSynced" => self.timeserver_synced = value.as_bool()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Entity for ClockProperties {
    const KIND: EntityKind = EntityKind::Clock;
}
