use super::{Entity, EntityKind, PropertySet};
use crate::{ProtocolError, Value};
use serde::Serialize;

string_enum! {
    /// Global connectivity state
    ManagerState, "manager state" {
        #[default]
        Offline => "offline",
        Idle => "idle",
        Ready => "ready",
        Online => "online",
    }
}

/// Properties of the `net.connman.Manager` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerProperties {
    /// Flight mode
    pub offline_mode: bool,
    /// Global state
    pub state: ManagerState,
}

impl PropertySet for ManagerProperties {
    const SECTION: &'static str = "Manager";

    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError> {
        match key {
            "OfflineMode" => self.offline_mode = value.as_bool()?,
            "State" => self.state = ManagerState::decode(value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl Entity for ManagerProperties {
    const KIND: EntityKind = EntityKind::Manager;
}
