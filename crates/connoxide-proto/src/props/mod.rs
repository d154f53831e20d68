//! Per-entity property sets and their decoders
//!
//! Every remote entity kind has a snapshot type implementing [`PropertySet`].
//! A snapshot is updated one `(key, value)` pair at a time by
//! [`PropertySet::update`]; [`PropertySet::apply`] runs that over a whole
//! dictionary and logs the pairs it could not use.

use crate::names::interface;
use crate::{PropertyMap, ProtocolError, Value};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Declare a closed enumeration with its on-bus string form.
///
/// Generates `as_str`, `FromStr`, `Display`, `decode` from a [`Value`] and a
/// conversion into [`Value::Str`].
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// String form used on the bus
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Decode from a string value
            pub fn decode(value: &$crate::Value) -> Result<Self, $crate::ProtocolError> {
                value.as_str()?.parse()
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::ProtocolError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for $crate::Value {
            fn from(v: $name) -> Self {
                $crate::Value::Str(v.as_str().to_string())
            }
        }
    };
}

/// Clock properties
pub mod clock;
/// Manager properties
pub mod manager;
/// Service properties and nested sections
pub mod service;
/// Technology properties
pub mod technology;

pub use clock::{ClockProperties, UpdatePolicy};
pub use manager::{ManagerProperties, ManagerState};
pub use service::{
    Ethernet, EthernetMethod, IPv4, IPv4Method, IPv6, IPv6Method, IPv6Privacy, Provider,
    ProxyMethod, ProxySettings, Security, ServiceError, ServiceProperties, ServiceState,
    ServiceType,
};
pub use technology::{TechnologyProperties, TechnologyType};

/// A decoded property snapshot.
pub trait PropertySet: Clone + Default + fmt::Debug + Serialize + Send + Sync + 'static {
    /// Name used in log lines
    const SECTION: &'static str;

    /// Apply one property.
    ///
    /// Returns `Ok(false)` for a key this set does not know. On error the
    /// snapshot is left unchanged for that key.
    fn update(&mut self, key: &str, value: &Value) -> Result<bool, ProtocolError>;

    /// Merge a dictionary into the snapshot in place
    fn apply(&mut self, props: &PropertyMap) {
        for (key, value) in props.iter() {
            match self.update(key, value) {
                Ok(true) => {}
                Ok(false) => debug!("Unknown property for {}: {}", Self::SECTION, key),
                Err(e) => warn!("Skipping property {}.{}: {}", Self::SECTION, key, e),
            }
        }
    }

    /// Build a fresh snapshot from a dictionary
    fn from_map(props: &PropertyMap) -> Self {
        let mut set = Self::default();
        set.apply(props);
        set
    }
}

/// The closed set of remote entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A connectable service
    Service,
    /// A networking technology
    Technology,
    /// The system clock
    Clock,
    /// The connman manager
    Manager,
}

impl EntityKind {
    /// Interface implemented by objects of this kind
    pub fn interface(&self) -> &'static str {
        match self {
            Self::Service => interface::SERVICE,
            Self::Technology => interface::TECHNOLOGY,
            Self::Clock => interface::CLOCK,
            Self::Manager => interface::MANAGER,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Service => "service",
            Self::Technology => "technology",
            Self::Clock => "clock",
            Self::Manager => "manager",
        };
        f.write_str(name)
    }
}

/// A property set that is the full state of one remote entity kind
pub trait Entity: PropertySet {
    /// Kind of entity this snapshot describes
    const KIND: EntityKind;
}

/// Decode an `as` value, mapping an empty array to `None`
pub(crate) fn optional_strings(value: &Value) -> Result<Option<Vec<String>>, ProtocolError> {
    if value.child_count() == 0 {
        value.as_array()?;
        return Ok(None);
    }
    value.to_string_vec().map(Some)
}

/// Decode a nested `a{sv}` section, mapping an empty dictionary to `None`
pub(crate) fn optional_section<S: PropertySet>(value: &Value) -> Result<Option<S>, ProtocolError> {
    let dict = value.as_dict()?;
    if dict.is_empty() {
        return Ok(None);
    }
    Ok(Some(S::from_map(dict)))
}
