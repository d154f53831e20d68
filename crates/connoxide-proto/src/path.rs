//! Validated bus object paths

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A bus object path such as `/net/connman/service/wifi_0123_managed_psk`.
///
/// Paths are the identity of remote objects: two proxies are the same remote
/// object exactly when their paths are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Validate and wrap a path
    pub fn new(path: impl Into<String>) -> Result<Self, ProtocolError> {
        let path = path.into();
        validate(&path)?;
        Ok(Self(path))
    }

    /// The root path `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Borrow the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append one element to the path
    pub fn join(&self, element: &str) -> Result<Self, ProtocolError> {
        if self.0 == "/" {
            Self::new(format!("/{}", element))
        } else {
            Self::new(format!("{}/{}", self.0, element))
        }
    }
}

fn validate(path: &str) -> Result<(), ProtocolError> {
    let invalid = || ProtocolError::InvalidObjectPath(path.to_string());

    if path == "/" {
        return Ok(());
    }
    let rest = path.strip_prefix('/').ok_or_else(invalid)?;
    // Elements are non-empty runs of [A-Za-z0-9_], so no trailing or doubled '/'
    for element in rest.split('/') {
        if element.is_empty() || !element.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid());
        }
    }
    Ok(())
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ObjectPath {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ObjectPath {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

impl PartialEq<str> for ObjectPath {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ObjectPath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
