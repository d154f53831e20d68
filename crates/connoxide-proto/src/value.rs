//! Variant values carried on the bus

use crate::{ObjectPath, ProtocolError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A self-describing bus value.
///
/// Covers the subset of the D-Bus type system used by connman: basic types,
/// object paths, byte arrays, homogeneous arrays, string-keyed dictionaries
/// (`a{sv}`) and structures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// `b`
    Bool(bool),
    /// `y`
    Byte(u8),
    /// `q`
    UInt16(u16),
    /// `i`
    Int32(i32),
    /// `u`
    UInt32(u32),
    /// `t`
    UInt64(u64),
    /// `s`
    Str(String),
    /// `o`
    ObjectPath(ObjectPath),
    /// `ay`
    Bytes(Bytes),
    /// `a*`
    Array(Vec<Value>),
    /// `a{sv}`
    Dict(PropertyMap),
    /// `(...)`
    Struct(Vec<Value>),
}

impl Value {
    /// The empty structure, used as the body of calls without arguments
    pub fn unit() -> Self {
        Self::Struct(Vec::new())
    }

    /// Build a string value
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Build an `as` array from strings
    pub fn string_array<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(items.into_iter().map(|s| Self::Str(s.into())).collect())
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Byte(_) => "byte",
            Self::UInt16(_) => "uint16",
            Self::Int32(_) => "int32",
            Self::UInt32(_) => "uint32",
            Self::UInt64(_) => "uint64",
            Self::Str(_) => "string",
            Self::ObjectPath(_) => "object path",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Struct(_) => "struct",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// Decode a boolean
    pub fn as_bool(&self) -> Result<bool, ProtocolError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    /// Decode a byte
    pub fn as_byte(&self) -> Result<u8, ProtocolError> {
        match self {
            Self::Byte(b) => Ok(*b),
            other => Err(other.mismatch("byte")),
        }
    }

    /// Decode a 16-bit unsigned integer
    pub fn as_u16(&self) -> Result<u16, ProtocolError> {
        match self {
            Self::UInt16(v) => Ok(*v),
            other => Err(other.mismatch("uint16")),
        }
    }

    /// Decode a 32-bit signed integer
    pub fn as_i32(&self) -> Result<i32, ProtocolError> {
        match self {
            Self::Int32(v) => Ok(*v),
            other => Err(other.mismatch("int32")),
        }
    }

    /// Decode a 64-bit unsigned integer
    pub fn as_u64(&self) -> Result<u64, ProtocolError> {
        match self {
            Self::UInt64(v) => Ok(*v),
            other => Err(other.mismatch("uint64")),
        }
    }

    /// Borrow a string
    pub fn as_str(&self) -> Result<&str, ProtocolError> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    /// Borrow an object path
    pub fn as_object_path(&self) -> Result<&ObjectPath, ProtocolError> {
        match self {
            Self::ObjectPath(p) => Ok(p),
            other => Err(other.mismatch("object path")),
        }
    }

    /// Borrow array elements
    pub fn as_array(&self) -> Result<&[Value], ProtocolError> {
        match self {
            Self::Array(items) => Ok(items),
            other => Err(other.mismatch("array")),
        }
    }

    /// Borrow a dictionary
    pub fn as_dict(&self) -> Result<&PropertyMap, ProtocolError> {
        match self {
            Self::Dict(map) => Ok(map),
            other => Err(other.mismatch("dict")),
        }
    }

    /// Borrow structure fields
    pub fn as_struct(&self) -> Result<&[Value], ProtocolError> {
        match self {
            Self::Struct(fields) => Ok(fields),
            other => Err(other.mismatch("struct")),
        }
    }

    /// Decode an `as` array into owned strings
    pub fn to_string_vec(&self) -> Result<Vec<String>, ProtocolError> {
        self.as_array()?
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect()
    }

    /// Number of children for container values, zero for basic types
    pub fn child_count(&self) -> usize {
        match self {
            Self::Array(items) | Self::Struct(items) => items.len(),
            Self::Dict(map) => map.len(),
            Self::Bytes(bytes) => bytes.len(),
            _ => 0,
        }
    }

    /// Field `index` of a structure
    pub fn field(&self, index: usize, name: &'static str) -> Result<&Value, ProtocolError> {
        self.as_struct()?
            .get(index)
            .ok_or(ProtocolError::MissingField(name))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<ObjectPath> for Value {
    fn from(v: ObjectPath) -> Self {
        Self::ObjectPath(v)
    }
}

impl From<PropertyMap> for Value {
    fn from(v: PropertyMap) -> Self {
        Self::Dict(v)
    }
}

/// An ordered `a{sv}` dictionary.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyMap(Vec<(String, Value)>);

impl PropertyMap {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    /// Merge every entry of `other` into this dictionary
    pub fn merge(&mut self, other: &PropertyMap) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}
