//! Variant value model.
//!
//! # Responsibility
//! - Define the self-describing value stored in attributes, datasource state
//!   and evidence attributes.
//! - Provide cheap accessors so callers do not match on every read.
//!
//! # Invariants
//! - `Data` is a plain value: cloning is a deep copy, equality is structural.
//! - `same_as` is true exactly when two values encode to the same bytes;
//!   unlike `==` it treats a NaN as equal to itself.
//! - Maps are ordered by key, so two equal maps always encode identically.
//!
//! # See also
//! - `crate::codec` for the binary representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// String-keyed map of variant values.
pub type DataMap = BTreeMap<String, Data>;

/// Tagged union used for every persisted value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Data {
    /// Absent value. Also returned for missing attributes.
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    /// Unix epoch milliseconds.
    DateTime(i64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Data>),
    Map(DataMap),
}

impl Data {
    /// Returns a short stable name for the variant, used in logs and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::DateTime(_) => "datetime",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Self::DateTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Self::List(value) => Some(value.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&DataMap> {
        match self {
            Self::Map(value) => Some(value),
            _ => None,
        }
    }

    /// Returns whether both values would be stored identically.
    ///
    /// Floats compare by bit pattern, so `NaN` matches the same `NaN` and
    /// `0.0` differs from `-0.0`.
    pub fn same_as(&self, other: &Data) -> bool {
        match (self, other) {
            (Self::Float(left), Self::Float(right)) => left.to_bits() == right.to_bits(),
            (Self::List(left), Self::List(right)) => {
                left.len() == right.len()
                    && left.iter().zip(right).all(|(left, right)| left.same_as(right))
            }
            (Self::Map(left), Self::Map(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .zip(right)
                        .all(|((lkey, left), (rkey, right))| lkey == rkey && left.same_as(right))
            }
            _ => self == other,
        }
    }

    /// Looks up `key` when this value is a map.
    ///
    /// Returns `None` for non-map values and for missing keys.
    pub fn get(&self, key: &str) -> Option<&Data> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<bool> for Data {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Data {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for Data {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for Data {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Data {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<u8>> for Data {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Data {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<Vec<Data>> for Data {
    fn from(value: Vec<Data>) -> Self {
        Self::List(value)
    }
}

impl From<DataMap> for Data {
    fn from(value: DataMap) -> Self {
        Self::Map(value)
    }
}

impl<T: Into<Data>> From<Option<T>> for Data {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Display for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::DateTime(value) => write!(f, "@{value}"),
            Self::String(value) => write!(f, "{value:?}"),
            // Raw buffers can be hundreds of megabytes; print the size only.
            Self::Bytes(value) => write!(f, "<{} bytes>", value.len()),
            Self::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Data, DataMap};

    #[test]
    fn default_is_null() {
        assert!(Data::default().is_null());
    }

    #[test]
    fn clone_is_deep_and_equality_is_structural() {
        let mut map = DataMap::new();
        map.insert("path".to_string(), Data::from("/dev/sda"));
        map.insert("size".to_string(), Data::from(512_i64));
        let original = Data::List(vec![Data::Map(map), Data::Bool(true)]);

        let mut copy = original.clone();
        assert_eq!(copy, original);

        if let Data::List(items) = &mut copy {
            items.push(Data::Null);
        }
        assert_ne!(copy, original);
        assert_eq!(original.as_list().map(<[Data]>::len), Some(2));
    }

    #[test]
    fn same_as_compares_floats_by_bits() {
        let nan = Data::Float(f64::NAN);
        assert_ne!(nan, nan.clone());
        assert!(nan.same_as(&nan.clone()));
        assert!(Data::List(vec![nan.clone()]).same_as(&Data::List(vec![nan.clone()])));
        assert!(!Data::Float(0.0).same_as(&Data::Float(-0.0)));
        assert!(!Data::Float(1.0).same_as(&Data::Integer(1)));

        let mut left = DataMap::new();
        left.insert("x".to_string(), nan.clone());
        let mut right = DataMap::new();
        right.insert("y".to_string(), nan);
        assert!(!Data::Map(left.clone()).same_as(&Data::Map(right)));
        assert!(Data::Map(left.clone()).same_as(&Data::Map(left)));
    }

    #[test]
    fn accessors_return_none_for_other_variants() {
        let value = Data::from("text");
        assert_eq!(value.as_str(), Some("text"));
        assert_eq!(value.as_i64(), None);
        assert_eq!(value.as_bytes(), None);
        assert_eq!(value.get("key"), None);
    }

    #[test]
    fn option_conversion_maps_none_to_null() {
        assert_eq!(Data::from(None::<i64>), Data::Null);
        assert_eq!(Data::from(Some(7_i64)), Data::Integer(7));
    }

    #[test]
    fn display_hides_buffer_contents() {
        let value = Data::from(vec![0_u8; 1024]);
        assert_eq!(value.to_string(), "<1024 bytes>");

        let mut map = DataMap::new();
        map.insert("a".to_string(), Data::List(vec![Data::from(1_i64), Data::Null]));
        assert_eq!(Data::Map(map).to_string(), "{\"a\": [1, null]}");
    }
}
