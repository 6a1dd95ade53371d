//! The channel value model.
//!
//! A channel table maps [`Key`]s (string or integer) to tagged [`Value`]s.
//! The dynamic record of the source model becomes an explicit map with
//! typed get/set/delete operations; a [`Record`] is the initializer shape
//! accepted by channel allocation.

use crate::types::LogicalTime;
use core::fmt;
use std::collections::BTreeMap;

/// A field key in a channel table: either a name or a numeric index.
///
/// Keys are totally ordered (indexes before names) so that every iteration
/// over a record is deterministic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Key {
    /// A numeric field, used for positional data such as return values.
    Index(u64),
    /// A named field.
    Name(String),
}

impl Key {
    /// The reserved field set to `true` when a process terminates and its
    /// return values have been written.
    #[must_use]
    pub fn terminated() -> Self {
        Self::Name("terminated".to_owned())
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u64> for Key {
    fn from(index: u64) -> Self {
        Self::Index(index)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "Key[{i}]"),
            Self::Name(n) => write!(f, "Key[{n:?}]"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(n) => write!(f, "{n}"),
        }
    }
}

/// A field value in a channel table.
///
/// The tagged union covers the scalar shapes processes exchange. Compound
/// data is modeled as multiple fields of one channel, or as channels passed
/// by handle in process arguments.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Text(String),
    /// A logical timestamp.
    Time(LogicalTime),
}

impl Value {
    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp payload, if this is a `Time`.
    #[must_use]
    pub const fn as_time(&self) -> Option<LogicalTime> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Time(t) => write!(f, "{t}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<LogicalTime> for Value {
    fn from(t: LogicalTime) -> Self {
        Self::Time(t)
    }
}

/// The initializer shape for a channel table: an ordered key/value map.
pub type Record = BTreeMap<Key, Value>;

/// Builds a [`Record`] from `key => value` pairs.
///
/// ```
/// use lockstep::record;
/// use lockstep::types::Value;
///
/// let r = record! { "count" => Value::Int(0), "open" => Value::Bool(true) };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::types::Record::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut r = $crate::types::Record::new();
        $(r.insert($crate::types::Key::from($key), $value);)+
        r
    }};
}
