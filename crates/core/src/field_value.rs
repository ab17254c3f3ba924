use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch, UTC.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(ms)
    }
}

/// A single scalar column value as it moves between detached entities, the
/// identity map and the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(i64),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b).is_eq(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(n) => Some(*n),
            FieldValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Float(n) => write!(f, "{n}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
            FieldValue::Timestamp(ms) => write!(f, "@{ms}"),
        }
    }
}

/// Rust types that can sit in an entity's scalar slot.
pub trait Scalar: Sized + Clone {
    fn into_value(self) -> FieldValue;
    fn from_value(value: &FieldValue) -> Option<Self>;
}

impl Scalar for String {
    fn into_value(self) -> FieldValue {
        FieldValue::Text(self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_text().map(str::to_owned)
    }
}

impl Scalar for i64 {
    fn into_value(self) -> FieldValue {
        FieldValue::Integer(self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_integer()
    }
}

impl Scalar for f64 {
    fn into_value(self) -> FieldValue {
        FieldValue::Float(self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_float()
    }
}

impl Scalar for bool {
    fn into_value(self) -> FieldValue {
        FieldValue::Boolean(self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_boolean()
    }
}

impl Scalar for Timestamp {
    fn into_value(self) -> FieldValue {
        FieldValue::Timestamp(self.0)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Timestamp(ms) => Some(Timestamp(*ms)),
            _ => None,
        }
    }
}

macro_rules! from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                value.into_value()
            }
        })*
    };
}

from_scalar!(String, i64, f64, bool, Timestamp);

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}
