use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Store-assigned surrogate identifier. Assigned once at first insert and
/// never reassigned.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntityId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// A fresh time-ordered UUID in canonical hyphenated form, used for
/// UUID-keyed entities that arrive without one.
pub fn time_uuid() -> String {
    Uuid::now_v7().to_string()
}
