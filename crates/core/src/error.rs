use thiserror::Error;

use crate::schema::EntityKind;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind}.{field}: {reason}")]
    Validation {
        kind: EntityKind,
        field: &'static str,
        reason: String,
    },

    #[error("{kind} has no field or relation named {name:?}")]
    UnknownField { kind: EntityKind, name: String },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CoreError {
    pub fn validation(kind: EntityKind, field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            field,
            reason: reason.into(),
        }
    }
}
