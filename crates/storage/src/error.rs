use scimeta_core::{CoreError, EntityId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("{table} row {id} is no longer at version {expected}")]
    VersionConflict {
        table: &'static str,
        id: EntityId,
        expected: i64,
    },

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl StorageError {
    /// Lift SQLite constraint failures into `ConstraintViolation`.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(msg.unwrap_or_else(|| code.to_string()))
            }
            other => Self::Sqlite(other),
        }
    }
}
