use scimeta_core::{CoreError, EntityId, EntityKind};
use scimeta_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} {kind}: {source}")]
    Store {
        kind: EntityKind,
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("{kind} {id} changed underneath: read version {expected}, store has {found}")]
    OptimisticConflict {
        kind: EntityKind,
        id: EntityId,
        expected: i64,
        found: i64,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] CoreError),

    #[error("invalid reference {kind}.{relation}: {reason}")]
    InvalidReference {
        kind: EntityKind,
        relation: &'static str,
        reason: String,
    },

    #[error("{kind} key {key} matches {matches} rows")]
    AmbiguousBusinessKey {
        kind: EntityKind,
        key: String,
        matches: usize,
    },

    #[error("transaction {operation} failed: {source}")]
    Transaction {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Wrap a storage failure with the entity type and operation it broke.
    pub fn store(kind: EntityKind, operation: &'static str, source: StorageError) -> Self {
        Self::Store {
            kind,
            operation,
            source,
        }
    }

    pub fn invalid_reference(
        kind: EntityKind,
        relation: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidReference {
            kind,
            relation,
            reason: reason.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::OptimisticConflict { .. })
    }
}

/// Extension for attaching entity/operation context to storage results.
pub(crate) trait StoreContext<T> {
    fn ctx(self, kind: EntityKind, operation: &'static str) -> Result<T, EngineError>;
}

impl<T> StoreContext<T> for Result<T, StorageError> {
    fn ctx(self, kind: EntityKind, operation: &'static str) -> Result<T, EngineError> {
        self.map_err(|source| EngineError::store(kind, operation, source))
    }
}
