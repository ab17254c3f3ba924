use std::collections::BTreeMap;

use scimeta_core::{EntityId, EntityKind, FieldValue, JoinTable, Node};

use crate::error::StorageError;

/// One persistent row: scalar columns plus the foreign keys of the entity's
/// to-one relations, keyed by relation name.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    pub kind: EntityKind,
    pub id: EntityId,
    pub version: i64,
    pub fields: BTreeMap<&'static str, FieldValue>,
    pub refs: BTreeMap<&'static str, EntityId>,
}

impl RowRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }

    /// Scalars and identity only; relations are left unloaded.
    pub fn to_node(&self) -> Node {
        let mut node = Node::new(self.kind);
        node.id = Some(self.id);
        node.version = Some(self.version);
        node.fields = self
            .fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        node
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Exact match on a scalar column. `Null` matches `IS NULL`.
    Field(&'static str, FieldValue),
    /// Exact match on a to-one relation's foreign key.
    Ref(&'static str, EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    IdAsc,
    IdDesc,
}

/// The transactional store the reconciliation engine runs against.
///
/// Every write is revision checked: `update` and `delete` only succeed when
/// the row is still at the version the caller read.
pub trait Storage {
    fn begin(&mut self) -> Result<(), StorageError>;

    fn commit(&mut self) -> Result<(), StorageError>;

    fn rollback(&mut self) -> Result<(), StorageError>;

    fn get(&self, kind: EntityKind, id: EntityId) -> Result<Option<RowRecord>, StorageError>;

    fn find(
        &self,
        kind: EntityKind,
        criteria: &[Criterion],
        order: Order,
    ) -> Result<Vec<RowRecord>, StorageError>;

    fn count(&self, kind: EntityKind) -> Result<u64, StorageError>;

    fn ids(&self, kind: EntityKind) -> Result<Vec<EntityId>, StorageError>;

    /// Insert a new row at version 0 and return its store-assigned id.
    fn insert(
        &mut self,
        kind: EntityKind,
        fields: &BTreeMap<&'static str, FieldValue>,
        refs: &BTreeMap<&'static str, EntityId>,
    ) -> Result<EntityId, StorageError>;

    /// Overwrite every column of `row` if the stored version still equals
    /// `row.version`. Returns the new version.
    fn update(&mut self, row: &RowRecord) -> Result<i64, StorageError>;

    fn delete(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        expected_version: i64,
    ) -> Result<(), StorageError>;

    /// Targets linked to `owner` through `join`, ascending by id.
    fn linked(&self, join: &JoinTable, owner: EntityId) -> Result<Vec<EntityId>, StorageError>;

    /// Returns false when the link already existed.
    fn link(
        &mut self,
        join: &JoinTable,
        owner: EntityId,
        target: EntityId,
    ) -> Result<bool, StorageError>;

    /// Returns false when there was no such link.
    fn unlink(
        &mut self,
        join: &JoinTable,
        owner: EntityId,
        target: EntityId,
    ) -> Result<bool, StorageError>;

    fn unlink_all(&mut self, join: &JoinTable, owner: EntityId) -> Result<usize, StorageError>;
}
