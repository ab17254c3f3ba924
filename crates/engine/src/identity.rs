use std::collections::{HashMap, HashSet};

use scimeta_core::{EntityId, EntityKind};
use scimeta_storage::RowRecord;

type Key = (EntityKind, EntityId);

struct Tracked {
    row: RowRecord,
    /// Version the row had when this session first read it.
    read_version: i64,
}

/// Per-transaction map of every row the session has touched, plus the
/// business-key arena that keeps one key resolving to one id for the
/// lifetime of the session.
#[derive(Default)]
pub struct IdentityMap {
    rows: HashMap<Key, Tracked>,
    keys: HashMap<(EntityKind, String), EntityId>,
    in_progress: HashSet<Key>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: EntityKind, id: EntityId) -> bool {
        self.rows.contains_key(&(kind, id))
    }

    pub fn get(&self, kind: EntityKind, id: EntityId) -> Option<&RowRecord> {
        self.rows.get(&(kind, id)).map(|t| &t.row)
    }

    /// Start tracking `row` unless it is already tracked; the tracked copy
    /// always wins.
    pub fn track(&mut self, row: RowRecord) -> &RowRecord {
        let read_version = row.version;
        &self
            .rows
            .entry((row.kind, row.id))
            .or_insert(Tracked { row, read_version })
            .row
    }

    /// Replace the tracked row after a successful write.
    pub fn refresh(&mut self, row: RowRecord) {
        match self.rows.get_mut(&(row.kind, row.id)) {
            Some(tracked) => tracked.row = row,
            None => {
                let read_version = row.version;
                self.rows.insert((row.kind, row.id), Tracked { row, read_version });
            }
        }
    }

    pub fn read_version(&self, kind: EntityKind, id: EntityId) -> Option<i64> {
        self.rows.get(&(kind, id)).map(|t| t.read_version)
    }

    pub fn remember_key(&mut self, kind: EntityKind, key: String, id: EntityId) {
        self.keys.insert((kind, key), id);
    }

    pub fn key(&self, kind: EntityKind, key: &str) -> Option<EntityId> {
        self.keys.get(&(kind, key.to_string())).copied()
    }

    /// Drop a deleted row and every arena key pointing at it.
    pub fn forget(&mut self, kind: EntityKind, id: EntityId) {
        self.rows.remove(&(kind, id));
        self.keys.retain(|(k, _), v| !(*k == kind && *v == id));
        self.in_progress.remove(&(kind, id));
    }

    /// Mark `id` as being reconciled. Returns false if it already was,
    /// which means the caller is inside a cycle.
    pub fn enter(&mut self, kind: EntityKind, id: EntityId) -> bool {
        self.in_progress.insert((kind, id))
    }

    pub fn leave(&mut self, kind: EntityKind, id: EntityId) {
        self.in_progress.remove(&(kind, id));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
