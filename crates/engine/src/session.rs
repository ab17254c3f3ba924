use scimeta_core::{
    Entity, EntityId, EntityKind, FieldValue, Node, Rel, RelationDef, RelationKind,
};
use scimeta_storage::{Criterion, Order, RowRecord, Storage, StorageError};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, StoreContext};
use crate::identity::IdentityMap;
use crate::notify::{ChangeKind, PendingChange};

/// Result of reconciling one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: EntityId,
    /// A new row was inserted.
    pub created: bool,
    /// Any scalar, reference or collection membership changed.
    pub changed: bool,
}

/// How the synchronizer reached the entity it is reconciling.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Via {
    pub owner_kind: EntityKind,
    pub owner: Option<EntityId>,
    pub relation: &'static RelationDef,
}

impl Via {
    /// The relation on the reached entity that points straight back at the
    /// owner. The owner is already handling that link.
    pub fn skips(&self, relation: &str) -> bool {
        self.relation.inverse == Some(relation)
    }
}

/// One transaction's worth of reconciliation work: the identity map, the
/// business-key arena and the change notifications waiting for commit.
pub struct Session<'e, S: Storage> {
    pub(crate) store: &'e mut S,
    pub(crate) config: &'e EngineConfig,
    pub(crate) identity: IdentityMap,
    pub(crate) pending: Vec<PendingChange>,
}

impl<'e, S: Storage> Session<'e, S> {
    pub(crate) fn new(store: &'e mut S, config: &'e EngineConfig) -> Self {
        Self {
            store,
            config,
            identity: IdentityMap::new(),
            pending: Vec::new(),
        }
    }

    pub(crate) fn into_pending(self) -> Vec<PendingChange> {
        self.pending
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    /// Number of rows this session is tracking.
    pub fn tracked(&self) -> usize {
        self.identity.len()
    }

    // ========================================================================
    // Reconciling operations
    // ========================================================================

    /// Resolve-or-create `entity` and its supplied relationship graph.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(kind = %T::KIND))]
    pub fn upsert<T: Entity>(&mut self, entity: &T) -> Result<UpsertOutcome, EngineError> {
        let outcome = self.upsert_node(&entity.to_node(), None)?;
        debug!(id = %outcome.id, created = outcome.created, changed = outcome.changed, "upserted");
        Ok(outcome)
    }

    /// The persistent equivalent of `entity`, by id then business key.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(kind = %T::KIND))]
    pub fn resolve<T: Entity>(
        &mut self,
        entity: &T,
        load_graph: bool,
    ) -> Result<Option<T>, EngineError> {
        let node = entity.to_node();
        match self.resolve_id(&node, None)? {
            Some(id) => self.fetch(T::KIND, id, load_graph).map(|n| n.map(|n| T::from_node(&n))),
            None => Ok(None),
        }
    }

    /// Sever every relationship pointing at `entity`, then delete it.
    /// Returns false when there was nothing to delete.
    #[tracing::instrument(level = "debug", skip(self, entity), fields(kind = %T::KIND))]
    pub fn delete<T: Entity>(&mut self, entity: &T) -> Result<bool, EngineError> {
        self.delete_node(&entity.to_node())
    }

    /// Deep copy of the persistent equivalent of `entity`, graph loaded.
    pub fn deep_copy_persistent<T: Entity>(
        &mut self,
        entity: &T,
    ) -> Result<Option<T>, EngineError> {
        Ok(self.resolve(entity, true)?.map(|found| found.deep_copy()))
    }

    /// Add `target` to relation `rel` of `owner`, keeping the inverse side
    /// consistent. Returns false if the link already existed or would link
    /// an entity to itself.
    #[tracing::instrument(level = "debug", skip(self), fields(kind = %T::KIND))]
    pub fn link<T: Entity, U: Entity>(
        &mut self,
        owner: EntityId,
        rel: Rel<T, U>,
        target: EntityId,
    ) -> Result<bool, EngineError> {
        let def = self.relation_def(T::KIND, rel.name())?;
        self.link_ids(T::KIND, owner, def, target)
    }

    /// Remove `target` from relation `rel` of `owner` on both sides.
    #[tracing::instrument(level = "debug", skip(self), fields(kind = %T::KIND))]
    pub fn unlink<T: Entity, U: Entity>(
        &mut self,
        owner: EntityId,
        rel: Rel<T, U>,
        target: EntityId,
    ) -> Result<bool, EngineError> {
        let def = self.relation_def(T::KIND, rel.name())?;
        self.unlink_ids(T::KIND, owner, def, target)
    }

    // ========================================================================
    // Read queries
    // ========================================================================

    pub fn find_by_id<T: Entity>(
        &mut self,
        id: EntityId,
        load_graph: bool,
    ) -> Result<Option<T>, EngineError> {
        Ok(self.fetch(T::KIND, id, load_graph)?.map(|n| T::from_node(&n)))
    }

    /// Like `resolve`, but ignores any surrogate id on `entity`.
    pub fn find_by_business_key<T: Entity>(
        &mut self,
        entity: &T,
        load_graph: bool,
    ) -> Result<Option<T>, EngineError> {
        let mut node = entity.to_node();
        node.id = None;
        match self.resolve_id(&node, None)? {
            Some(id) => self.find_by_id(id, load_graph),
            None => Ok(None),
        }
    }

    pub fn find_all_ids<T: Entity>(&mut self) -> Result<Vec<EntityId>, EngineError> {
        self.store.ids(T::KIND).ctx(T::KIND, "list ids")
    }

    pub fn count<T: Entity>(&mut self) -> Result<u64, EngineError> {
        self.store.count(T::KIND).ctx(T::KIND, "count")
    }

    /// Every `T` whose scalar `field` equals `value`, ascending by id.
    pub fn find_by_field<T: Entity>(
        &mut self,
        field: &str,
        value: impl Into<FieldValue>,
    ) -> Result<Vec<T>, EngineError> {
        let def = T::schema()
            .field(field)
            .ok_or_else(|| scimeta_core::CoreError::UnknownField {
                kind: T::KIND,
                name: field.to_string(),
            })?;
        let rows = self
            .store
            .find(T::KIND, &[Criterion::Field(def.name, value.into())], Order::IdAsc)
            .ctx(T::KIND, "find")?;
        Ok(self.track_all(rows).iter().map(|n| T::from_node(n)).collect())
    }

    /// Every `T` whose to-one relation `rel` points at `target`.
    pub fn find_referencing<T: Entity, U: Entity>(
        &mut self,
        rel: Rel<T, U>,
        target: EntityId,
    ) -> Result<Vec<T>, EngineError> {
        let def = self.relation_def(T::KIND, rel.name())?;
        if def.is_collection() {
            return Err(EngineError::invalid_reference(
                T::KIND,
                def.name,
                "not a to-one relation",
            ));
        }
        let rows = self
            .store
            .find(T::KIND, &[Criterion::Ref(def.name, target)], Order::IdAsc)
            .ctx(T::KIND, "find referencing")?;
        Ok(self.track_all(rows).iter().map(|n| T::from_node(n)).collect())
    }

    /// The current members of one relation of a persistent entity, scalars
    /// only. Works from either side of a bidirectional relation.
    pub fn related<T: Entity, U: Entity>(
        &mut self,
        owner: EntityId,
        rel: Rel<T, U>,
    ) -> Result<Vec<U>, EngineError> {
        let def = self.relation_def(T::KIND, rel.name())?;
        let ids = self.related_ids(T::KIND, owner, def)?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.load(U::KIND, id)? {
                out.push(U::from_node(&row.to_node()));
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Row access through the identity map
    // ========================================================================

    /// The tracked row for `(kind, id)`, reading it from the store on first
    /// access.
    pub(crate) fn load(
        &mut self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<Option<RowRecord>, EngineError> {
        if let Some(row) = self.identity.get(kind, id) {
            return Ok(Some(row.clone()));
        }
        match self.store.get(kind, id).ctx(kind, "get")? {
            Some(row) => Ok(Some(self.identity.track(row).clone())),
            None => Ok(None),
        }
    }

    pub(crate) fn require(
        &mut self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<RowRecord, EngineError> {
        self.load(kind, id)?.ok_or_else(|| {
            EngineError::store(kind, "get", StorageError::NotFound(format!("{kind} {id}")))
        })
    }

    fn track_all(&mut self, rows: Vec<RowRecord>) -> Vec<Node> {
        rows.into_iter()
            .map(|row| self.identity.track(row).to_node())
            .collect()
    }

    /// Persist `row` if the store still holds the version it was read at.
    pub(crate) fn write(&mut self, mut row: RowRecord) -> Result<RowRecord, EngineError> {
        match self.store.update(&row) {
            Ok(version) => {
                row.version = version;
                self.identity.refresh(row.clone());
                Ok(row)
            }
            Err(StorageError::VersionConflict { id, expected, .. }) => {
                let found = self
                    .store
                    .get(row.kind, id)
                    .ctx(row.kind, "update")?
                    .map_or(expected, |current| current.version);
                Err(EngineError::OptimisticConflict {
                    kind: row.kind,
                    id,
                    expected,
                    found,
                })
            }
            Err(err) => Err(EngineError::store(row.kind, "update", err)),
        }
    }

    /// Reject an incoming node whose version no longer matches the row.
    pub(crate) fn check_version(&self, node: &Node, id: EntityId) -> Result<(), EngineError> {
        let (Some(expected), Some(node_id)) = (node.version, node.id) else {
            return Ok(());
        };
        if node_id != id {
            return Ok(());
        }
        match self.identity.read_version(node.kind, id) {
            Some(found) if found != expected => Err(EngineError::OptimisticConflict {
                kind: node.kind,
                id,
                expected,
                found,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn relation_def(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<&'static RelationDef, EngineError> {
        kind.schema().relation(name).ok_or_else(|| {
            EngineError::Validation(scimeta_core::CoreError::UnknownField {
                kind,
                name: name.to_string(),
            })
        })
    }

    /// Ids currently on the far side of `rel` from `owner`.
    pub(crate) fn related_ids(
        &mut self,
        kind: EntityKind,
        owner: EntityId,
        rel: &'static RelationDef,
    ) -> Result<Vec<EntityId>, EngineError> {
        match rel.kind {
            RelationKind::ToOne { .. } => {
                Ok(self.require(kind, owner)?.refs.get(rel.name).copied().into_iter().collect())
            }
            RelationKind::OneToMany => {
                let mapped_by = mapped_by(kind, rel)?;
                let rows = self
                    .store
                    .find(rel.target, &[Criterion::Ref(mapped_by, owner)], Order::IdAsc)
                    .ctx(rel.target, "find members")?;
                Ok(rows
                    .into_iter()
                    .map(|row| {
                        let id = row.id;
                        self.identity.track(row);
                        id
                    })
                    .collect())
            }
            RelationKind::ManyToMany(join) => self.store.linked(&join, owner).ctx(kind, "linked"),
        }
    }

    pub(crate) fn record(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        change: ChangeKind,
        before: Option<String>,
        after: Option<&RowRecord>,
    ) {
        self.pending.push(PendingChange {
            kind,
            id,
            change,
            before,
            after: after.map(summary),
            contact: after.and_then(contact_of),
        });
    }

    /// A `KeyGenerated` change whose summary names only the generated field.
    pub(crate) fn record_generated(&mut self, row: &RowRecord, field: &str, value: &FieldValue) {
        self.pending.push(PendingChange {
            kind: row.kind,
            id: row.id,
            change: ChangeKind::KeyGenerated,
            before: None,
            after: Some(format!("{}|id={}|{field}={value}", row.kind, row.id)),
            contact: contact_of(row),
        });
    }
}

fn contact_of(row: &RowRecord) -> Option<String> {
    row.kind.schema().contact.and_then(|field| row.text(field)).map(str::to_owned)
}

pub(crate) fn summary(row: &RowRecord) -> String {
    row.to_node().summary("|")
}

/// The to-one relation on the member side of a one-to-many.
pub(crate) fn mapped_by(
    kind: EntityKind,
    rel: &'static RelationDef,
) -> Result<&'static str, EngineError> {
    rel.inverse.ok_or_else(|| {
        EngineError::invalid_reference(kind, rel.name, "one-to-many without inverse")
    })
}
