//! The upsert pipeline and the relationship synchronizer.
//!
//! To-one targets are reconciled before the owner row is read and written,
//! so nested writes never leave the owner holding a stale version.
//! Collections are reconciled after the owner has an id. Collections are
//! additive: nothing is removed unless `unlink` is called explicitly.

use std::collections::BTreeMap;

use scimeta_core::keys::{generate_missing, key_text};
use scimeta_core::{BusinessKey, CoreError, EntityId, EntityKind, Node, RelationDef, RelationKind};
use scimeta_storage::{RowRecord, Storage};
use tracing::{debug, warn};

use crate::error::{EngineError, StoreContext};
use crate::merge::{merge_scalars, normalize};
use crate::notify::ChangeKind;
use crate::session::{Session, UpsertOutcome, Via, mapped_by, summary};

impl<S: Storage> Session<'_, S> {
    pub(crate) fn upsert_node(
        &mut self,
        node: &Node,
        via: Option<Via>,
    ) -> Result<UpsertOutcome, EngineError> {
        node.schema().validate(node.fields.iter())?;
        match self.resolve_id(node, via)? {
            Some(id) => {
                if !self.identity.enter(node.kind, id) {
                    debug!(kind = %node.kind, %id, "already reconciling, cycle cut");
                    return Ok(UpsertOutcome {
                        id,
                        created: false,
                        changed: false,
                    });
                }
                let result = self.update_existing(node, id, via);
                self.identity.leave(node.kind, id);
                result
            }
            None => self.insert_new(node, via),
        }
    }

    fn update_existing(
        &mut self,
        node: &Node,
        id: EntityId,
        via: Option<Via>,
    ) -> Result<UpsertOutcome, EngineError> {
        let kind = node.kind;
        self.check_version(node, id)?;

        let refs = self.sync_to_one(node, Some(id), via)?;

        let row = self.require(kind, id)?;
        let before = summary(&row);
        let mut updated = row.clone();
        let mut changed = merge_scalars(node, &mut updated)?;
        for (name, target) in refs {
            if updated.refs.get(name) != Some(&target) {
                debug!(%kind, %id, relation = name, %target, "reference set");
                updated.refs.insert(name, target);
                changed = true;
            }
        }
        if updated != row {
            updated = self.write(updated)?;
        }

        changed |= self.sync_collections(node, id, via)?;

        if changed {
            let after = self.require(kind, id)?;
            self.record(kind, id, ChangeKind::Updated, Some(before), Some(&after));
        }
        Ok(UpsertOutcome {
            id,
            created: false,
            changed,
        })
    }

    fn insert_new(&mut self, node: &Node, via: Option<Via>) -> Result<UpsertOutcome, EngineError> {
        let kind = node.kind;
        let schema = node.schema();

        let mut complete = node.clone();
        let generated = generate_missing(&mut complete, &self.config.generated_uri_base);
        schema.validate(complete.fields.iter())?;
        for rule in schema.generated {
            if complete.field(rule.field()).is_none() {
                return Err(CoreError::validation(kind, rule.field(), "required").into());
            }
        }

        let mut refs = self.sync_to_one(&complete, None, via)?;
        // Reached through a one-to-many: the owner's id goes straight into the FK.
        if let Some(via) = via {
            if let (RelationKind::OneToMany, Some(owner), Some(inverse)) =
                (via.relation.kind, via.owner, via.relation.inverse)
            {
                refs.insert(inverse, owner);
            }
        }

        let fields: BTreeMap<_, _> = complete
            .fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(name, value)| (*name, normalize(schema.field(name).map(|f| f.ty), value)))
            .collect();
        let id = self.store.insert(kind, &fields, &refs).ctx(kind, "insert")?;
        let row = self.require(kind, id)?;
        debug!(%kind, %id, "inserted");

        for (field, value) in &generated {
            warn!(%kind, %id, field = *field, %value, "generated missing key field");
            self.record_generated(&row, field, value);
        }
        self.remember_keys(&complete, id);

        self.identity.enter(kind, id);
        let synced = self.sync_collections(&complete, id, via);
        self.identity.leave(kind, id);
        synced?;

        let after = self.require(kind, id)?;
        self.record(kind, id, ChangeKind::Created, None, Some(&after));
        Ok(UpsertOutcome {
            id,
            created: true,
            changed: true,
        })
    }

    /// Register a freshly inserted row under its business key so later
    /// lookups in this session find it without a query.
    fn remember_keys(&mut self, node: &Node, id: EntityId) {
        if let BusinessKey::Unique { fields, .. } = node.schema().key {
            if let Some(key) = key_text(node, fields) {
                self.identity.remember_key(node.kind, key, id);
            }
        }
    }

    /// Upsert every supplied to-one target. Returns the ids to reference.
    fn sync_to_one(
        &mut self,
        node: &Node,
        owner: Option<EntityId>,
        via: Option<Via>,
    ) -> Result<BTreeMap<&'static str, EntityId>, EngineError> {
        let kind = node.kind;
        let mut refs = BTreeMap::new();
        for (name, target) in &node.one {
            let rel = self.relation_def(kind, name)?;
            if rel.is_collection() {
                return Err(EngineError::invalid_reference(
                    kind,
                    rel.name,
                    "collection given a single value",
                ));
            }
            if via.is_some_and(|v| v.skips(name)) {
                continue;
            }
            let child_via = Via {
                owner_kind: kind,
                owner,
                relation: rel,
            };
            let outcome = self.upsert_child(kind, rel, target, child_via)?;
            if rel.target == kind && Some(outcome.id) == owner {
                debug!(%kind, relation = rel.name, "ignoring self reference");
                continue;
            }
            refs.insert(rel.name, outcome.id);
        }
        Ok(refs)
    }

    /// Reconcile every supplied collection of the row `owner`.
    fn sync_collections(
        &mut self,
        node: &Node,
        owner: EntityId,
        via: Option<Via>,
    ) -> Result<bool, EngineError> {
        let kind = node.kind;
        let mut changed = false;
        for (name, items) in &node.many {
            let rel = self.relation_def(kind, name)?;
            if !rel.is_collection() {
                return Err(EngineError::invalid_reference(
                    kind,
                    rel.name,
                    "single reference given a list",
                ));
            }
            if via.is_some_and(|v| v.skips(name)) {
                continue;
            }
            let child_via = Via {
                owner_kind: kind,
                owner: Some(owner),
                relation: rel,
            };
            for item in items {
                let outcome = self.upsert_child(kind, rel, item, child_via)?;
                if rel.target == kind && outcome.id == owner {
                    debug!(%kind, relation = rel.name, "ignoring self reference");
                    continue;
                }
                changed |= self.link_ids(kind, owner, rel, outcome.id)?;
            }
        }
        Ok(changed)
    }

    /// Upsert one related node. A nested validation failure is reported
    /// against the relation that carried it.
    fn upsert_child(
        &mut self,
        kind: EntityKind,
        rel: &'static RelationDef,
        target: &Node,
        via: Via,
    ) -> Result<UpsertOutcome, EngineError> {
        if target.kind != rel.target {
            return Err(EngineError::invalid_reference(
                kind,
                rel.name,
                format!("expected {}, got {}", rel.target, target.kind),
            ));
        }
        self.upsert_node(target, Some(via)).map_err(|err| match err {
            EngineError::Validation(source) => {
                EngineError::invalid_reference(kind, rel.name, source.to_string())
            }
            other => other,
        })
    }

    /// Add one membership, from the owning side. Returns whether anything
    /// was written.
    pub(crate) fn link_ids(
        &mut self,
        kind: EntityKind,
        owner: EntityId,
        rel: &'static RelationDef,
        target: EntityId,
    ) -> Result<bool, EngineError> {
        if rel.target == kind && owner == target {
            debug!(%kind, relation = rel.name, "ignoring self link");
            return Ok(false);
        }
        match rel.kind {
            RelationKind::ToOne { .. } => {
                self.require(rel.target, target)?;
                let row = self.require(kind, owner)?;
                self.set_ref(row, rel.name, Some(target))
            }
            RelationKind::OneToMany => {
                self.require(kind, owner)?;
                let member = self.require(rel.target, target)?;
                self.set_ref(member, mapped_by(kind, rel)?, Some(owner))
            }
            RelationKind::ManyToMany(join) => {
                self.require(kind, owner)?;
                self.require(rel.target, target)?;
                let added = self.store.link(&join, owner, target).ctx(kind, "link")?;
                if added {
                    debug!(%kind, %owner, relation = rel.name, %target, "linked");
                }
                Ok(added)
            }
        }
    }

    pub(crate) fn unlink_ids(
        &mut self,
        kind: EntityKind,
        owner: EntityId,
        rel: &'static RelationDef,
        target: EntityId,
    ) -> Result<bool, EngineError> {
        match rel.kind {
            RelationKind::ToOne { .. } => {
                let row = self.require(kind, owner)?;
                if row.refs.get(rel.name) != Some(&target) {
                    return Ok(false);
                }
                self.set_ref(row, rel.name, None)
            }
            RelationKind::OneToMany => {
                let inverse = mapped_by(kind, rel)?;
                let Some(member) = self.load(rel.target, target)? else {
                    return Ok(false);
                };
                if member.refs.get(inverse) != Some(&owner) {
                    return Ok(false);
                }
                self.set_ref(member, inverse, None)
            }
            RelationKind::ManyToMany(join) => {
                let removed = self.store.unlink(&join, owner, target).ctx(kind, "unlink")?;
                if removed {
                    debug!(%kind, %owner, relation = rel.name, %target, "unlinked");
                }
                Ok(removed)
            }
        }
    }

    /// Point (or clear) one foreign key of `row`, recording the change.
    pub(crate) fn set_ref(
        &mut self,
        row: RowRecord,
        relation: &'static str,
        target: Option<EntityId>,
    ) -> Result<bool, EngineError> {
        if row.refs.get(relation).copied() == target {
            return Ok(false);
        }
        let before = summary(&row);
        let mut updated = row;
        match target {
            Some(id) => updated.refs.insert(relation, id),
            None => updated.refs.remove(relation),
        };
        let updated = self.write(updated)?;
        self.record(updated.kind, updated.id, ChangeKind::Updated, Some(before), Some(&updated));
        Ok(true)
    }
}
