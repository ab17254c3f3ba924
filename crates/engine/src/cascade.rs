//! Deletion with reference cleanup.
//!
//! Before a row goes, every join-table membership and every foreign key
//! pointing at it is removed, so deleting a widely shared entity never
//! trips a constraint or leaves dangling references.

use scimeta_core::{EntityId, EntityKind, Node, OnDelete, RelationKind, catalog};
use scimeta_storage::{Criterion, Order, Storage};
use tracing::debug;

use crate::error::{EngineError, StoreContext};
use crate::notify::ChangeKind;
use crate::session::{Session, summary};

impl<S: Storage> Session<'_, S> {
    pub(crate) fn delete_node(&mut self, node: &Node) -> Result<bool, EngineError> {
        let Some(id) = self.resolve_id(node, None)? else {
            debug!(kind = %node.kind, "nothing to delete");
            return Ok(false);
        };
        self.check_version(node, id)?;
        self.delete_by_id(node.kind, id)
    }

    pub(crate) fn delete_by_id(
        &mut self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<bool, EngineError> {
        if !self.identity.enter(kind, id) {
            return Ok(false);
        }
        let result = self.sever_and_delete(kind, id);
        self.identity.leave(kind, id);
        result
    }

    fn sever_and_delete(&mut self, kind: EntityKind, id: EntityId) -> Result<bool, EngineError> {
        let Some(row) = self.load(kind, id)? else {
            return Ok(false);
        };
        let before = summary(&row);

        for rel in kind.schema().relations {
            match rel.kind {
                RelationKind::ToOne { .. } => {}
                RelationKind::ManyToMany(join) => {
                    let removed = self.store.unlink_all(&join, id).ctx(kind, "unlink all")?;
                    if removed > 0 {
                        debug!(%kind, %id, relation = rel.name, removed, "memberships removed");
                    }
                }
                RelationKind::OneToMany => {
                    let members = self.related_ids(kind, id, rel)?;
                    for member in members {
                        if rel.target == kind && member == id {
                            continue;
                        }
                        match rel.on_delete {
                            OnDelete::Cascade => {
                                self.delete_by_id(rel.target, member)?;
                            }
                            OnDelete::Nullify => {
                                if let Some(row) = self.load(rel.target, member)? {
                                    let inverse = crate::session::mapped_by(kind, rel)?;
                                    self.set_ref(row, inverse, None)?;
                                }
                            }
                        }
                    }
                }
            }
        }

        for (schema, rel) in catalog::inbound(kind) {
            match rel.kind {
                RelationKind::ToOne { .. } => {
                    let rows = self
                        .store
                        .find(schema.kind, &[Criterion::Ref(rel.name, id)], Order::IdAsc)
                        .ctx(schema.kind, "find referencing")?;
                    for referencing in rows {
                        if schema.kind == kind && referencing.id == id {
                            continue;
                        }
                        let current = self.identity.track(referencing).clone();
                        debug!(
                            kind = %schema.kind,
                            id = %current.id,
                            relation = rel.name,
                            "clearing reference"
                        );
                        self.set_ref(current, rel.name, None)?;
                    }
                }
                RelationKind::ManyToMany(join) => {
                    self.store
                        .unlink_all(&join.reversed(), id)
                        .ctx(schema.kind, "unlink all")?;
                }
                RelationKind::OneToMany => {}
            }
        }

        let current = self.require(kind, id)?;
        let owned: Vec<_> = kind
            .schema()
            .relations
            .iter()
            .filter(|rel| !rel.is_collection() && rel.on_delete == OnDelete::Cascade)
            .filter_map(|rel| current.refs.get(rel.name).map(|target| (rel.target, *target)))
            .collect();
        self.store.delete(kind, id, current.version).ctx(kind, "delete")?;
        self.identity.forget(kind, id);
        debug!(%kind, %id, "deleted");
        self.record(kind, id, ChangeKind::Deleted, Some(before), None);

        // Owned to-one targets go after the row that points at them.
        for (target_kind, target) in owned {
            self.delete_by_id(target_kind, target)?;
        }
        Ok(true)
    }
}
