//! Identity resolution: find the persistent equivalent of a detached node,
//! first by surrogate id, then by the business key of its type.

use scimeta_core::keys::key_text;
use scimeta_core::{BusinessKey, EntityId, EntityKind, FieldValue, KeyGen, Node, RelationKind};
use scimeta_storage::{Criterion, Order, RowRecord, Storage};
use tracing::{debug, warn};

use crate::config::AmbiguousKeyPolicy;
use crate::error::{EngineError, StoreContext};
use crate::session::{Session, Via, mapped_by};

impl<S: Storage> Session<'_, S> {
    /// Id of the row `node` denotes, or `None` if it has no persistent
    /// equivalent yet. Absence is never an error.
    pub(crate) fn resolve_id(
        &mut self,
        node: &Node,
        via: Option<Via>,
    ) -> Result<Option<EntityId>, EngineError> {
        if let Some(id) = node.id {
            if self.load(node.kind, id)?.is_some() {
                return Ok(Some(id));
            }
            debug!(kind = %node.kind, %id, "surrogate id not found, trying business key");
        }
        let found = match node.schema().key {
            BusinessKey::Unique { fields, fallback } => {
                match self.by_unique_key(node, fields)? {
                    Some(id) => Some(id),
                    None if !fallback.is_empty() && key_text(node, fields).is_none() => {
                        self.by_unique_key(node, fallback)?
                    }
                    None => None,
                }
            }
            BusinessKey::Scoped { scope, fields } => self.by_scoped_key(node, scope, fields, via)?,
            BusinessKey::SharedOutput {
                type_field,
                outputs,
            } => self.by_shared_output(node, type_field, outputs, via)?,
            BusinessKey::SurrogateOnly => self.by_owner_reference(via)?,
        };
        if let Some(id) = found {
            debug!(kind = %node.kind, %id, "resolved by business key");
        }
        Ok(found)
    }

    fn by_unique_key(
        &mut self,
        node: &Node,
        fields: &'static [&'static str],
    ) -> Result<Option<EntityId>, EngineError> {
        let Some(key) = key_text(node, fields) else {
            return Ok(None);
        };
        if let Some(id) = self.identity.key(node.kind, &key) {
            return Ok(Some(id));
        }
        let mut criteria = Vec::with_capacity(fields.len());
        for name in fields {
            let ty = node.schema().field(name).map(|f| f.ty);
            let value = match node.field(name) {
                Some(value) => crate::merge::normalize(ty, value),
                // nullable key part, checked by key_text
                None => FieldValue::Null,
            };
            criteria.push(Criterion::Field(*name, value));
        }
        let rows = self
            .store
            .find(node.kind, &criteria, Order::IdAsc)
            .ctx(node.kind, "find by key")?;
        let found = self.pick(node.kind, &key, rows)?;
        if let Some(id) = found {
            self.identity.remember_key(node.kind, key, id);
        }
        Ok(found)
    }

    fn by_scoped_key(
        &mut self,
        node: &Node,
        scope: &'static str,
        fields: &'static [&'static str],
        via: Option<Via>,
    ) -> Result<Option<EntityId>, EngineError> {
        let Some(scope_id) = self.scope_id(node, scope, via)? else {
            return Ok(None);
        };
        let Some(key) = key_text(node, fields) else {
            return Ok(None);
        };
        let key = format!("{scope}={scope_id}|{key}");
        if let Some(id) = self.identity.key(node.kind, &key) {
            return Ok(Some(id));
        }
        let mut criteria = vec![Criterion::Ref(scope, scope_id)];
        for name in fields {
            if let Some(value) = node.field(name) {
                criteria.push(Criterion::Field(*name, value.clone()));
            }
        }
        let rows = self
            .store
            .find(node.kind, &criteria, Order::IdAsc)
            .ctx(node.kind, "find by scoped key")?;
        let found = self.pick(node.kind, &key, rows)?;
        if let Some(id) = found {
            self.identity.remember_key(node.kind, key, id);
        }
        Ok(found)
    }

    /// The entity a scoped key is scoped to: the supplied reference, else
    /// the owner the node was reached from.
    pub(crate) fn scope_id(
        &mut self,
        node: &Node,
        scope: &'static str,
        via: Option<Via>,
    ) -> Result<Option<EntityId>, EngineError> {
        if let Some(target) = node.one.get(scope) {
            return self.resolve_id(target, None);
        }
        Ok(via
            .filter(|v| v.skips(scope))
            .and_then(|v| v.owner))
    }

    /// Producers: the creator of any supplied output, provided the type
    /// matches.
    fn by_shared_output(
        &mut self,
        node: &Node,
        type_field: &'static str,
        outputs: &'static str,
        via: Option<Via>,
    ) -> Result<Option<EntityId>, EngineError> {
        let schema = node.schema();
        let Some(rel) = schema.relation(outputs) else {
            return Ok(None);
        };
        let creator = mapped_by(node.kind, rel)?;

        let mut containers = Vec::new();
        for output in node.many.get(outputs).into_iter().flatten() {
            if let Some(id) = self.resolve_id(output, None)? {
                containers.push(id);
            }
        }
        if let Some(owner) = via.filter(|v| v.skips(outputs)).and_then(|v| v.owner) {
            containers.push(owner);
        }

        let wanted = node.field(type_field).cloned().or_else(|| {
            schema.generated.iter().find_map(|rule| match rule {
                KeyGen::Default { field, value } if *field == type_field => {
                    Some(FieldValue::Text(value.to_string()))
                }
                _ => None,
            })
        });

        let mut candidates: Vec<RowRecord> = Vec::new();
        for container in containers {
            let Some(row) = self.load(rel.target, container)? else {
                continue;
            };
            let Some(producer) = row.refs.get(creator).copied() else {
                continue;
            };
            if candidates.iter().any(|c| c.id == producer) {
                continue;
            }
            let Some(candidate) = self.load(node.kind, producer)? else {
                continue;
            };
            if wanted.is_none() || candidate.field(type_field) == wanted.as_ref() {
                candidates.push(candidate);
            }
        }
        candidates.sort_by_key(|c| c.id);
        let key = format!("{outputs} shared with {} candidates", candidates.len());
        self.pick(node.kind, &key, candidates)
    }

    /// Entities without a business key reached through a to-one relation
    /// are matched to whatever the owner currently references there.
    fn by_owner_reference(&mut self, via: Option<Via>) -> Result<Option<EntityId>, EngineError> {
        let Some(via) = via else {
            return Ok(None);
        };
        let (RelationKind::ToOne { .. }, Some(owner)) = (via.relation.kind, via.owner) else {
            return Ok(None);
        };
        Ok(self
            .load(via.owner_kind, owner)?
            .and_then(|row| row.refs.get(via.relation.name).copied()))
    }

    /// Apply the ambiguity policy to a lookup that may have hit several rows.
    fn pick(
        &mut self,
        kind: EntityKind,
        key: &str,
        rows: Vec<RowRecord>,
    ) -> Result<Option<EntityId>, EngineError> {
        let matches = rows.len();
        let Some(first) = rows.first().map(|r| r.id) else {
            return Ok(None);
        };
        if matches > 1 {
            if self.config.ambiguous_key_policy == AmbiguousKeyPolicy::Reject {
                return Err(EngineError::AmbiguousBusinessKey {
                    kind,
                    key: key.to_string(),
                    matches,
                });
            }
            warn!(%kind, key, matches, id = %first, "ambiguous business key, taking lowest id");
        }
        for row in rows {
            self.identity.track(row);
        }
        Ok(Some(first))
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Load a row as a node, with its full graph when `load_graph` is set.
    pub(crate) fn fetch(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        load_graph: bool,
    ) -> Result<Option<Node>, EngineError> {
        if self.load(kind, id)?.is_none() {
            return Ok(None);
        }
        let mut path = Vec::new();
        self.materialize(kind, id, load_graph, &mut path).map(Some)
    }

    fn materialize(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        load_graph: bool,
        path: &mut Vec<(EntityKind, EntityId)>,
    ) -> Result<Node, EngineError> {
        let row = self.require(kind, id)?;
        let mut node = row.to_node();
        if !load_graph {
            return Ok(node);
        }
        path.push((kind, id));
        for rel in kind.schema().relations.iter().filter(|r| r.graph) {
            let ids = self.related_ids(kind, id, rel)?;
            let mut members = Vec::with_capacity(ids.len());
            for target in ids {
                let member = if path.contains(&(rel.target, target)) {
                    self.require(rel.target, target)?.to_node()
                } else {
                    self.materialize(rel.target, target, true, path)?
                };
                members.push(member);
            }
            if rel.is_collection() {
                node.many.insert(rel.name, members);
            } else if let Some(member) = members.pop() {
                node.one.insert(rel.name, Box::new(member));
            }
        }
        path.pop();
        Ok(node)
    }
}
