use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

use crate::ids::EntityId;
use crate::node::Node;
use crate::schema::{EntityKind, EntitySchema, RelationDef};

/// A detached, strongly-typed metadata entity.
pub trait Entity: Clone + fmt::Debug + Sized {
    const KIND: EntityKind;

    fn id(&self) -> Option<EntityId>;

    fn to_node(&self) -> Node;

    fn from_node(node: &Node) -> Self;

    fn schema() -> &'static EntitySchema {
        Self::KIND.schema()
    }

    /// Identity-cleared copy of this entity and the relationships its type
    /// marks for copying. Never touches the store.
    fn deep_copy(&self) -> Self {
        Self::from_node(&crate::copy::deep_copy(&self.to_node()))
    }

    /// Business-key equality, independent of the surrogate id where the key
    /// is complete.
    fn same_entity(&self, other: &Self) -> bool {
        crate::keys::same_entity(&self.to_node(), &other.to_node())
    }

    fn summary(&self) -> String {
        self.to_node().summary("|")
    }
}

/// A to-many relationship on a detached entity.
///
/// An unloaded collection means the caller has no opinion about its
/// contents; reconciliation leaves the persistent side alone. A loaded
/// collection (even an empty one) is reconciled additively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Related<T>(Option<Vec<T>>);

impl<T> Default for Related<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Related<T> {
    pub fn unloaded() -> Self {
        Self(None)
    }

    pub fn loaded(items: Vec<T>) -> Self {
        Self(Some(items))
    }

    pub fn is_loaded(&self) -> bool {
        self.0.is_some()
    }

    pub fn as_slice(&self) -> Option<&[T]> {
        self.0.as_deref()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.as_deref().unwrap_or(&[]).iter()
    }

    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append, marking the collection as loaded.
    pub fn push(&mut self, item: T) {
        self.0.get_or_insert_with(Vec::new).push(item);
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.0.as_mut().and_then(|items| items.get_mut(index))
    }
}

impl<T> From<Option<Vec<T>>> for Related<T> {
    fn from(items: Option<Vec<T>>) -> Self {
        Self(items)
    }
}

impl<T> From<Vec<T>> for Related<T> {
    fn from(items: Vec<T>) -> Self {
        Self(Some(items))
    }
}

/// Compile-time handle on relationship `name` from `T` to `U`.
pub struct Rel<T, U> {
    name: &'static str,
    _types: PhantomData<fn() -> (T, U)>,
}

impl<T, U> Rel<T, U> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _types: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Entity, U: Entity> Rel<T, U> {
    pub fn def(&self) -> Option<&'static RelationDef> {
        T::schema().relation(self.name)
    }
}

impl<T, U> Clone for Rel<T, U> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, U> Copy for Rel<T, U> {}

impl<T, U> fmt::Debug for Rel<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rel({})", self.name)
    }
}
