pub mod catalog;
pub mod copy;
pub mod entity;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod keys;
pub mod model;
pub mod node;
pub mod schema;

pub use entity::{Entity, Rel, Related};
pub use error::CoreError;
pub use field_value::{FieldValue, Scalar, Timestamp};
pub use ids::*;
pub use model::*;
pub use node::Node;
pub use schema::{
    BusinessKey, EntityKind, EntitySchema, FieldDef, FieldType, JoinTable, KeyGen, OnDelete,
    RelationDef, RelationKind,
};
