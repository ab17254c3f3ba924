//! Static metadata describing every entity type: its table, scalar columns,
//! business-key rule, key-generation rules and relationships.
//!
//! The reconciliation engine is written once against these descriptors
//! instead of once per entity type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::field_value::FieldValue;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    UserGroup,
    DeviceType,
    Device,
    Software,
    ResourceType,
    Resource,
    Keyword,
    Event,
    DataProducerGroup,
    DataContainerGroup,
    StandardUnit,
    StandardVariable,
    StandardKeyword,
    StandardReferenceScale,
    HeaderDescription,
    RecordDescription,
    RecordVariable,
    DataContainer,
    DataProducer,
}

impl EntityKind {
    pub const ALL: [EntityKind; 20] = [
        EntityKind::Person,
        EntityKind::UserGroup,
        EntityKind::DeviceType,
        EntityKind::Device,
        EntityKind::Software,
        EntityKind::ResourceType,
        EntityKind::Resource,
        EntityKind::Keyword,
        EntityKind::Event,
        EntityKind::DataProducerGroup,
        EntityKind::DataContainerGroup,
        EntityKind::StandardUnit,
        EntityKind::StandardVariable,
        EntityKind::StandardKeyword,
        EntityKind::StandardReferenceScale,
        EntityKind::HeaderDescription,
        EntityKind::RecordDescription,
        EntityKind::RecordVariable,
        EntityKind::DataContainer,
        EntityKind::DataProducer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::UserGroup => "UserGroup",
            Self::DeviceType => "DeviceType",
            Self::Device => "Device",
            Self::Software => "Software",
            Self::ResourceType => "ResourceType",
            Self::Resource => "Resource",
            Self::Keyword => "Keyword",
            Self::Event => "Event",
            Self::DataProducerGroup => "DataProducerGroup",
            Self::DataContainerGroup => "DataContainerGroup",
            Self::StandardUnit => "StandardUnit",
            Self::StandardVariable => "StandardVariable",
            Self::StandardKeyword => "StandardKeyword",
            Self::StandardReferenceScale => "StandardReferenceScale",
            Self::HeaderDescription => "HeaderDescription",
            Self::RecordDescription => "RecordDescription",
            Self::RecordVariable => "RecordVariable",
            Self::DataContainer => "DataContainer",
            Self::DataProducer => "DataProducer",
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        crate::catalog::schema_of(*self)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer | Self::Boolean | Self::Timestamp => "INTEGER",
            Self::Float => "REAL",
        }
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (_, FieldValue::Null)
                | (Self::Text, FieldValue::Text(_))
                | (Self::Integer, FieldValue::Integer(_))
                | (Self::Float, FieldValue::Float(_))
                | (Self::Float, FieldValue::Integer(_))
                | (Self::Boolean, FieldValue::Boolean(_))
                | (Self::Timestamp, FieldValue::Timestamp(_))
        )
    }
}

/// One scalar column.
#[derive(Clone, Copy, Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub max_len: Option<usize>,
    pub choices: &'static [&'static str],
    pub range: Option<(f64, f64)>,
    /// Part of a composite business key that may legitimately be absent;
    /// absence then matches stored NULL instead of leaving the key incomplete.
    pub nullable_key: bool,
}

impl FieldDef {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            max_len: None,
            choices: &[],
            range: None,
            nullable_key: false,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub const fn float(name: &'static str) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub const fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    pub const fn one_of(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub const fn nullable_key(mut self) -> Self {
        self.nullable_key = true;
        self
    }

    /// Check a value against this column's type, length, choice and range
    /// constraints. Null always passes; required-ness is checked separately.
    pub fn check(&self, kind: EntityKind, value: &FieldValue) -> Result<(), CoreError> {
        if !self.ty.accepts(value) {
            return Err(CoreError::validation(
                kind,
                self.name,
                format!("expected {:?}, got {}", self.ty, value.type_name()),
            ));
        }
        if let FieldValue::Text(s) = value {
            if let Some(max) = self.max_len {
                if s.chars().count() > max {
                    return Err(CoreError::validation(
                        kind,
                        self.name,
                        format!("longer than {max} characters"),
                    ));
                }
            }
            if !self.choices.is_empty() && !self.choices.iter().any(|c| *c == s.as_str()) {
                return Err(CoreError::validation(
                    kind,
                    self.name,
                    format!("{s:?} is not one of {:?}", self.choices),
                ));
            }
        }
        if let (Some((min, max)), Some(n)) = (self.range, value.as_float()) {
            if !(min..=max).contains(&n) {
                return Err(CoreError::validation(
                    kind,
                    self.name,
                    format!("{n} outside [{min}, {max}]"),
                ));
            }
        }
        Ok(())
    }
}

/// A many-to-many join table, seen from the side that declares it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinTable {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub target_column: &'static str,
}

impl JoinTable {
    /// The same table seen from the other side.
    pub fn reversed(&self) -> JoinTable {
        JoinTable {
            table: self.table,
            owner_column: self.target_column,
            target_column: self.owner_column,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Foreign-key column on this entity's table.
    ToOne { column: &'static str },
    /// Inverse of a `ToOne` on the target; `inverse` names that relation.
    OneToMany,
    ManyToMany(JoinTable),
}

/// What happens to the members of a one-to-many collection, or the target
/// of an owned to-one reference, when the owner is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDelete {
    Nullify,
    Cascade,
}

#[derive(Clone, Copy, Debug)]
pub struct RelationDef {
    pub name: &'static str,
    pub target: EntityKind,
    pub kind: RelationKind,
    pub inverse: Option<&'static str>,
    /// Materialized by `resolve(.., load_graph = true)`.
    pub graph: bool,
    /// Followed by deep copy.
    pub deep_copy: bool,
    pub on_delete: OnDelete,
}

impl RelationDef {
    const fn new(name: &'static str, target: EntityKind, kind: RelationKind) -> Self {
        Self {
            name,
            target,
            kind,
            inverse: None,
            graph: false,
            deep_copy: false,
            on_delete: OnDelete::Nullify,
        }
    }

    pub const fn to_one(name: &'static str, column: &'static str, target: EntityKind) -> Self {
        Self::new(name, target, RelationKind::ToOne { column })
    }

    pub const fn one_to_many(
        name: &'static str,
        target: EntityKind,
        mapped_by: &'static str,
    ) -> Self {
        let mut rel = Self::new(name, target, RelationKind::OneToMany);
        rel.inverse = Some(mapped_by);
        rel
    }

    pub const fn many_to_many(
        name: &'static str,
        target: EntityKind,
        table: &'static str,
        owner_column: &'static str,
        target_column: &'static str,
    ) -> Self {
        Self::new(
            name,
            target,
            RelationKind::ManyToMany(JoinTable {
                table,
                owner_column,
                target_column,
            }),
        )
    }

    pub const fn inverse(mut self, name: &'static str) -> Self {
        self.inverse = Some(name);
        self
    }

    pub const fn graph(mut self) -> Self {
        self.graph = true;
        self
    }

    pub const fn copied(mut self) -> Self {
        self.deep_copy = true;
        self
    }

    pub const fn cascade(mut self) -> Self {
        self.on_delete = OnDelete::Cascade;
        self
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self.kind, RelationKind::ToOne { .. })
    }
}

/// How an entity is recognised independently of its surrogate id.
#[derive(Clone, Copy, Debug)]
pub enum BusinessKey {
    /// Exact match on all `fields`; when those are absent, the first row
    /// matching all `fallback` fields wins.
    Unique {
        fields: &'static [&'static str],
        fallback: &'static [&'static str],
    },
    /// Unique `fields` within the entity referenced by the `scope` relation.
    Scoped {
        scope: &'static str,
        fields: &'static [&'static str],
    },
    /// Same `type_field` value and at least one shared member of the
    /// `outputs` collection.
    SharedOutput {
        type_field: &'static str,
        outputs: &'static str,
    },
    /// No alternate key; only the surrogate id identifies the entity.
    SurrogateOnly,
}

impl BusinessKey {
    /// Scalar fields that form the key. These are never overwritten once set.
    pub fn key_fields(&self) -> &[&'static str] {
        match self {
            Self::Unique { fields, .. } | Self::Scoped { fields, .. } => fields,
            Self::SharedOutput { type_field, .. } => std::slice::from_ref(type_field),
            Self::SurrogateOnly => &[],
        }
    }
}

/// A compensating default applied to a field that is missing when an entity
/// is first inserted.
#[derive(Clone, Copy, Debug)]
pub enum KeyGen {
    /// `<prefix>_<suffix>`
    Suffixed { field: &'static str, prefix: &'static str },
    /// `<value of source>_<suffix>`
    FromField { field: &'static str, source: &'static str },
    /// Time-ordered UUID.
    TimeUuid { field: &'static str },
    /// Fixed value; also replaces a value outside the field's choices.
    Default { field: &'static str, value: &'static str },
    /// `<configured base><path><value of segment>/<suffix>`
    Uri {
        field: &'static str,
        path: &'static str,
        segment: Option<&'static str>,
    },
    /// Local part of `email`, else `first` + `last`, else `guest`.
    Username {
        field: &'static str,
        email: &'static str,
        first: &'static str,
        last: &'static str,
    },
}

impl KeyGen {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Suffixed { field, .. }
            | Self::FromField { field, .. }
            | Self::TimeUuid { field }
            | Self::Default { field, .. }
            | Self::Uri { field, .. }
            | Self::Username { field, .. } => field,
        }
    }
}

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub fields: &'static [FieldDef],
    pub relations: &'static [RelationDef],
    pub key: BusinessKey,
    pub generated: &'static [KeyGen],
    /// Field holding an address that user-facing notifications go to.
    pub contact: Option<&'static str>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_key_field(&self, name: &str) -> bool {
        self.key.key_fields().iter().any(|f| *f == name)
    }

    pub fn to_one_relations(&self) -> impl Iterator<Item = (&'static RelationDef, &'static str)> {
        self.relations.iter().filter_map(|r| match r.kind {
            RelationKind::ToOne { column } => Some((r, column)),
            _ => None,
        })
    }

    /// Validate every supplied scalar. The first violation aborts.
    pub fn validate<'a>(
        &self,
        fields: impl IntoIterator<Item = (&'a &'static str, &'a FieldValue)>,
    ) -> Result<(), CoreError> {
        for (name, value) in fields {
            let def = self.field(name).ok_or_else(|| CoreError::UnknownField {
                kind: self.kind,
                name: (*name).to_string(),
            })?;
            def.check(self.kind, value)?;
        }
        Ok(())
    }
}
