use std::collections::BTreeMap;

use crate::field_value::FieldValue;
use crate::ids::EntityId;
use crate::schema::{EntityKind, EntitySchema};

/// Type-erased view of one detached entity and the part of its graph the
/// caller supplied. Absent keys mean "no opinion": an absent scalar is never
/// written, an absent relation is never touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: EntityKind,
    pub id: Option<EntityId>,
    pub version: Option<i64>,
    pub fields: BTreeMap<&'static str, FieldValue>,
    pub one: BTreeMap<&'static str, Box<Node>>,
    pub many: BTreeMap<&'static str, Vec<Node>>,
}

impl Node {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            id: None,
            version: None,
            fields: BTreeMap::new(),
            one: BTreeMap::new(),
            many: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.kind.schema()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_text)
    }

    /// Human-readable summary in the form `Kind<d>id=..<d>field=value..`,
    /// used as the before/after text of change notifications.
    pub fn summary(&self, delimiter: &str) -> String {
        let mut out = String::from(self.kind.as_str());
        if let Some(id) = self.id {
            out.push_str(delimiter);
            out.push_str(&format!("id={id}"));
        }
        for def in self.schema().fields {
            if let Some(value) = self.field(def.name) {
                out.push_str(delimiter);
                out.push_str(&format!("{}={value}", def.name));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_follows_schema_order_and_skips_nulls() {
        let mut node = Node::new(EntityKind::Device);
        node.id = Some(EntityId::from_raw(7));
        node.fields.insert("name", FieldValue::Text("CTD-1".into()));
        node.fields.insert("uuid", FieldValue::Text("abc-123".into()));
        node.fields.insert("description", FieldValue::Null);
        assert_eq!(node.summary("|"), "Device|id=7|uuid=abc-123|name=CTD-1");
    }
}
