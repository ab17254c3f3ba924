//! Business-key equality and the compensating key generator.

use crate::field_value::{FieldValue, Timestamp};
use crate::ids::time_uuid;
use crate::node::Node;
use crate::schema::{BusinessKey, KeyGen};

/// Whether two detached nodes denote the same real-world entity.
///
/// A complete business key on both sides decides; otherwise both surrogate
/// ids must be present and equal.
pub fn same_entity(a: &Node, b: &Node) -> bool {
    if a.kind != b.kind {
        return false;
    }
    let by_id = matches!((a.id, b.id), (Some(x), Some(y)) if x == y);
    match a.schema().key {
        BusinessKey::Unique { fields, fallback } => {
            if let (Some(ka), Some(kb)) = (key_text(a, fields), key_text(b, fields)) {
                return ka == kb;
            }
            if !fallback.is_empty() {
                if let (Some(ka), Some(kb)) = (key_text(a, fallback), key_text(b, fallback)) {
                    return ka == kb;
                }
            }
            by_id
        }
        BusinessKey::Scoped { scope, fields } => {
            let scopes = (a.one.get(scope), b.one.get(scope));
            match (key_text(a, fields), key_text(b, fields), scopes) {
                (Some(ka), Some(kb), (Some(sa), Some(sb))) => ka == kb && same_entity(sa, sb),
                _ => by_id,
            }
        }
        BusinessKey::SharedOutput { type_field, outputs } => {
            let (oa, ob) = (
                a.many.get(outputs).filter(|o| !o.is_empty()),
                b.many.get(outputs).filter(|o| !o.is_empty()),
            );
            match (oa, ob) {
                (Some(oa), Some(ob)) => {
                    a.field(type_field) == b.field(type_field)
                        && oa.iter().any(|x| ob.iter().any(|y| same_entity(x, y)))
                }
                _ => by_id,
            }
        }
        BusinessKey::SurrogateOnly => by_id,
    }
}

/// `field=value|field=value` over `fields`, or `None` if any is missing.
/// A missing nullable key part is written as `field=<null>`.
pub fn key_text(node: &Node, fields: &[&'static str]) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let schema = node.schema();
    let mut parts = Vec::with_capacity(fields.len());
    for name in fields {
        match node.field(name).filter(|v| !is_blank(v)) {
            Some(value) => parts.push(format!("{name}={value}")),
            None if schema.field(name).is_some_and(|f| f.nullable_key) => {
                parts.push(format!("{name}=<null>"));
            }
            None => return None,
        }
    }
    Some(parts.join("|"))
}

fn is_blank(value: &FieldValue) -> bool {
    value.is_null() || value.as_text().is_some_and(str::is_empty)
}

/// `<UTC millis>_<random u32>`
pub fn unique_suffix() -> String {
    format!("{}_{}", Timestamp::now().as_millis(), rand::random::<u32>())
}

/// Fill every generated field that is missing (or blank) on `node`, in
/// rule order. Returns the fields written.
pub fn generate_missing(node: &mut Node, uri_base: &str) -> Vec<(&'static str, FieldValue)> {
    let mut written = Vec::new();
    for rule in node.schema().generated {
        let field = rule.field();
        let current = node.fields.get(field);
        let missing = current.is_none_or(is_blank);
        let replace = match rule {
            KeyGen::Default { .. } => {
                missing || !choice_is_valid(node, field, current)
            }
            _ => missing,
        };
        if !replace {
            continue;
        }
        let value = FieldValue::Text(generated_value(node, rule, uri_base));
        node.fields.insert(field, value.clone());
        written.push((field, value));
    }
    written
}

fn choice_is_valid(node: &Node, field: &str, value: Option<&FieldValue>) -> bool {
    let Some(def) = node.schema().field(field) else {
        return true;
    };
    match value.and_then(FieldValue::as_text) {
        Some(text) => def.choices.is_empty() || def.choices.iter().any(|c| *c == text),
        None => true,
    }
}

fn generated_value(node: &Node, rule: &KeyGen, uri_base: &str) -> String {
    match *rule {
        KeyGen::Suffixed { prefix, .. } => format!("{prefix}_{}", unique_suffix()),
        KeyGen::FromField { source, .. } => {
            let base = node.text(source).unwrap_or(node.kind.as_str());
            format!("{base}_{}", unique_suffix())
        }
        KeyGen::TimeUuid { .. } => time_uuid(),
        KeyGen::Default { value, .. } => value.to_string(),
        KeyGen::Uri { path, segment, .. } => {
            let segment = segment.and_then(|s| node.text(s)).unwrap_or_default();
            format!(
                "{}{path}{segment}/{}",
                uri_base.trim_end_matches('/'),
                unique_suffix()
            )
        }
        KeyGen::Username {
            email, first, last, ..
        } => {
            let local = node
                .text(email)
                .and_then(|e| e.split_once('@').map(|(local, _)| local))
                .filter(|local| !local.is_empty());
            if let Some(local) = local {
                return local.to_string();
            }
            let name: String = [node.text(first), node.text(last)]
                .into_iter()
                .flatten()
                .collect();
            if name.is_empty() {
                "guest".to_string()
            } else {
                name
            }
        }
    }
}
