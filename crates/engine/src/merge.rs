use scimeta_core::{CoreError, FieldType, FieldValue, Node};
use scimeta_storage::RowRecord;
use tracing::debug;

/// Patch the non-null scalars of `incoming` onto `row`.
///
/// Every incoming field is validated before anything is applied; one bad
/// field rejects the whole merge. Business-key fields that are already set
/// on `row` are never overwritten. Returns whether `row` changed.
pub fn merge_scalars(incoming: &Node, row: &mut RowRecord) -> Result<bool, CoreError> {
    let schema = incoming.schema();
    schema.validate(incoming.fields.iter())?;

    let mut changed = false;
    for (name, value) in &incoming.fields {
        if value.is_null() {
            continue;
        }
        if schema.is_key_field(name) && row.field(name).is_some() {
            if row.field(name) != Some(value) {
                debug!(
                    kind = %row.kind,
                    id = %row.id,
                    field = *name,
                    "ignoring change to key field"
                );
            }
            continue;
        }
        let value = normalize(schema.field(name).map(|f| f.ty), value);
        if row.fields.get(name) != Some(&value) {
            row.fields.insert(*name, value);
            changed = true;
        }
    }
    Ok(changed)
}

/// Integers supplied for float columns are stored as floats.
pub(crate) fn normalize(ty: Option<FieldType>, value: &FieldValue) -> FieldValue {
    match (ty, value) {
        (Some(FieldType::Float), FieldValue::Integer(n)) => FieldValue::Float(*n as f64),
        _ => value.clone(),
    }
}
