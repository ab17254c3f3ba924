use std::collections::BTreeMap;

use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Row, params_from_iter};
use scimeta_core::{
    CoreError, EntityId, EntityKind, EntitySchema, FieldType, FieldValue, JoinTable, RelationKind,
};
use tracing::debug;

use crate::error::StorageError;
use crate::traits::{Criterion, Order, RowRecord, Storage};

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn select(
        &self,
        schema: &'static EntitySchema,
        clause: &str,
        params: Vec<Value>,
    ) -> Result<Vec<RowRecord>, StorageError> {
        let sql = format!("SELECT {} FROM \"{}\"{clause}", select_columns(schema), schema.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| read_row(schema, row))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Distinguish a stale version from a missing row after a guarded write
    /// touched nothing.
    fn guard_failure(
        &self,
        schema: &'static EntitySchema,
        id: EntityId,
        expected: i64,
    ) -> StorageError {
        let exists = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM \"{}\" WHERE id = ?1", schema.table),
                [id.as_raw()],
                |_| Ok(()),
            )
            .is_ok();
        if exists {
            StorageError::VersionConflict {
                table: schema.table,
                id,
                expected,
            }
        } else {
            StorageError::NotFound(format!("{} {id}", schema.kind))
        }
    }
}

fn select_columns(schema: &EntitySchema) -> String {
    let mut columns = vec!["id".to_string(), "version".to_string()];
    columns.extend(schema.fields.iter().map(|f| format!("\"{}\"", f.name)));
    columns.extend(schema.to_one_relations().map(|(_, c)| format!("\"{c}\"")));
    columns.join(", ")
}

fn read_row(schema: &'static EntitySchema, row: &Row) -> rusqlite::Result<RowRecord> {
    let mut fields = BTreeMap::new();
    let mut idx = 2;
    for def in schema.fields {
        fields.insert(def.name, read_value(row, idx, def.ty)?);
        idx += 1;
    }
    let mut refs = BTreeMap::new();
    for (rel, _) in schema.to_one_relations() {
        if let Some(raw) = row.get::<_, Option<i64>>(idx)? {
            refs.insert(rel.name, EntityId::from_raw(raw));
        }
        idx += 1;
    }
    Ok(RowRecord {
        kind: schema.kind,
        id: EntityId::from_raw(row.get(0)?),
        version: row.get(1)?,
        fields,
        refs,
    })
}

fn read_value(row: &Row, idx: usize, ty: FieldType) -> rusqlite::Result<FieldValue> {
    if let ValueRef::Null = row.get_ref(idx)? {
        return Ok(FieldValue::Null);
    }
    Ok(match ty {
        FieldType::Text => FieldValue::Text(row.get(idx)?),
        FieldType::Integer => FieldValue::Integer(row.get(idx)?),
        FieldType::Float => FieldValue::Float(row.get(idx)?),
        FieldType::Boolean => FieldValue::Boolean(row.get(idx)?),
        FieldType::Timestamp => FieldValue::Timestamp(row.get(idx)?),
    })
}

fn to_sql(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(n) | FieldValue::Timestamp(n) => Value::Integer(*n),
        FieldValue::Float(n) => Value::Real(*n),
        FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
    }
}

fn ref_column(schema: &EntitySchema, relation: &str) -> Result<&'static str, StorageError> {
    match schema.relation(relation).map(|r| r.kind) {
        Some(RelationKind::ToOne { column }) => Ok(column),
        _ => Err(StorageError::Core(CoreError::UnknownField {
            kind: schema.kind,
            name: relation.to_string(),
        })),
    }
}

fn field_column(schema: &EntitySchema, field: &str) -> Result<&'static str, StorageError> {
    schema
        .field(field)
        .map(|f| f.name)
        .ok_or_else(|| {
            StorageError::Core(CoreError::UnknownField {
                kind: schema.kind,
                name: field.to_string(),
            })
        })
}

impl Storage for SqliteStorage {
    fn begin(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn get(&self, kind: EntityKind, id: EntityId) -> Result<Option<RowRecord>, StorageError> {
        let params = vec![Value::Integer(id.as_raw())];
        let mut rows = self.select(kind.schema(), " WHERE id = ?1", params)?;
        Ok(rows.pop())
    }

    fn find(
        &self,
        kind: EntityKind,
        criteria: &[Criterion],
        order: Order,
    ) -> Result<Vec<RowRecord>, StorageError> {
        let schema = kind.schema();
        let mut predicates = Vec::with_capacity(criteria.len());
        let mut params = Vec::new();
        for criterion in criteria {
            match criterion {
                Criterion::Field(name, FieldValue::Null) => {
                    predicates.push(format!("\"{}\" IS NULL", field_column(schema, name)?));
                }
                Criterion::Field(name, value) => {
                    params.push(to_sql(value));
                    let column = field_column(schema, name)?;
                    predicates.push(format!("\"{column}\" = ?{}", params.len()));
                }
                Criterion::Ref(relation, id) => {
                    params.push(Value::Integer(id.as_raw()));
                    let column = ref_column(schema, relation)?;
                    predicates.push(format!("\"{column}\" = ?{}", params.len()));
                }
            }
        }
        let mut clause = String::new();
        if !predicates.is_empty() {
            clause.push_str(" WHERE ");
            clause.push_str(&predicates.join(" AND "));
        }
        clause.push_str(match order {
            Order::IdAsc => " ORDER BY id ASC",
            Order::IdDesc => " ORDER BY id DESC",
        });
        self.select(schema, &clause, params)
    }

    fn count(&self, kind: EntityKind) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", kind.schema().table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn ids(&self, kind: EntityKind) -> Result<Vec<EntityId>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id FROM \"{}\" ORDER BY id", kind.schema().table))?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0).map(EntityId::from_raw))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert(
        &mut self,
        kind: EntityKind,
        fields: &BTreeMap<&'static str, FieldValue>,
        refs: &BTreeMap<&'static str, EntityId>,
    ) -> Result<EntityId, StorageError> {
        let schema = kind.schema();
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (name, value) in fields {
            columns.push(format!("\"{}\"", field_column(schema, name)?));
            params.push(to_sql(value));
        }
        for (relation, id) in refs {
            columns.push(format!("\"{}\"", ref_column(schema, relation)?));
            params.push(Value::Integer(id.as_raw()));
        }
        let sql = if columns.is_empty() {
            format!("INSERT INTO \"{}\" DEFAULT VALUES", schema.table)
        } else {
            let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
            format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                schema.table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        self.conn
            .execute(&sql, params_from_iter(params))
            .map_err(StorageError::from_write)?;
        let id = EntityId::from_raw(self.conn.last_insert_rowid());
        debug!(table = schema.table, %id, "inserted");
        Ok(id)
    }

    fn update(&mut self, row: &RowRecord) -> Result<i64, StorageError> {
        let schema = row.kind.schema();
        let mut assignments = vec!["version = version + 1".to_string()];
        let mut params = Vec::new();
        for def in schema.fields {
            params.push(row.fields.get(def.name).map_or(Value::Null, to_sql));
            assignments.push(format!("\"{}\" = ?{}", def.name, params.len()));
        }
        for (rel, column) in schema.to_one_relations() {
            params.push(
                row.refs
                    .get(rel.name)
                    .map_or(Value::Null, |id| Value::Integer(id.as_raw())),
            );
            assignments.push(format!("\"{column}\" = ?{}", params.len()));
        }
        params.push(Value::Integer(row.id.as_raw()));
        params.push(Value::Integer(row.version));
        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE id = ?{} AND version = ?{}",
            schema.table,
            assignments.join(", "),
            params.len() - 1,
            params.len()
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(StorageError::from_write)?;
        if changed == 0 {
            return Err(self.guard_failure(schema, row.id, row.version));
        }
        Ok(row.version + 1)
    }

    fn delete(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        expected_version: i64,
    ) -> Result<(), StorageError> {
        let schema = kind.schema();
        let changed = self
            .conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE id = ?1 AND version = ?2", schema.table),
                [id.as_raw(), expected_version],
            )
            .map_err(StorageError::from_write)?;
        if changed == 0 {
            return Err(self.guard_failure(schema, id, expected_version));
        }
        debug!(table = schema.table, %id, "deleted");
        Ok(())
    }

    fn linked(&self, join: &JoinTable, owner: EntityId) -> Result<Vec<EntityId>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT \"{target}\" FROM \"{table}\" WHERE \"{owner}\" = ?1 ORDER BY \"{target}\"",
            target = join.target_column,
            table = join.table,
            owner = join.owner_column,
        ))?;
        let rows = stmt.query_map([owner.as_raw()], |row| {
            row.get::<_, i64>(0).map(EntityId::from_raw)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn link(
        &mut self,
        join: &JoinTable,
        owner: EntityId,
        target: EntityId,
    ) -> Result<bool, StorageError> {
        let inserted = self
            .conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO \"{}\" (\"{}\", \"{}\") VALUES (?1, ?2)",
                    join.table, join.owner_column, join.target_column
                ),
                [owner.as_raw(), target.as_raw()],
            )
            .map_err(StorageError::from_write)?;
        Ok(inserted > 0)
    }

    fn unlink(
        &mut self,
        join: &JoinTable,
        owner: EntityId,
        target: EntityId,
    ) -> Result<bool, StorageError> {
        let removed = self.conn.execute(
            &format!(
                "DELETE FROM \"{}\" WHERE \"{}\" = ?1 AND \"{}\" = ?2",
                join.table, join.owner_column, join.target_column
            ),
            [owner.as_raw(), target.as_raw()],
        )?;
        Ok(removed > 0)
    }

    fn unlink_all(&mut self, join: &JoinTable, owner: EntityId) -> Result<usize, StorageError> {
        let removed = self.conn.execute(
            &format!(
                "DELETE FROM \"{}\" WHERE \"{}\" = ?1",
                join.table, join.owner_column
            ),
            [owner.as_raw()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scimeta_core::catalog;

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    fn device_fields(uuid: &str) -> BTreeMap<&'static str, FieldValue> {
        BTreeMap::from([("uuid", text(uuid)), ("name", text("CTD-1"))])
    }

    #[test]
    fn insert_get_and_update_bump_version() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        let id = store
            .insert(EntityKind::Device, &device_fields("abc-123"), &BTreeMap::new())
            .unwrap();

        let mut row = store.get(EntityKind::Device, id).unwrap().unwrap();
        assert_eq!(row.version, 0);
        assert_eq!(row.text("uuid"), Some("abc-123"));
        assert_eq!(row.field("description"), None);

        row.fields.insert("description", text("profiling CTD"));
        assert_eq!(store.update(&row).unwrap(), 1);

        let reread = store.get(EntityKind::Device, id).unwrap().unwrap();
        assert_eq!(reread.version, 1);
        assert_eq!(reread.text("description"), Some("profiling CTD"));
    }

    #[test]
    fn stale_update_is_a_version_conflict() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        let id = store
            .insert(EntityKind::Device, &device_fields("abc-123"), &BTreeMap::new())
            .unwrap();
        let row = store.get(EntityKind::Device, id).unwrap().unwrap();
        store.update(&row).unwrap();

        let err = store.update(&row).unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { expected: 0, .. }));
        let err = store.delete(EntityKind::Device, id, 0).unwrap_err();
        assert!(matches!(err, StorageError::VersionConflict { .. }));
        store.delete(EntityKind::Device, id, 1).unwrap();
        assert!(store.get(EntityKind::Device, id).unwrap().is_none());
    }

    #[test]
    fn duplicate_unique_key_is_a_constraint_violation() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        store
            .insert(EntityKind::Device, &device_fields("abc-123"), &BTreeMap::new())
            .unwrap();
        let err = store
            .insert(EntityKind::Device, &device_fields("abc-123"), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn find_by_field_and_reference() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        let device = store
            .insert(EntityKind::Device, &device_fields("abc-123"), &BTreeMap::new())
            .unwrap();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let fields = BTreeMap::from([("producer_type", text("Deployment"))]);
            let refs = BTreeMap::from([("device", device)]);
            ids.push(store.insert(EntityKind::DataProducer, &fields, &refs).unwrap());
        }
        store
            .insert(EntityKind::DataProducer, &BTreeMap::new(), &BTreeMap::new())
            .unwrap();

        let by_device = store
            .find(EntityKind::DataProducer, &[Criterion::Ref("device", device)], Order::IdAsc)
            .unwrap();
        assert_eq!(by_device.iter().map(|r| r.id).collect::<Vec<_>>(), ids);
        assert_eq!(by_device[0].refs.get("device"), Some(&device));

        let newest_first = store
            .find(
                EntityKind::DataProducer,
                &[Criterion::Field("producer_type", text("Deployment"))],
                Order::IdDesc,
            )
            .unwrap();
        assert_eq!(newest_first[0].id, ids[2]);

        let untyped = store
            .find(
                EntityKind::DataProducer,
                &[Criterion::Field("producer_type", FieldValue::Null)],
                Order::IdAsc,
            )
            .unwrap();
        assert_eq!(untyped.len(), 1);
        assert_eq!(store.count(EntityKind::DataProducer).unwrap(), 4);

        let unknown = store.find(
            EntityKind::DataProducer,
            &[Criterion::Ref("nonexistent", device)],
            Order::IdAsc,
        );
        assert!(matches!(unknown, Err(StorageError::Core(_))));
    }

    #[test]
    fn typed_columns_round_trip() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        let fields = BTreeMap::from([
            ("uri", text("http://x/1")),
            ("original", FieldValue::Boolean(true)),
            ("start_date", FieldValue::Timestamp(1_700_000_000_000)),
            ("min_latitude", FieldValue::Float(36.5)),
            ("number_of_records", FieldValue::Integer(42)),
        ]);
        let id = store
            .insert(EntityKind::DataContainer, &fields, &BTreeMap::new())
            .unwrap();
        let row = store.get(EntityKind::DataContainer, id).unwrap().unwrap();
        for (name, value) in &fields {
            assert_eq!(row.field(name), Some(value), "{name}");
        }
    }

    #[test]
    fn join_table_links_are_idempotent() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        let person = store
            .insert(
                EntityKind::Person,
                &BTreeMap::from([("username", text("jdoe"))]),
                &BTreeMap::new(),
            )
            .unwrap();
        let group = store
            .insert(
                EntityKind::UserGroup,
                &BTreeMap::from([("group_name", text("ops"))]),
                &BTreeMap::new(),
            )
            .unwrap();
        let Some(RelationKind::ManyToMany(join)) =
            catalog::PERSON.relation("user_groups").map(|r| r.kind)
        else {
            panic!("user_groups is many-to-many");
        };

        assert!(store.link(&join, person, group).unwrap());
        assert!(!store.link(&join, person, group).unwrap());
        assert_eq!(store.linked(&join, person).unwrap(), vec![group]);
        assert_eq!(store.linked(&join.reversed(), group).unwrap(), vec![person]);

        assert_eq!(store.unlink_all(&join.reversed(), group).unwrap(), 1);
        assert!(!store.unlink(&join, person, group).unwrap());
        assert!(store.linked(&join, person).unwrap().is_empty());
    }

    #[test]
    fn rollback_discards_writes() {
        let mut store = SqliteStorage::open_in_memory().unwrap();
        store.begin().unwrap();
        store
            .insert(EntityKind::Keyword, &BTreeMap::from([("name", text("ctd"))]), &BTreeMap::new())
            .unwrap();
        store.rollback().unwrap();
        assert_eq!(store.count(EntityKind::Keyword).unwrap(), 0);
    }

    #[test]
    fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        let path = path.to_str().unwrap();
        let id = {
            let mut store = SqliteStorage::open(path).unwrap();
            store
                .insert(
                    EntityKind::Keyword,
                    &BTreeMap::from([("name", text("ctd"))]),
                    &BTreeMap::new(),
                )
                .unwrap()
        };
        let store = SqliteStorage::open(path).unwrap();
        assert_eq!(
            store
                .get(EntityKind::Keyword, id)
                .unwrap()
                .and_then(|r| r.text("name").map(str::to_owned)),
            Some("ctd".to_string())
        );
    }
}
