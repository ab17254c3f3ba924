use std::collections::BTreeSet;

use rusqlite::Connection;
use scimeta_core::{BusinessKey, EntitySchema, JoinTable, RelationKind, catalog};

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(&schema_sql())?;
    Ok(())
}

/// Full DDL for the catalog: one table per entity type, one per join table.
pub fn schema_sql() -> String {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());
",
    );
    for schema in catalog::all() {
        sql.push_str(&entity_table_sql(schema));
    }
    let mut seen = BTreeSet::new();
    for schema in catalog::all() {
        for rel in schema.relations {
            if let RelationKind::ManyToMany(join) = rel.kind {
                if seen.insert(join.table) {
                    sql.push_str(&join_table_sql(&join, schema.table, rel.target.schema().table));
                }
            }
        }
    }
    sql
}

pub fn entity_table_sql(schema: &EntitySchema) -> String {
    let mut columns = vec![
        "    id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "    version INTEGER NOT NULL DEFAULT 0".to_string(),
    ];
    for field in schema.fields {
        columns.push(format!("    \"{}\" {}", field.name, field.ty.sql_type()));
    }
    for (rel, column) in schema.to_one_relations() {
        columns.push(format!(
            "    \"{column}\" INTEGER REFERENCES \"{}\"(id)",
            rel.target.schema().table
        ));
    }
    match schema.key {
        BusinessKey::Unique { fields, .. } => {
            columns.push(format!("    UNIQUE ({})", quoted(fields.iter().copied())));
        }
        BusinessKey::Scoped { scope, fields } => {
            if let Some((_, column)) = schema.to_one_relations().find(|(r, _)| r.name == scope) {
                let all = std::iter::once(column).chain(fields.iter().copied());
                columns.push(format!("    UNIQUE ({})", quoted(all)));
            }
        }
        BusinessKey::SharedOutput { .. } | BusinessKey::SurrogateOnly => {}
    }

    let mut sql = format!(
        "\nCREATE TABLE IF NOT EXISTS \"{}\" (\n{}\n);\n",
        schema.table,
        columns.join(",\n")
    );
    for (_, column) in schema.to_one_relations() {
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_{column}\" ON \"{table}\" (\"{column}\");\n",
            table = schema.table
        ));
    }
    sql
}

pub fn join_table_sql(join: &JoinTable, owner_table: &str, target_table: &str) -> String {
    format!(
        "
CREATE TABLE IF NOT EXISTS \"{table}\" (
    \"{owner}\" INTEGER NOT NULL REFERENCES \"{owner_table}\"(id),
    \"{target}\" INTEGER NOT NULL REFERENCES \"{target_table}\"(id),
    PRIMARY KEY (\"{owner}\", \"{target}\")
);
CREATE INDEX IF NOT EXISTS \"idx_{table}_{target}\" ON \"{table}\" (\"{target}\");
",
        table = join.table,
        owner = join.owner_column,
        target = join.target_column,
    )
}

fn quoted<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_table_has_key_and_foreign_keys() {
        let sql = entity_table_sql(&catalog::DEVICE);
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"device\""));
        assert!(sql.contains("\"uuid\" TEXT"));
        assert!(sql.contains("\"person_id\" INTEGER REFERENCES \"person\"(id)"));
        assert!(sql.contains("UNIQUE (\"uuid\")"));
        assert!(sql.contains("idx_device_device_type_id"));
    }

    #[test]
    fn scoped_key_is_unique_within_scope() {
        let sql = entity_table_sql(&catalog::RECORD_VARIABLE);
        assert!(sql.contains("UNIQUE (\"record_description_id\", \"name\")"));
    }

    #[test]
    fn producer_has_no_unique_constraint() {
        let sql = entity_table_sql(&catalog::DATA_PRODUCER);
        assert!(!sql.contains("UNIQUE"));
        assert!(sql.contains("\"parent_id\" INTEGER REFERENCES \"data_producer\"(id)"));
    }

    #[test]
    fn shared_join_table_is_created_once() {
        let sql = schema_sql();
        assert_eq!(
            sql.matches("CREATE TABLE IF NOT EXISTS \"data_producer_input\"").count(),
            1
        );
        assert_eq!(
            sql.matches("CREATE TABLE IF NOT EXISTS \"person_user_group\"").count(),
            1
        );
    }

    #[test]
    fn ddl_executes() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name != 'sqlite_sequence'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        // 20 entity tables, 12 join tables, schema_version
        assert_eq!(tables, 33);
    }
}
