//! Versioned SQLite schema for the workflow store.
//!
//! The schema version is stamped into `PRAGMA user_version` at creation and
//! checked on every open; the expected table shapes are validated against
//! `PRAGMA table_info` so a mismatched database fails fast at startup
//! instead of corrupting step records later.

use anyhow::{bail, Result};
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 1;

/// Expected column shape: (name, sql type, non-null, primary-key position).
type ColumnSpec = (&'static str, &'static str, bool, bool);

struct TableSpec {
    name: &'static str,
    create_sql: &'static str,
    columns: &'static [ColumnSpec],
}

const INVOCATIONS: TableSpec = TableSpec {
    name: "invocations",
    create_sql: "CREATE TABLE invocations (
        id TEXT PRIMARY KEY,
        workflow TEXT NOT NULL,
        input TEXT NOT NULL,
        status TEXT NOT NULL,
        output TEXT,
        error TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    columns: &[
        ("id", "TEXT", false, true),
        ("workflow", "TEXT", true, false),
        ("input", "TEXT", true, false),
        ("status", "TEXT", true, false),
        ("output", "TEXT", false, false),
        ("error", "TEXT", false, false),
        ("attempts", "INTEGER", true, false),
        ("created_at", "INTEGER", true, false),
        ("updated_at", "INTEGER", true, false),
    ],
};

const STEPS: TableSpec = TableSpec {
    name: "steps",
    create_sql: "CREATE TABLE steps (
        invocation_id TEXT NOT NULL REFERENCES invocations(id) ON DELETE CASCADE,
        step_index INTEGER NOT NULL,
        name TEXT NOT NULL,
        output TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (invocation_id, step_index)
    )",
    columns: &[
        ("invocation_id", "TEXT", true, true),
        ("step_index", "INTEGER", true, true),
        ("name", "TEXT", true, false),
        ("output", "TEXT", true, false),
        ("created_at", "INTEGER", true, false),
    ],
};

const TABLES: &[&TableSpec] = &[&INVOCATIONS, &STEPS];

const INDICES: &[(&str, &str)] = &[("idx_invocations_status", "invocations(status)")];

/// Create all tables and stamp the schema version.
pub fn create(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON;", [])?;
    for table in TABLES {
        conn.execute(table.create_sql, [])?;
    }
    for (index_name, target) in INDICES {
        conn.execute(&format!("CREATE INDEX {} ON {};", index_name, target), [])?;
    }
    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
    Ok(())
}

/// Validate an existing database against the expected schema.
pub fn validate(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        bail!(
            "workflow database schema version {} is not supported (expected {})",
            version,
            SCHEMA_VERSION
        );
    }

    for table in TABLES {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", table.name))?;
        let actual: Vec<(String, String, bool, bool)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i32>(3)? == 1,
                    row.get::<_, i32>(5)? >= 1,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        if actual.len() != table.columns.len() {
            bail!(
                "table {} has {} columns, expected {}",
                table.name,
                actual.len(),
                table.columns.len()
            );
        }

        for ((name, sql_type, non_null, is_pk), expected) in
            actual.iter().zip(table.columns.iter())
        {
            if name != expected.0 {
                bail!(
                    "table {} column name mismatch: expected {}, got {}",
                    table.name,
                    expected.0,
                    name
                );
            }
            if sql_type != expected.1 {
                bail!(
                    "table {} column {} type mismatch: expected {}, got {}",
                    table.name,
                    name,
                    expected.1,
                    sql_type
                );
            }
            if *non_null != expected.2 {
                bail!(
                    "table {} column {} non-null mismatch: expected {}, got {}",
                    table.name,
                    name,
                    expected.2,
                    non_null
                );
            }
            if *is_pk != expected.3 {
                bail!(
                    "table {} column {} primary key mismatch: expected {}, got {}",
                    table.name,
                    name,
                    expected.3,
                    is_pk
                );
            }
        }
    }

    for (index_name, _target) in INDICES {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1",
                [index_name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if !exists {
            bail!("workflow database is missing index '{}'", index_name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_validate() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        validate(&conn).unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_version() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn).unwrap();
        conn.execute("PRAGMA user_version = 42", []).unwrap();

        let err = validate(&conn).unwrap_err().to_string();
        assert!(err.contains("schema version 42"));
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE invocations (id TEXT PRIMARY KEY, workflow TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(STEPS.create_sql, []).unwrap();
        conn.execute("CREATE INDEX idx_invocations_status ON invocations(workflow)", [])
            .unwrap();
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])
            .unwrap();

        let err = validate(&conn).unwrap_err().to_string();
        assert!(err.contains("columns"));
    }

    #[test]
    fn test_validate_rejects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(INVOCATIONS.create_sql, []).unwrap();
        conn.execute(STEPS.create_sql, []).unwrap();
        conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])
            .unwrap();

        let err = validate(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
    }
}
