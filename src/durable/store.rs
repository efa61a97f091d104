//! Workflow invocation and step-record persistence.
//!
//! SQLite-backed storage for the durable runtime. Step records are written
//! before the next step begins (record-then-proceed), and a recorded step is
//! never overwritten: if two drivers race on the same invocation, the first
//! committed output is the canonical one and the loser reads it back.

use super::models::{Invocation, InvocationStatus, StepRecord};
use super::schema;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Trait for workflow state storage.
pub trait WorkflowStore: Send + Sync {
    // === Invocations ===

    /// Create a new invocation in `pending` state.
    fn create_invocation(
        &self,
        id: &str,
        workflow: &str,
        input: &serde_json::Value,
    ) -> Result<()>;

    /// Fetch an invocation by id.
    fn get_invocation(&self, id: &str) -> Result<Option<Invocation>>;

    /// Transition an invocation to `running` and count the attempt.
    fn mark_running(&self, id: &str) -> Result<()>;

    /// Record the final output and transition to `completed`.
    fn mark_completed(&self, id: &str, output: &serde_json::Value) -> Result<()>;

    /// Record the failure message and transition to `failed`.
    fn mark_failed(&self, id: &str, error: &str) -> Result<()>;

    /// List invocations that are not in a terminal state, oldest first.
    fn list_incomplete(&self) -> Result<Vec<Invocation>>;

    // === Step records ===

    /// Record a step output at `(invocation_id, step_index)`.
    ///
    /// If a record already exists at that position it is left untouched and
    /// the existing record is returned, so callers always observe the
    /// canonical output.
    fn record_step(
        &self,
        invocation_id: &str,
        step_index: u32,
        name: &str,
        output: &serde_json::Value,
    ) -> Result<StepRecord>;

    /// Fetch a recorded step, if any.
    fn get_step(&self, invocation_id: &str, step_index: u32) -> Result<Option<StepRecord>>;

    /// All recorded steps for an invocation, in index order.
    fn list_steps(&self, invocation_id: &str) -> Result<Vec<StepRecord>>;

    /// Number of recorded steps for an invocation.
    fn count_steps(&self, invocation_id: &str) -> Result<u32>;
}

/// SQLite-backed workflow store.
pub struct SqliteWorkflowStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWorkflowStore {
    /// Open an existing database or create a new one with the current schema.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = if path.exists() {
            let conn = Connection::open(path)
                .with_context(|| format!("Failed to open workflow database at {:?}", path))?;
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
            schema::validate(&conn)
                .with_context(|| format!("Workflow database at {:?} failed validation", path))?;
            conn
        } else {
            let conn = Connection::open(path)
                .with_context(|| format!("Failed to create workflow database at {:?}", path))?;
            schema::create(&conn)?;
            info!("Created new workflow database at {:?}", path);
            conn
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("workflow store mutex poisoned")
    }
}

fn row_to_invocation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invocation> {
    let status_str: String = row.get(3)?;
    let input_str: String = row.get(2)?;
    let output_str: Option<String> = row.get(4)?;
    Ok(Invocation {
        id: row.get(0)?,
        workflow: row.get(1)?,
        input: serde_json::from_str(&input_str).unwrap_or(serde_json::Value::Null),
        status: InvocationStatus::parse(&status_str).unwrap_or(InvocationStatus::Failed),
        output: output_str.and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get(5)?,
        attempts: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_step(row: &rusqlite::Row<'_>) -> rusqlite::Result<StepRecord> {
    let output_str: String = row.get(3)?;
    Ok(StepRecord {
        invocation_id: row.get(0)?,
        step_index: row.get(1)?,
        name: row.get(2)?,
        output: serde_json::from_str(&output_str).unwrap_or(serde_json::Value::Null),
        created_at: row.get(4)?,
    })
}

const INVOCATION_COLUMNS: &str =
    "id, workflow, input, status, output, error, attempts, created_at, updated_at";
const STEP_COLUMNS: &str = "invocation_id, step_index, name, output, created_at";

impl WorkflowStore for SqliteWorkflowStore {
    fn create_invocation(
        &self,
        id: &str,
        workflow: &str,
        input: &serde_json::Value,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.lock()
            .execute(
                "INSERT INTO invocations (id, workflow, input, status, attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
                params![
                    id,
                    workflow,
                    serde_json::to_string(input)?,
                    InvocationStatus::Pending.as_str(),
                    now
                ],
            )
            .with_context(|| format!("Failed to create invocation '{}'", id))?;
        Ok(())
    }

    fn get_invocation(&self, id: &str) -> Result<Option<Invocation>> {
        let conn = self.lock();
        let invocation = conn
            .query_row(
                &format!("SELECT {} FROM invocations WHERE id = ?1", INVOCATION_COLUMNS),
                params![id],
                row_to_invocation,
            )
            .optional()?;
        Ok(invocation)
    }

    fn mark_running(&self, id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let updated = self.lock().execute(
            "UPDATE invocations
             SET status = ?1, attempts = attempts + 1, updated_at = ?2
             WHERE id = ?3",
            params![InvocationStatus::Running.as_str(), now, id],
        )?;
        anyhow::ensure!(updated == 1, "invocation '{}' not found", id);
        Ok(())
    }

    fn mark_completed(&self, id: &str, output: &serde_json::Value) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let updated = self.lock().execute(
            "UPDATE invocations
             SET status = ?1, output = ?2, error = NULL, updated_at = ?3
             WHERE id = ?4",
            params![
                InvocationStatus::Completed.as_str(),
                serde_json::to_string(output)?,
                now,
                id
            ],
        )?;
        anyhow::ensure!(updated == 1, "invocation '{}' not found", id);
        Ok(())
    }

    fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let updated = self.lock().execute(
            "UPDATE invocations SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![InvocationStatus::Failed.as_str(), error, now, id],
        )?;
        anyhow::ensure!(updated == 1, "invocation '{}' not found", id);
        Ok(())
    }

    fn list_incomplete(&self) -> Result<Vec<Invocation>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM invocations WHERE status IN ('pending', 'running') ORDER BY created_at",
            INVOCATION_COLUMNS
        ))?;
        let invocations = stmt
            .query_map([], row_to_invocation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(invocations)
    }

    fn record_step(
        &self,
        invocation_id: &str,
        step_index: u32,
        name: &str,
        output: &serde_json::Value,
    ) -> Result<StepRecord> {
        let now = chrono::Utc::now().timestamp();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO steps (invocation_id, step_index, name, output, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (invocation_id, step_index) DO NOTHING",
            params![
                invocation_id,
                step_index,
                name,
                serde_json::to_string(output)?,
                now
            ],
        )?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM steps WHERE invocation_id = ?1 AND step_index = ?2",
                    STEP_COLUMNS
                ),
                params![invocation_id, step_index],
                row_to_step,
            )
            .with_context(|| {
                format!(
                    "Step record missing after insert: invocation '{}' index {}",
                    invocation_id, step_index
                )
            })?;
        Ok(record)
    }

    fn get_step(&self, invocation_id: &str, step_index: u32) -> Result<Option<StepRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM steps WHERE invocation_id = ?1 AND step_index = ?2",
                    STEP_COLUMNS
                ),
                params![invocation_id, step_index],
                row_to_step,
            )
            .optional()?;
        Ok(record)
    }

    fn list_steps(&self, invocation_id: &str) -> Result<Vec<StepRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM steps WHERE invocation_id = ?1 ORDER BY step_index",
            STEP_COLUMNS
        ))?;
        let steps = stmt
            .query_map(params![invocation_id], row_to_step)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(steps)
    }

    fn count_steps(&self, invocation_id: &str) -> Result<u32> {
        let conn = self.lock();
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM steps WHERE invocation_id = ?1",
            params![invocation_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteWorkflowStore {
        SqliteWorkflowStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_invocation_lifecycle() {
        let store = store();
        store
            .create_invocation("inv-1", "demo", &json!({"user": "Max"}))
            .unwrap();

        let inv = store.get_invocation("inv-1").unwrap().unwrap();
        assert_eq!(inv.workflow, "demo");
        assert_eq!(inv.status, InvocationStatus::Pending);
        assert_eq!(inv.attempts, 0);
        assert_eq!(inv.input, json!({"user": "Max"}));

        store.mark_running("inv-1").unwrap();
        let inv = store.get_invocation("inv-1").unwrap().unwrap();
        assert_eq!(inv.status, InvocationStatus::Running);
        assert_eq!(inv.attempts, 1);

        store.mark_completed("inv-1", &json!({"ok": true})).unwrap();
        let inv = store.get_invocation("inv-1").unwrap().unwrap();
        assert_eq!(inv.status, InvocationStatus::Completed);
        assert_eq!(inv.output, Some(json!({"ok": true})));
        assert!(inv.error.is_none());
    }

    #[test]
    fn test_mark_failed_records_error() {
        let store = store();
        store.create_invocation("inv-1", "demo", &json!(null)).unwrap();
        store.mark_failed("inv-1", "boom").unwrap();

        let inv = store.get_invocation("inv-1").unwrap().unwrap();
        assert_eq!(inv.status, InvocationStatus::Failed);
        assert_eq!(inv.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_missing_invocation_errors() {
        let store = store();
        assert!(store.get_invocation("nope").unwrap().is_none());
        assert!(store.mark_running("nope").is_err());
        assert!(store.mark_completed("nope", &json!(null)).is_err());
    }

    #[test]
    fn test_step_records_are_immutable() {
        let store = store();
        store.create_invocation("inv-1", "demo", &json!(null)).unwrap();

        let first = store
            .record_step("inv-1", 0, "chat_completion", &json!("original"))
            .unwrap();
        assert_eq!(first.output, json!("original"));

        // A second write at the same position does not clobber the record.
        let second = store
            .record_step("inv-1", 0, "chat_completion", &json!("imposter"))
            .unwrap();
        assert_eq!(second.output, json!("original"));

        let fetched = store.get_step("inv-1", 0).unwrap().unwrap();
        assert_eq!(fetched.output, json!("original"));
        assert_eq!(store.count_steps("inv-1").unwrap(), 1);
    }

    #[test]
    fn test_steps_are_isolated_per_invocation() {
        let store = store();
        store.create_invocation("inv-a", "demo", &json!(null)).unwrap();
        store.create_invocation("inv-b", "demo", &json!(null)).unwrap();

        store.record_step("inv-a", 0, "s", &json!("a0")).unwrap();
        store.record_step("inv-b", 0, "s", &json!("b0")).unwrap();
        store.record_step("inv-b", 1, "s", &json!("b1")).unwrap();

        assert_eq!(store.count_steps("inv-a").unwrap(), 1);
        assert_eq!(store.count_steps("inv-b").unwrap(), 2);
        assert_eq!(
            store.get_step("inv-a", 0).unwrap().unwrap().output,
            json!("a0")
        );
        assert_eq!(
            store.get_step("inv-b", 1).unwrap().unwrap().output,
            json!("b1")
        );
    }

    #[test]
    fn test_list_incomplete_skips_terminal() {
        let store = store();
        store.create_invocation("inv-1", "demo", &json!(null)).unwrap();
        store.create_invocation("inv-2", "demo", &json!(null)).unwrap();
        store.create_invocation("inv-3", "demo", &json!(null)).unwrap();

        store.mark_running("inv-2").unwrap();
        store.mark_running("inv-3").unwrap();
        store.mark_completed("inv-3", &json!(null)).unwrap();

        let incomplete = store.list_incomplete().unwrap();
        let ids: Vec<_> = incomplete.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["inv-1", "inv-2"]);
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflows.db");

        {
            let store = SqliteWorkflowStore::open(&path).unwrap();
            store.create_invocation("inv-1", "demo", &json!(null)).unwrap();
            store.record_step("inv-1", 0, "s", &json!(1)).unwrap();
        }

        let store = SqliteWorkflowStore::open(&path).unwrap();
        assert!(store.get_invocation("inv-1").unwrap().is_some());
        assert_eq!(store.count_steps("inv-1").unwrap(), 1);
    }
}
