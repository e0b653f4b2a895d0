use super::{ChangeSet, PersistenceError, PersistenceResult, ScheduleStore};
use crate::audit::{EditLogEntry, TaskField};
use crate::calendar::{DATE_FORMAT, parse_date};
use crate::exemption::{ExemptionId, WorkdayExemption};
use crate::project::{Project, ProjectId};
use crate::task::{Task, TaskId};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub struct SqliteScheduleStore {
    connection: Mutex<Connection>,
}

impl SqliteScheduleStore {
    pub fn new<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection)
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> PersistenceResult<Self> {
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY,
                project_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                project_id INTEGER NOT NULL,
                task_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks (project_id);
            CREATE TABLE IF NOT EXISTS schedule_edit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER,
                project_id INTEGER NOT NULL,
                task_name TEXT NOT NULL DEFAULT '',
                field_changed TEXT NOT NULL,
                old_value TEXT NOT NULL DEFAULT '',
                new_value TEXT NOT NULL DEFAULT '',
                reason TEXT NOT NULL DEFAULT '',
                edited_by TEXT NOT NULL DEFAULT '',
                edited_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_edit_log_project ON schedule_edit_log (project_id);
            CREATE TABLE IF NOT EXISTS workday_exemptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER,
                date TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                recurring INTEGER NOT NULL DEFAULT 0,
                created_by TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS task_id_sequence (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                next_id INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO task_id_sequence (id, next_id) VALUES (1, 1);
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn upsert_task(tx: &Transaction, task: &Task) -> PersistenceResult<()> {
        let json = serde_json::to_string(task)?;
        tx.execute(
            "INSERT INTO tasks (id, project_id, task_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET project_id = excluded.project_id, task_json = excluded.task_json",
            params![task.id, task.project_id, json],
        )?;
        Ok(())
    }

    fn save_project_tx(tx: &Transaction, project: &Project) -> PersistenceResult<()> {
        let json = serde_json::to_string(project)?;
        tx.execute(
            "INSERT INTO projects (id, project_json) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET project_json = excluded.project_json",
            params![project.id, json],
        )?;
        Ok(())
    }
}

type EditLogRow = (
    i64,
    Option<i64>,
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
);

fn edit_log_from_row(row: EditLogRow) -> PersistenceResult<EditLogEntry> {
    let (id, task_id, project_id, task_name, field, old_value, new_value, reason, edited_by, edited_at) =
        row;
    let field: TaskField = field
        .parse()
        .map_err(PersistenceError::InvalidData)?;
    let edited_at = NaiveDateTime::parse_from_str(&edited_at, TIMESTAMP_FORMAT).map_err(|err| {
        PersistenceError::InvalidData(format!("invalid edit timestamp '{edited_at}': {err}"))
    })?;
    Ok(EditLogEntry {
        id,
        task_id,
        project_id,
        task_name,
        field,
        old_value,
        new_value,
        reason,
        edited_by,
        edited_at,
    })
}

type ExemptionRow = (i64, Option<i64>, String, String, bool, String);

fn exemption_from_row(row: ExemptionRow) -> PersistenceResult<WorkdayExemption> {
    let (id, project_id, date, description, recurring, created_by) = row;
    let date = parse_date(&date)
        .ok_or_else(|| PersistenceError::InvalidData(format!("invalid exemption date '{date}'")))?;
    Ok(WorkdayExemption {
        id,
        project_id,
        date,
        description,
        recurring,
        created_by,
    })
}

impl ScheduleStore for SqliteScheduleStore {
    fn save_project(&self, project: &Project) -> PersistenceResult<()> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        Self::save_project_tx(&tx, project)?;
        tx.commit()?;
        Ok(())
    }

    fn load_project(&self, project_id: ProjectId) -> PersistenceResult<Option<Project>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare("SELECT project_json FROM projects WHERE id = ?1")?;
        let json: Option<String> = stmt
            .query_row(params![project_id], |row| row.get(0))
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn load_tasks(&self, project_id: ProjectId) -> PersistenceResult<Vec<Task>> {
        let conn = self.connection.lock();
        let mut stmt =
            conn.prepare("SELECT task_json FROM tasks WHERE project_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![project_id], |row| row.get::<_, String>(0))?;

        let mut tasks = Vec::new();
        for json in rows {
            let json = json?;
            let task: Task = serde_json::from_str(&json)?;
            tasks.push(task);
        }

        super::validate_tasks(&tasks)?;
        Ok(tasks)
    }

    fn reserve_task_ids(&self, count: usize) -> PersistenceResult<Vec<TaskId>> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        let next: i64 = tx.query_row(
            "SELECT MAX(next_id, COALESCE((SELECT MAX(id) FROM tasks), 0) + 1)
             FROM task_id_sequence WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        let count = count as i64;
        tx.execute(
            "UPDATE task_id_sequence SET next_id = ?1 WHERE id = 1",
            params![next + count],
        )?;
        tx.commit()?;
        Ok((next..next + count).collect())
    }

    fn commit(&self, changes: ChangeSet) -> PersistenceResult<()> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;

        if let Some(project) = &changes.project {
            Self::save_project_tx(&tx, project)?;
        }

        for task_id in &changes.deletes {
            tx.execute(
                "DELETE FROM schedule_edit_log WHERE task_id = ?1",
                params![task_id],
            )?;
            tx.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        }

        for task in &changes.upserts {
            Self::upsert_task(&tx, task)?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO schedule_edit_log (
                    task_id, project_id, task_name, field_changed, old_value,
                    new_value, reason, edited_by, edited_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for entry in &changes.log_entries {
                stmt.execute(params![
                    entry.task_id,
                    entry.project_id,
                    entry.task_name,
                    entry.field.as_str(),
                    entry.old_value,
                    entry.new_value,
                    entry.reason,
                    entry.edited_by,
                    entry.edited_at.format(TIMESTAMP_FORMAT).to_string(),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn edit_log(&self, project_id: ProjectId) -> PersistenceResult<Vec<EditLogEntry>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, project_id, task_name, field_changed, old_value,
                    new_value, reason, edited_by, edited_at
             FROM schedule_edit_log WHERE project_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(edit_log_from_row(row?)?);
        }
        Ok(entries)
    }

    fn insert_exemption(&self, mut exemption: WorkdayExemption) -> PersistenceResult<WorkdayExemption> {
        let conn = self.connection.lock();
        conn.execute(
            "INSERT INTO workday_exemptions (project_id, date, description, recurring, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                exemption.project_id,
                exemption.date.format(DATE_FORMAT).to_string(),
                exemption.description,
                exemption.recurring,
                exemption.created_by,
            ],
        )?;
        exemption.id = conn.last_insert_rowid();
        Ok(exemption)
    }

    fn exemptions(&self) -> PersistenceResult<Vec<WorkdayExemption>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, date, description, recurring, created_by
             FROM workday_exemptions ORDER BY date ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;
        let mut exemptions = Vec::new();
        for row in rows {
            exemptions.push(exemption_from_row(row?)?);
        }
        Ok(exemptions)
    }

    fn delete_exemption(&self, exemption_id: ExemptionId) -> PersistenceResult<bool> {
        let conn = self.connection.lock();
        let removed = conn.execute(
            "DELETE FROM workday_exemptions WHERE id = ?1",
            params![exemption_id],
        )?;
        Ok(removed > 0)
    }
}
