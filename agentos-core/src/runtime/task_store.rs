//! Durable persistence for [`Task`] rows and their [`TaskEvent`] history.
//! `TaskTracker` is an in-process observational layer with no storage of its
//! own; this is what lets task state and its event log survive across CLI
//! invocations, following the same open-per-call `Connection` shape as
//! `AgentOsStore`.

use std::path::{Path, PathBuf};

use agentos_types::{Task, TaskEvent, TaskEventType, TaskStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

fn status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Scheduled => "scheduled",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
        TaskStatus::Blocked => "blocked",
    }
}

fn event_type_str(t: TaskEventType) -> &'static str {
    match t {
        TaskEventType::Created => "CREATED",
        TaskEventType::Started => "STARTED",
        TaskEventType::Progress => "PROGRESS",
        TaskEventType::Completed => "COMPLETED",
        TaskEventType::Failed => "FAILED",
        TaskEventType::Unblocked => "UNBLOCKED",
        TaskEventType::DeadlineWarning => "DEADLINE_WARNING",
        TaskEventType::TimeoutWarning => "TIMEOUT_WARNING",
    }
}

pub struct TaskStore {
    db_path: PathBuf,
}

impl TaskStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                parent_id TEXT,
                status TEXT NOT NULL,
                task_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks (parent_id);
            CREATE TABLE IF NOT EXISTS task_events (
                task_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                data TEXT,
                at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_task_events_task ON task_events (task_id);
            "#,
        )?;
        Ok(TaskStore { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn save_task(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tasks (id, parent_id, status, task_json, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                parent_id = excluded.parent_id,
                status = excluded.status,
                task_json = excluded.task_json,
                updated_at = excluded.updated_at",
            params![
                task.id,
                task.parent_id,
                status_str(task.status),
                serde_json::to_string(task)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT task_json FROM tasks WHERE id = ?1", params![id], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })
        .optional()?
        .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
        .transpose()
    }

    pub fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT task_json FROM tasks ORDER BY updated_at ASC")?;
        let rows = stmt.query_map([], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        Ok(self.list_all()?.into_iter().filter(|t| t.status == status).collect())
    }

    pub fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM task_events WHERE task_id = ?1", params![id])?;
        Ok(())
    }

    pub fn append_event(&self, event: &TaskEvent) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO task_events (task_id, event_type, data, at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.task_id,
                event_type_str(event.event_type),
                event.data.as_ref().map(|v| v.to_string()),
                event.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn list_events(&self, task_id: &str, limit: u32) -> Result<Vec<TaskEvent>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_type, data, at FROM task_events WHERE task_id = ?1 ORDER BY at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![task_id, limit], |row| {
            let event_type: String = row.get(0)?;
            let data: Option<String> = row.get(1)?;
            let at: String = row.get(2)?;
            Ok((event_type, data, at))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (event_type, data, at) = row?;
            out.push(TaskEvent {
                task_id: task_id.to_string(),
                event_type: event_type_from_str(&event_type),
                data: data.and_then(|d| serde_json::from_str(&d).ok()),
                at: parse_rfc3339(&at),
            });
        }
        Ok(out)
    }
}

fn event_type_from_str(s: &str) -> TaskEventType {
    match s {
        "STARTED" => TaskEventType::Started,
        "PROGRESS" => TaskEventType::Progress,
        "COMPLETED" => TaskEventType::Completed,
        "FAILED" => TaskEventType::Failed,
        "UNBLOCKED" => TaskEventType::Unblocked,
        "DEADLINE_WARNING" => TaskEventType::DeadlineWarning,
        "TIMEOUT_WARNING" => TaskEventType::TimeoutWarning,
        _ => TaskEventType::Created,
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{TaskConstraints, TaskKind, TaskPriority};

    fn task(id: &str, parent: Option<&str>, status: TaskStatus) -> Task {
        Task {
            id: id.into(),
            name: id.into(),
            kind: if parent.is_none() { TaskKind::Composite } else { TaskKind::Leaf },
            priority: TaskPriority::Normal,
            status,
            parent_id: parent.map(String::from),
            subtask_ids: Vec::new(),
            dependency_ids: Vec::new(),
            inputs: serde_json::json!({}),
            outputs: serde_json::json!({}),
            progress: 0.0,
            deadline: None,
            constraints: TaskConstraints::default(),
            assigned_agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn save_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("t.sqlite")).unwrap();
        store.save_task(&task("t1", None, TaskStatus::Pending)).unwrap();
        let fetched = store.get_task("t1").unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[test]
    fn save_again_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("t.sqlite")).unwrap();
        store.save_task(&task("t1", None, TaskStatus::Pending)).unwrap();
        store.save_task(&task("t1", None, TaskStatus::Running)).unwrap();
        assert_eq!(store.list_all().unwrap().len(), 1);
        assert_eq!(store.get_task("t1").unwrap().unwrap().status, TaskStatus::Running);
    }

    #[test]
    fn events_persist_in_reverse_chronological_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("t.sqlite")).unwrap();
        store.append_event(&TaskEvent { task_id: "t1".into(), event_type: TaskEventType::Created, data: None, at: Utc::now() }).unwrap();
        store.append_event(&TaskEvent { task_id: "t1".into(), event_type: TaskEventType::Started, data: None, at: Utc::now() }).unwrap();
        let events = store.list_events("t1", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, TaskEventType::Started);
    }

    #[test]
    fn delete_task_removes_its_events_too() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open(dir.path().join("t.sqlite")).unwrap();
        store.save_task(&task("t1", None, TaskStatus::Pending)).unwrap();
        store.append_event(&TaskEvent { task_id: "t1".into(), event_type: TaskEventType::Created, data: None, at: Utc::now() }).unwrap();
        store.delete_task("t1").unwrap();
        assert!(store.get_task("t1").unwrap().is_none());
        assert!(store.list_events("t1", 10).unwrap().is_empty());
    }
}
