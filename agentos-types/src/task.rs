//! The [`Task`] entity and event model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Composite,
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
    Blocked,
}

/// `timeout_seconds` and friends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConstraints {
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub kind: TaskKind,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub parent_id: Option<String>,
    pub subtask_ids: Vec<String>,
    pub dependency_ids: Vec<String>,
    pub inputs: serde_json::Value,
    pub outputs: serde_json::Value,
    /// `[0, 1]`.
    pub progress: f64,
    pub deadline: Option<DateTime<Utc>>,
    pub constraints: TaskConstraints,
    pub assigned_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A task is schedulable only if every dependency is `completed`
    ///. Caller supplies dependency statuses since
    /// `Task` itself doesn't hold a store reference.
    pub fn is_schedulable(&self, dependency_statuses: &[TaskStatus]) -> bool {
        dependency_statuses
            .iter()
            .all(|s| *s == TaskStatus::Completed)
    }
}

/// Event types emitted by the [`TaskTracker`](crate) observational layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
    Unblocked,
    DeadlineWarning,
    TimeoutWarning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub event_type: TaskEventType,
    pub data: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

/// Maps a raw `(from_status, to_status)` transition to the semantic event it
/// emits. Returns `None` for transitions that carry no semantic event (e.g.
/// `Pending -> Scheduled`).
pub fn event_for_transition(from: TaskStatus, to: TaskStatus) -> Option<TaskEventType> {
    use TaskStatus::*;
    match (from, to) {
        (Pending | Scheduled, Running) => Some(TaskEventType::Started),
        (Running, Completed) => Some(TaskEventType::Completed),
        (Running, Failed) => Some(TaskEventType::Failed),
        (Blocked, Scheduled | Pending) => Some(TaskEventType::Unblocked),
        _ => None,
    }
}

/// Counts of tasks per status across a hierarchy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub total_tasks: u64,
    pub pending: u64,
    pub scheduled: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub blocked: u64,
    pub overall_progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_matches_spec() {
        assert_eq!(
            event_for_transition(TaskStatus::Pending, TaskStatus::Running),
            Some(TaskEventType::Started)
        );
        assert_eq!(
            event_for_transition(TaskStatus::Scheduled, TaskStatus::Running),
            Some(TaskEventType::Started)
        );
        assert_eq!(
            event_for_transition(TaskStatus::Running, TaskStatus::Completed),
            Some(TaskEventType::Completed)
        );
        assert_eq!(
            event_for_transition(TaskStatus::Running, TaskStatus::Failed),
            Some(TaskEventType::Failed)
        );
        assert_eq!(
            event_for_transition(TaskStatus::Blocked, TaskStatus::Scheduled),
            Some(TaskEventType::Unblocked)
        );
        assert_eq!(
            event_for_transition(TaskStatus::Blocked, TaskStatus::Pending),
            Some(TaskEventType::Unblocked)
        );
        assert_eq!(
            event_for_transition(TaskStatus::Pending, TaskStatus::Blocked),
            None
        );
    }

    #[test]
    fn schedulable_requires_all_deps_completed() {
        let mut t = sample();
        assert!(t.is_schedulable(&[TaskStatus::Completed, TaskStatus::Completed]));
        assert!(!t.is_schedulable(&[TaskStatus::Completed, TaskStatus::Running]));
        t.dependency_ids.clear();
        assert!(t.is_schedulable(&[]));
    }

    fn sample() -> Task {
        Task {
            id: "t1".into(),
            name: "test".into(),
            kind: TaskKind::Leaf,
            priority: TaskPriority::Normal,
            status: TaskStatus::Pending,
            parent_id: None,
            subtask_ids: vec![],
            dependency_ids: vec!["d1".into(), "d2".into()],
            inputs: serde_json::json!({}),
            outputs: serde_json::json!({}),
            progress: 0.0,
            deadline: None,
            constraints: TaskConstraints::default(),
            assigned_agent_id: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
