//! TaskTracker: an observational layer over task state
//! transitions. Purely observational — it does not schedule or mutate tasks,
//! only records events and answers hierarchy/aggregate queries.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use agentos_types::{
    event_for_transition, AggregateStatus, Task, TaskEvent, TaskEventType, TaskStatus,
};
use chrono::{DateTime, Utc};

/// Bounded ring buffer size.
const DEFAULT_EVENT_BUFFER: usize = 10_000;

pub type Subscriber = Box<dyn Fn(&TaskEvent) + Send + Sync>;

#[derive(Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    events: VecDeque<TaskEvent>,
}

pub struct TaskTracker {
    inner: RwLock<Inner>,
    buffer_capacity: usize,
    subscribers: RwLock<Vec<Subscriber>>,
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl TaskTracker {
    pub fn new(buffer_capacity: usize) -> Self {
        TaskTracker {
            inner: RwLock::new(Inner::default()),
            buffer_capacity,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler invoked synchronously for every emitted event.
    /// A panicking handler is caught so one bad subscriber cannot stop event
    /// emission for the rest.
    pub fn subscribe(&self, handler: Subscriber) {
        self.subscribers.write().unwrap().push(handler);
    }

    fn emit(&self, event: TaskEvent) {
        {
            let mut inner = self.inner.write().unwrap();
            if inner.events.len() >= self.buffer_capacity {
                inner.events.pop_front();
            }
            inner.events.push_back(event.clone());
        }
        for handler in self.subscribers.read().unwrap().iter() {
            let handler: &(dyn Fn(&TaskEvent) + Send + Sync) = &**handler;
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
        }
    }

    /// Registers a task and emits `CREATED`.
    pub fn track(&self, task: Task) {
        let event = TaskEvent {
            task_id: task.id.clone(),
            event_type: TaskEventType::Created,
            data: None,
            at: Utc::now(),
        };
        self.inner.write().unwrap().tasks.insert(task.id.clone(), task);
        self.emit(event);
    }

    /// Records a status transition, emitting the semantic event per
    /// [`event_for_transition`] when the transition maps to one.
    pub fn record_transition(&self, task_id: &str, from: TaskStatus, to: TaskStatus) {
        if let Some(task) = self.inner.write().unwrap().tasks.get_mut(task_id) {
            task.status = to;
            if to == TaskStatus::Running && task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
            if matches!(to, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled) {
                task.completed_at = Some(Utc::now());
            }
        }
        if let Some(event_type) = event_for_transition(from, to) {
            self.emit(TaskEvent { task_id: task_id.to_string(), event_type, data: None, at: Utc::now() });
        }
    }

    pub fn record_progress(&self, task_id: &str, progress: f64) {
        if let Some(task) = self.inner.write().unwrap().tasks.get_mut(task_id) {
            task.progress = progress;
        }
        self.emit(TaskEvent {
            task_id: task_id.to_string(),
            event_type: TaskEventType::Progress,
            data: Some(serde_json::json!({ "progress": progress })),
            at: Utc::now(),
        });
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner.read().unwrap().tasks.get(task_id).cloned()
    }

    /// A task's full ancestor chain, root-first.
    pub fn get_hierarchy(&self, task_id: &str) -> Vec<Task> {
        let inner = self.inner.read().unwrap();
        let mut chain = Vec::new();
        let mut current = inner.tasks.get(task_id);
        while let Some(task) = current {
            chain.push(task.clone());
            current = task.parent_id.as_deref().and_then(|id| inner.tasks.get(id));
        }
        chain.reverse();
        chain
    }

    pub fn get_root_task(&self, task_id: &str) -> Option<Task> {
        self.get_hierarchy(task_id).into_iter().next()
    }

    pub fn get_siblings(&self, task_id: &str) -> Vec<Task> {
        let inner = self.inner.read().unwrap();
        let Some(task) = inner.tasks.get(task_id) else { return Vec::new() };
        let Some(parent_id) = &task.parent_id else { return Vec::new() };
        let Some(parent) = inner.tasks.get(parent_id) else { return Vec::new() };
        parent
            .subtask_ids
            .iter()
            .filter(|id| id.as_str() != task_id)
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    /// Aggregate counts and mean progress across a composite task's subtasks
    pub fn get_aggregate_status(&self, task_id: &str) -> AggregateStatus {
        let inner = self.inner.read().unwrap();
        let mut status = AggregateStatus::default();
        let Some(task) = inner.tasks.get(task_id) else { return status };

        let mut all = vec![task.clone()];
        for id in &task.subtask_ids {
            if let Some(sub) = inner.tasks.get(id) {
                all.push(sub.clone());
            }
        }

        status.total_tasks = all.len() as u64;
        let mut progress_sum = 0.0;
        for t in &all {
            progress_sum += t.progress;
            match t.status {
                TaskStatus::Pending => status.pending += 1,
                TaskStatus::Scheduled => status.scheduled += 1,
                TaskStatus::Running => status.running += 1,
                TaskStatus::Completed => status.completed += 1,
                TaskStatus::Failed => status.failed += 1,
                TaskStatus::Cancelled => status.cancelled += 1,
                TaskStatus::Blocked => status.blocked += 1,
            }
        }
        status.overall_progress = if all.is_empty() { 0.0 } else { progress_sum / all.len() as f64 * 100.0 };
        status
    }

    /// Emits `DEADLINE_WARNING` for tasks past their deadline and still
    /// running.
    pub fn check_deadlines(&self, now: DateTime<Utc>) -> Vec<String> {
        let overdue: Vec<String> = {
            let inner = self.inner.read().unwrap();
            inner
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Running)
                .filter(|t| t.deadline.map(|d| now > d).unwrap_or(false))
                .map(|t| t.id.clone())
                .collect()
        };
        for id in &overdue {
            self.emit(TaskEvent { task_id: id.clone(), event_type: TaskEventType::DeadlineWarning, data: None, at: now });
        }
        overdue
    }

    /// Emits `TIMEOUT_WARNING` for tasks whose `constraints.timeout_seconds`
    /// has elapsed since `started_at`.
    pub fn check_timeouts(&self, now: DateTime<Utc>) -> Vec<String> {
        let timed_out: Vec<String> = {
            let inner = self.inner.read().unwrap();
            inner
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Running)
                .filter(|t| {
                    match (t.started_at, t.constraints.timeout_seconds) {
                        (Some(started), Some(timeout)) => {
                            (now - started).num_seconds() as u64 > timeout
                        }
                        _ => false,
                    }
                })
                .map(|t| t.id.clone())
                .collect()
        };
        for id in &timed_out {
            self.emit(TaskEvent { task_id: id.clone(), event_type: TaskEventType::TimeoutWarning, data: None, at: now });
        }
        timed_out
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.inner.read().unwrap().events.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{TaskConstraints, TaskKind, TaskPriority};

    fn task(id: &str, parent: Option<&str>, progress: f64, status: TaskStatus) -> Task {
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
            progress,
            deadline: None,
            constraints: TaskConstraints::default(),
            assigned_agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn aggregate_status_matches_spec_scenario() {
        let tracker = TaskTracker::default();
        let mut root = task("root", None, 0.0, TaskStatus::Running);
        root.subtask_ids = vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()];
        tracker.track(root);
        tracker.track(task("s1", Some("root"), 1.0, TaskStatus::Completed));
        tracker.track(task("s2", Some("root"), 1.0, TaskStatus::Completed));
        tracker.track(task("s3", Some("root"), 0.0, TaskStatus::Pending));
        tracker.track(task("s4", Some("root"), 0.0, TaskStatus::Pending));

        let status = tracker.get_aggregate_status("root");
        assert_eq!(status.total_tasks, 5);
        assert_eq!(status.completed, 2);
        assert_eq!(status.pending, 3);
        assert!((status.overall_progress - 40.0).abs() < 1.0);
    }

    #[test]
    fn hierarchy_is_root_first() {
        let tracker = TaskTracker::default();
        tracker.track(task("root", None, 0.0, TaskStatus::Running));
        tracker.track(task("child", Some("root"), 0.0, TaskStatus::Pending));
        let chain = tracker.get_hierarchy("child");
        assert_eq!(chain[0].id, "root");
        assert_eq!(chain[1].id, "child");
    }

    #[test]
    fn transition_table_drives_emitted_event() {
        let tracker = TaskTracker::default();
        tracker.track(task("t1", None, 0.0, TaskStatus::Pending));
        tracker.record_transition("t1", TaskStatus::Pending, TaskStatus::Running);
        let events: Vec<_> = tracker.events().into_iter().map(|e| e.event_type).collect();
        assert!(events.contains(&TaskEventType::Started));
    }

    #[test]
    fn panicking_subscriber_does_not_stop_emission() {
        let tracker = TaskTracker::default();
        tracker.subscribe(Box::new(|_event| panic!("boom")));
        tracker.track(task("t1", None, 0.0, TaskStatus::Pending));
        assert_eq!(tracker.events().len(), 1);
    }
}
