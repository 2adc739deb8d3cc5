//! `agentos tasks` — create, track, and inspect the task hierarchy.
//!
//! `TaskTracker` is purely in-memory, so every invocation loads persisted
//! tasks from `TaskStore`, replays them into a fresh tracker, applies the
//! requested mutation, then persists the task plus any newly emitted events.

use agentos_core::runtime::task_store::TaskStore;
use agentos_core::runtime::task_tracker::TaskTracker;
use agentos_types::{AgentOsError, Task, TaskConstraints, TaskKind, TaskPriority, TaskStatus};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    /// Register a new task.
    Create(CreateArgs),
    /// List tasks, optionally filtered by status.
    List { #[arg(long)] status: Option<String> },
    /// Show a single task.
    Show { id: String },
    /// Root-first ancestor chain.
    Hierarchy { id: String },
    /// Siblings under the same parent.
    Siblings { id: String },
    /// Aggregate status across a composite task's subtasks.
    Aggregate { id: String },
    /// Record a status transition.
    Transition { id: String, #[arg(long)] to: String },
    /// Record progress in `[0, 1]`.
    Progress { id: String, #[arg(long)] value: f64 },
    /// Emit DEADLINE_WARNING for running tasks past their deadline.
    CheckDeadlines,
    /// Emit TIMEOUT_WARNING for running tasks past their timeout.
    CheckTimeouts,
    /// Event log for one task, most recent first.
    Events { id: String, #[arg(long, default_value_t = 50)] limit: u32 },
    /// Delete a task and its event log.
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    name: String,
    #[arg(long = "kind", default_value = "leaf")]
    kind: String,
    #[arg(long, default_value = "normal")]
    priority: String,
    #[arg(long)]
    parent: Option<String>,
    #[arg(long = "depends-on")]
    dependency_ids: Vec<String>,
    #[arg(long)]
    deadline: Option<String>,
    #[arg(long = "timeout-seconds")]
    timeout_seconds: Option<u64>,
    #[arg(long)]
    assigned_agent: Option<String>,
}

fn parse_enum<T: DeserializeOwned>(field: &'static str, s: &str) -> CmdResult<T> {
    serde_json::from_value(json!(s)).map_err(|_| AgentOsError::validation(field, format!("unrecognized value `{s}`")))
}

fn open_store(dir: &DataDir) -> CmdResult<TaskStore> {
    dir.ensure_index_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    TaskStore::open(dir.tasks_db()).map_err(AgentOsError::from)
}

fn hydrated(store: &TaskStore) -> CmdResult<TaskTracker> {
    let tracker = TaskTracker::default();
    for task in store.list_all().map_err(AgentOsError::from)? {
        tracker.track(task);
    }
    Ok(tracker)
}

fn persist_new_events(store: &TaskStore, tracker: &TaskTracker, known: usize) -> CmdResult<()> {
    let events = tracker.events();
    for event in events.into_iter().skip(known) {
        store.append_event(&event).map_err(AgentOsError::from)?;
    }
    Ok(())
}

pub fn run(dir: &DataDir, json_out: bool, cmd: TasksCommand) -> CmdResult<()> {
    match cmd {
        TasksCommand::Create(args) => create(dir, json_out, args),
        TasksCommand::List { status } => list(dir, json_out, status),
        TasksCommand::Show { id } => show(dir, json_out, &id),
        TasksCommand::Hierarchy { id } => hierarchy(dir, json_out, &id),
        TasksCommand::Siblings { id } => siblings(dir, json_out, &id),
        TasksCommand::Aggregate { id } => aggregate(dir, json_out, &id),
        TasksCommand::Transition { id, to } => transition(dir, json_out, &id, &to),
        TasksCommand::Progress { id, value } => progress(dir, json_out, &id, value),
        TasksCommand::CheckDeadlines => check_deadlines(dir, json_out),
        TasksCommand::CheckTimeouts => check_timeouts(dir, json_out),
        TasksCommand::Events { id, limit } => events(dir, json_out, &id, limit),
        TasksCommand::Delete { id } => {
            let store = open_store(dir)?;
            store.delete_task(&id).map_err(AgentOsError::from)?;
            ok(json_out, &id);
            Ok(())
        }
    }
}

fn create(dir: &DataDir, json_out: bool, args: CreateArgs) -> CmdResult<()> {
    let store = open_store(dir)?;
    let kind: TaskKind = parse_enum("kind", &args.kind)?;
    let priority: TaskPriority = parse_enum("priority", &args.priority)?;
    let deadline = args
        .deadline
        .as_deref()
        .map(|s| s.parse::<chrono::DateTime<Utc>>())
        .transpose()
        .map_err(|e| AgentOsError::validation("deadline", e.to_string()))?;

    let id = args.id.unwrap_or_else(|| format!("task_{}", uuid::Uuid::new_v4()));
    let task = Task {
        id: id.clone(),
        name: args.name,
        kind,
        priority,
        status: TaskStatus::Pending,
        parent_id: args.parent.clone(),
        subtask_ids: Vec::new(),
        dependency_ids: args.dependency_ids,
        inputs: json!({}),
        outputs: json!({}),
        progress: 0.0,
        deadline,
        constraints: TaskConstraints { timeout_seconds: args.timeout_seconds },
        assigned_agent_id: args.assigned_agent,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    };

    store.save_task(&task).map_err(AgentOsError::from)?;

    if let Some(parent_id) = &args.parent {
        if let Some(mut parent) = store.get_task(parent_id).map_err(AgentOsError::from)? {
            parent.subtask_ids.push(id.clone());
            store.save_task(&parent).map_err(AgentOsError::from)?;
        }
    }

    let tracker = hydrated(&store)?;
    let known = tracker.events().len();
    tracker.track(task);
    persist_new_events(&store, &tracker, known)?;

    ok(json_out, &id);
    Ok(())
}

fn list(dir: &DataDir, json_out: bool, status: Option<String>) -> CmdResult<()> {
    let store = open_store(dir)?;
    let rows = match status.as_deref() {
        Some(s) => store.list_by_status(parse_enum("status", s)?).map_err(AgentOsError::from)?,
        None => store.list_all().map_err(AgentOsError::from)?,
    };
    if json_out {
        print_json(&json!(rows));
    } else {
        for t in &rows {
            println!("{} [{:?}] {} ({:.0}%)", t.id, t.status, t.name, t.progress * 100.0);
        }
    }
    Ok(())
}

fn show(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let store = open_store(dir)?;
    let task = store.get_task(id).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("task", id))?;
    if json_out {
        print_json(&serde_json::to_value(&task).unwrap_or(serde_json::Value::Null));
    } else {
        println!("{task:#?}");
    }
    Ok(())
}

fn hierarchy(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let store = open_store(dir)?;
    let tracker = hydrated(&store)?;
    let chain = tracker.get_hierarchy(id);
    if json_out {
        print_json(&json!(chain));
    } else {
        for t in &chain {
            println!("{} [{:?}]", t.id, t.status);
        }
    }
    Ok(())
}

fn siblings(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let store = open_store(dir)?;
    let tracker = hydrated(&store)?;
    let rows = tracker.get_siblings(id);
    if json_out {
        print_json(&json!(rows));
    } else {
        for t in &rows {
            println!("{} [{:?}]", t.id, t.status);
        }
    }
    Ok(())
}

fn aggregate(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let store = open_store(dir)?;
    let tracker = hydrated(&store)?;
    let status = tracker.get_aggregate_status(id);
    if json_out {
        print_json(&serde_json::to_value(&status).unwrap_or(serde_json::Value::Null));
    } else {
        println!(
            "{} total, {:.1}% overall: pending={} scheduled={} running={} completed={} failed={} cancelled={} blocked={}",
            status.total_tasks,
            status.overall_progress,
            status.pending,
            status.scheduled,
            status.running,
            status.completed,
            status.failed,
            status.cancelled,
            status.blocked
        );
    }
    Ok(())
}

fn transition(dir: &DataDir, json_out: bool, id: &str, to: &str) -> CmdResult<()> {
    let store = open_store(dir)?;
    let current = store.get_task(id).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("task", id))?;
    let to_status: TaskStatus = parse_enum("to", to)?;
    let from_status = current.status;

    let tracker = hydrated(&store)?;
    let known = tracker.events().len();
    tracker.record_transition(id, from_status, to_status);
    persist_new_events(&store, &tracker, known)?;

    let updated = tracker.get_task(id).ok_or_else(|| AgentOsError::not_found("task", id))?;
    store.save_task(&updated).map_err(AgentOsError::from)?;

    ok(json_out, id);
    Ok(())
}

fn progress(dir: &DataDir, json_out: bool, id: &str, value: f64) -> CmdResult<()> {
    let store = open_store(dir)?;
    store.get_task(id).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("task", id))?;

    let tracker = hydrated(&store)?;
    let known = tracker.events().len();
    tracker.record_progress(id, value);
    persist_new_events(&store, &tracker, known)?;

    let updated = tracker.get_task(id).ok_or_else(|| AgentOsError::not_found("task", id))?;
    store.save_task(&updated).map_err(AgentOsError::from)?;

    ok(json_out, id);
    Ok(())
}

fn check_deadlines(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let store = open_store(dir)?;
    let tracker = hydrated(&store)?;
    let known = tracker.events().len();
    let overdue = tracker.check_deadlines(Utc::now());
    persist_new_events(&store, &tracker, known)?;
    if json_out {
        print_json(&json!({ "overdue": overdue }));
    } else {
        for id in &overdue {
            println!("{id}: deadline passed");
        }
    }
    Ok(())
}

fn check_timeouts(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let store = open_store(dir)?;
    let tracker = hydrated(&store)?;
    let known = tracker.events().len();
    let timed_out = tracker.check_timeouts(Utc::now());
    persist_new_events(&store, &tracker, known)?;
    if json_out {
        print_json(&json!({ "timed_out": timed_out }));
    } else {
        for id in &timed_out {
            println!("{id}: timed out");
        }
    }
    Ok(())
}

fn events(dir: &DataDir, json_out: bool, id: &str, limit: u32) -> CmdResult<()> {
    let store = open_store(dir)?;
    let rows = store.list_events(id, limit).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!(rows));
    } else {
        for e in &rows {
            println!("{:?} at {}", e.event_type, e.at);
        }
    }
    Ok(())
}

fn ok(json_out: bool, id: &str) {
    if json_out {
        print_json(&json!({ "ok": true, "id": id }));
    } else {
        println!("ok: {id}");
    }
}
