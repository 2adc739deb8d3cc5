//! `agentos conflicts` — detect, inspect, and resolve memory conflicts.

use std::collections::HashMap;

use agentos_core::conflict::{ConflictStore, Detector, Resolver, ScanRequest};
use agentos_core::graph::GraphStore;
use agentos_core::memory_store::MemoryStore;
use agentos_types::{
    Conflict, ConflictStatus, ConflictType, DetectionMethod, ResolutionAction, ResolutionRequest,
};
use agentos_types::{next_memory_id, AgentOsError};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// Run tag-overlap/semantic/supersession analyzers over every memory.
    Scan(ScanArgs),
    /// Incrementally scan pairs involving one memory.
    Check { memory: String },
    /// List conflicts, optionally filtered.
    List(ListArgs),
    /// Show one conflict in full.
    Show { id: String },
    /// Apply a resolution to a conflict.
    Resolve(ResolveArgs),
    /// Resolve a conflict with action `dismiss`.
    Dismiss { id: String, #[arg(long)] reason: String, #[arg(long, default_value = "cli")] by: String },
    /// Record a conflict that wasn't found by an analyzer.
    Flag(FlagArgs),
    /// Counts by status.
    Stats,
    /// Resolution log for one conflict.
    History { id: String },
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Comma-separated: tag_overlap, semantic, supersession.
    #[arg(long)]
    methods: Option<String>,
    #[arg(long, default_value_t = 0.5)]
    tag_threshold: f64,
    #[arg(long, default_value_t = 0.8)]
    semantic_threshold: f64,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    status: Option<String>,
    #[arg(long = "type")]
    conflict_type: Option<String>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    id: String,
    #[arg(long)]
    action: String,
    #[arg(long)]
    target: Option<String>,
    #[arg(long)]
    content: Option<String>,
    #[arg(long)]
    reason: String,
    #[arg(long, default_value = "cli")]
    by: String,
}

#[derive(Debug, Args)]
pub struct FlagArgs {
    m1: String,
    m2: String,
    #[arg(long = "type", default_value = "contradictory")]
    conflict_type: String,
    #[arg(long)]
    description: String,
}

fn parse_enum<T: DeserializeOwned>(field: &'static str, s: &str) -> CmdResult<T> {
    serde_json::from_value(json!(s)).map_err(|_| AgentOsError::validation(field, format!("unrecognized value `{s}`")))
}

fn open_conflicts(dir: &DataDir) -> CmdResult<ConflictStore> {
    dir.ensure_index_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    ConflictStore::open(dir.conflicts_db()).map_err(AgentOsError::from)
}

pub fn run(dir: &DataDir, json_out: bool, cmd: ConflictsCommand) -> CmdResult<()> {
    match cmd {
        ConflictsCommand::Scan(args) => scan(dir, json_out, args, None),
        ConflictsCommand::Check { memory } => {
            scan(dir, json_out, ScanArgs { methods: None, tag_threshold: 0.5, semantic_threshold: 0.8 }, Some(memory))
        }
        ConflictsCommand::List(args) => list(dir, json_out, args),
        ConflictsCommand::Show { id } => show(dir, json_out, &id),
        ConflictsCommand::Resolve(args) => resolve(dir, json_out, args),
        ConflictsCommand::Dismiss { id, reason, by } => resolve(
            dir,
            json_out,
            ResolveArgs { id, action: "dismiss".into(), target: None, content: None, reason, by },
        ),
        ConflictsCommand::Flag(args) => flag(dir, json_out, args),
        ConflictsCommand::Stats => stats(dir, json_out),
        ConflictsCommand::History { id } => history(dir, json_out, &id),
    }
}

fn scan(dir: &DataDir, json_out: bool, args: ScanArgs, target_memory_id: Option<String>) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let memories = MemoryStore::open(dir.embeddings_db())?.list_all()?;

    let methods = match &args.methods {
        Some(s) => s
            .split(',')
            .map(str::trim)
            .map(|m| parse_enum::<DetectionMethod>("methods", m))
            .collect::<CmdResult<Vec<_>>>()?,
        None => vec![DetectionMethod::TagOverlap, DetectionMethod::Semantic, DetectionMethod::Supersession],
    };

    let request = ScanRequest {
        methods,
        tag_overlap_threshold: args.tag_threshold,
        semantic_threshold: args.semantic_threshold,
        exclude_deprecated: true,
        exclude_ephemeral_pairs: true,
        target_memory_id: target_memory_id.clone(),
    };

    let detector = Detector::new(&conflicts, chrono::Duration::days(90));
    let scan_id = format!("scan_{}", uuid::Uuid::new_v4());
    let outcome = detector
        .scan(&memories, &request, scan_id.clone(), || format!("conflict_{}", uuid::Uuid::new_v4()))
        .map_err(AgentOsError::from)?;

    if json_out {
        print_json(&json!({
            "scan_id": scan_id,
            "new_conflicts": outcome.new_conflicts,
            "existing_conflicts": outcome.existing_conflicts,
        }));
    } else {
        println!("scan {scan_id}: {} new, {} existing", outcome.new_conflicts, outcome.existing_conflicts);
    }
    Ok(())
}

fn render_conflict(c: &Conflict) -> serde_json::Value {
    serde_json::to_value(c).unwrap_or(serde_json::Value::Null)
}

fn list(dir: &DataDir, json_out: bool, args: ListArgs) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let status_filter: Option<ConflictStatus> =
        args.status.as_deref().map(|s| parse_enum("status", s)).transpose()?;
    let type_filter: Option<ConflictType> =
        args.conflict_type.as_deref().map(|s| parse_enum("type", s)).transpose()?;

    let rows: Vec<Conflict> = conflicts
        .list_all()
        .map_err(AgentOsError::from)?
        .into_iter()
        .filter(|c| status_filter.map_or(true, |s| c.status == s))
        .filter(|c| type_filter.map_or(true, |t| c.classification == t))
        .collect();

    if json_out {
        print_json(&json!(rows.iter().map(render_conflict).collect::<Vec<_>>()));
    } else {
        for c in &rows {
            println!("{} [{:?}/{:?}] {} <-> {}: {}", c.id, c.classification, c.status, c.m1_id, c.m2_id, c.description);
        }
    }
    Ok(())
}

fn show(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let conflict = conflicts.get(id).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("conflict", id))?;
    if json_out {
        print_json(&render_conflict(&conflict));
    } else {
        println!("{conflict:#?}");
    }
    Ok(())
}

fn resolve(dir: &DataDir, json_out: bool, args: ResolveArgs) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let memories = MemoryStore::open(dir.embeddings_db())?;
    dir.ensure_knowledge_graph_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    let graph = GraphStore::open(dir.knowledge_graph_db())?;

    let action: ResolutionAction = parse_enum("action", &args.action)?;
    let request = ResolutionRequest {
        conflict_id: args.id.clone(),
        action,
        target_memory_id: args.target,
        merged_content: args.content,
        reason: args.reason,
        resolved_by: args.by,
    };

    let resolver = Resolver::new(&conflicts, &memories, &graph);
    let today = Utc::now();
    let entry = resolver
        .resolve(&request, || {
            let count = memories.count_for_date(today).unwrap_or(0);
            next_memory_id(today, count)
        })
        .map_err(AgentOsError::from)?;

    if json_out {
        print_json(&serde_json::to_value(&entry).unwrap_or(serde_json::Value::Null));
    } else {
        println!("conflict {} resolved via {:?}", entry.conflict_id, entry.action);
    }
    Ok(())
}

fn flag(dir: &DataDir, json_out: bool, args: FlagArgs) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let classification: ConflictType = parse_enum("type", &args.conflict_type)?;
    let id = format!("conflict_{}", uuid::Uuid::new_v4());
    let conflict = Conflict {
        id: id.clone(),
        classification,
        detection_method: DetectionMethod::Manual,
        confidence: 1.0,
        description: args.description,
        evidence: vec!["manually flagged".to_string()],
        status: ConflictStatus::Unresolved,
        m1_id: args.m1,
        m2_id: args.m2,
        m1_role: agentos_types::MemoryRole::Primary,
        m2_role: agentos_types::MemoryRole::Secondary,
        resolution_action: None,
        resolved_by: None,
        resolved_at: None,
        suppressed_until: None,
        scan_id: None,
        created_at: Utc::now(),
    };
    conflicts.upsert(&conflict).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!({ "id": id }));
    } else {
        println!("flagged {id}");
    }
    Ok(())
}

fn stats(dir: &DataDir, json_out: bool) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let all = conflicts.list_all().map_err(AgentOsError::from)?;
    let mut counts: HashMap<String, u64> = HashMap::new();
    for c in &all {
        *counts.entry(format!("{:?}", c.status)).or_insert(0) += 1;
    }
    if json_out {
        print_json(&json!({ "total": all.len(), "by_status": counts }));
    } else {
        println!("total: {}", all.len());
        for (status, count) in &counts {
            println!("  {status}: {count}");
        }
    }
    Ok(())
}

fn history(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let conflicts = open_conflicts(dir)?;
    let log = conflicts.get_resolution_log(id).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!(log));
    } else {
        for entry in &log {
            println!("{} {:?} by {} at {}", entry.conflict_id, entry.action, entry.actor, entry.at);
        }
    }
    Ok(())
}
