//! `agentos usage` — query-log and per-memory access tracking, and the
//! derived memory health report.

use agentos_core::memory_store::MemoryStore;
use agentos_core::usage::UsageTracker;
use agentos_types::AgentOsError;
use chrono::Duration;
use clap::{Args, Subcommand};
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum UsageCommand {
    /// Never-used, stale, and most-used memories.
    Report(ReportArgs),
    /// Record a retrieval query and its result count.
    LogQuery { query: String, #[arg(long)] results: u32 },
    /// Record a single memory access.
    RecordAccess { memory: String },
    /// Access stats for one memory.
    Show { memory: String },
    /// Recent query log entries.
    Queries { #[arg(long, default_value_t = 50)] limit: u32 },
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[arg(long, default_value_t = 30)]
    stale_after_days: i64,
}

fn open_usage(dir: &DataDir) -> CmdResult<UsageTracker> {
    dir.ensure_index_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    UsageTracker::open(dir.usage_db()).map_err(AgentOsError::from)
}

pub fn run(dir: &DataDir, json_out: bool, cmd: UsageCommand) -> CmdResult<()> {
    match cmd {
        UsageCommand::Report(args) => report(dir, json_out, args),
        UsageCommand::LogQuery { query, results } => {
            let usage = open_usage(dir)?;
            let id = usage.log_query(&query, results).map_err(AgentOsError::from)?;
            ok(json_out, &id);
            Ok(())
        }
        UsageCommand::RecordAccess { memory } => {
            let usage = open_usage(dir)?;
            let memories = MemoryStore::open(dir.embeddings_db())?;
            usage.record_access(&memories, &memory).map_err(AgentOsError::from)?;
            ok(json_out, &memory);
            Ok(())
        }
        UsageCommand::Show { memory } => show(dir, json_out, &memory),
        UsageCommand::Queries { limit } => queries(dir, json_out, limit),
    }
}

fn report(dir: &DataDir, json_out: bool, args: ReportArgs) -> CmdResult<()> {
    let usage = open_usage(dir)?;
    let memories = MemoryStore::open(dir.embeddings_db())?;
    let report = usage.health_report(&memories, Duration::days(args.stale_after_days)).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!({
            "never_used": report.never_used,
            "stale": report.stale,
            "most_used": report.most_used,
        }));
    } else {
        println!("never used: {}", report.never_used.len());
        println!("stale: {}", report.stale.len());
        println!("most used:");
        for (id, count) in &report.most_used {
            println!("  {id}: {count}");
        }
    }
    Ok(())
}

fn show(dir: &DataDir, json_out: bool, memory: &str) -> CmdResult<()> {
    let usage = open_usage(dir)?;
    let record = usage.get_usage(memory).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("memory_usage", memory))?;
    if json_out {
        print_json(&json!({
            "memory_id": record.memory_id,
            "access_count": record.access_count,
            "last_accessed_at": record.last_accessed_at,
        }));
    } else {
        println!("{} accessed {} time(s), last at {:?}", record.memory_id, record.access_count, record.last_accessed_at);
    }
    Ok(())
}

fn queries(dir: &DataDir, json_out: bool, limit: u32) -> CmdResult<()> {
    let usage = open_usage(dir)?;
    let rows = usage.get_query_log(limit).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!(rows
            .iter()
            .map(|r| json!({ "id": r.id, "query_text": r.query_text, "result_count": r.result_count, "at": r.at }))
            .collect::<Vec<_>>()));
    } else {
        for r in &rows {
            println!("{} ({} results) at {}", r.query_text, r.result_count, r.at);
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
