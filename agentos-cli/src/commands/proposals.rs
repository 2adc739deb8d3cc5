//! `agentos proposals` — submit and push write-back proposals through the
//! queue/review/commit pipeline.

use agentos_core::conflict::ConflictStore;
use agentos_core::graph::GraphStore;
use agentos_core::memory_store::MemoryStore;
use agentos_core::writeback::{Committer, Reviewer, ReviewQueue};
use agentos_types::{AgentOsError, ProposalStatus, ProposalType, WriteProposal};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::embedder::HashEmbedder;
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum ProposalsCommand {
    /// Submit a new proposal.
    Propose(ProposeArgs),
    /// List proposals, optionally filtered by status.
    List { #[arg(long)] status: Option<String> },
    /// Show one proposal in full.
    Show { id: String },
    /// Approve a proposal (must still be pending/in-review).
    Approve { id: String },
    /// Reject a proposal.
    Reject { id: String, #[arg(long)] reason: String },
    /// Rewrite content and mark `modified`.
    Modify { id: String, #[arg(long)] content: String, #[arg(long)] reason: String },
    /// Defer a proposal.
    Defer { id: String, #[arg(long)] reason: String },
    /// Write every approved proposal to disk and re-index it.
    Commit { #[arg(long, default_value_t = 20)] limit: u32 },
    /// Review-log history for one proposal.
    History { id: String },
}

#[derive(Debug, Args)]
pub struct ProposeArgs {
    #[arg(long = "type", default_value = "create")]
    proposal_type: String,
    #[arg(long)]
    target_path: String,
    #[arg(long)]
    reason: String,
    #[arg(long)]
    content: String,
    #[arg(long, default_value = "cli")]
    proposed_by: String,
    #[arg(long)]
    tag: Vec<String>,
    #[arg(long)]
    scope: Option<String>,
}

fn parse_enum<T: DeserializeOwned>(field: &'static str, s: &str) -> CmdResult<T> {
    serde_json::from_value(json!(s)).map_err(|_| AgentOsError::validation(field, format!("unrecognized value `{s}`")))
}

fn open_queue(dir: &DataDir) -> CmdResult<ReviewQueue> {
    dir.ensure_index_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    ReviewQueue::open(dir.review_queue_db()).map_err(AgentOsError::from)
}

pub async fn run(dir: &DataDir, json_out: bool, cmd: ProposalsCommand) -> CmdResult<()> {
    match cmd {
        ProposalsCommand::Propose(args) => propose(dir, json_out, args),
        ProposalsCommand::List { status } => list(dir, json_out, status),
        ProposalsCommand::Show { id } => show(dir, json_out, &id),
        ProposalsCommand::Approve { id } => {
            let queue = open_queue(dir)?;
            Reviewer::new(&queue).approve(&id)?;
            ok(json_out, &id);
            Ok(())
        }
        ProposalsCommand::Reject { id, reason } => {
            let queue = open_queue(dir)?;
            Reviewer::new(&queue).reject(&id, &reason)?;
            ok(json_out, &id);
            Ok(())
        }
        ProposalsCommand::Modify { id, content, reason } => {
            let queue = open_queue(dir)?;
            let proposal = queue.get(&id).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("proposal", &id))?;
            Reviewer::new(&queue).modify(&proposal, content, &reason)?;
            ok(json_out, &id);
            Ok(())
        }
        ProposalsCommand::Defer { id, reason } => {
            let queue = open_queue(dir)?;
            Reviewer::new(&queue).defer(&id, &reason)?;
            ok(json_out, &id);
            Ok(())
        }
        ProposalsCommand::Commit { limit } => commit(dir, json_out, limit).await,
        ProposalsCommand::History { id } => history(dir, json_out, &id),
    }
}

fn propose(dir: &DataDir, json_out: bool, args: ProposeArgs) -> CmdResult<()> {
    let queue = open_queue(dir)?;
    let memories = MemoryStore::open(dir.embeddings_db())?;
    let proposal_type: ProposalType = parse_enum("type", &args.proposal_type)?;

    let pre_image_hash = memories
        .get_by_path(&args.target_path)?
        .map(|m| m.content_hash);

    let proposal = WriteProposal {
        id: format!("proposal_{}", uuid::Uuid::new_v4()),
        proposal_type,
        target_path: args.target_path,
        reason: args.reason,
        content: args.content,
        proposed_by: args.proposed_by,
        retry_count: 0,
        status: ProposalStatus::Pending,
        commit_error: None,
        pre_image_hash,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        tags: args.tag,
        scope: args.scope,
    };

    agentos_core::writeback::validate_proposal(&proposal).map_err(AgentOsError::from)?;
    queue.enqueue(&proposal).map_err(AgentOsError::from)?;

    let existing = memories.list_all()?;
    let candidates = Reviewer::new(&queue).intake(&proposal, &existing, 0.5, 0.8)?;

    if json_out {
        print_json(&json!({ "id": proposal.id, "conflict_candidates": candidates.len() }));
    } else {
        println!("proposed {} ({} conflict candidate(s))", proposal.id, candidates.len());
    }
    Ok(())
}

fn list(dir: &DataDir, json_out: bool, status: Option<String>) -> CmdResult<()> {
    let queue = open_queue(dir)?;
    let status_filter: Option<ProposalStatus> = status.as_deref().map(|s| parse_enum("status", s)).transpose()?;
    let rows = match status_filter {
        Some(s) => queue.get_by_status(s, 500).map_err(AgentOsError::from)?,
        None => queue.get_pending(500).map_err(AgentOsError::from)?,
    };
    if json_out {
        print_json(&json!(rows));
    } else {
        for p in &rows {
            println!("{} [{:?}] {} ({})", p.id, p.status, p.target_path, p.reason);
        }
    }
    Ok(())
}

fn show(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let queue = open_queue(dir)?;
    let proposal = queue.get(id).map_err(AgentOsError::from)?.ok_or_else(|| AgentOsError::not_found("proposal", id))?;
    if json_out {
        print_json(&serde_json::to_value(&proposal).unwrap_or(serde_json::Value::Null));
    } else {
        println!("{proposal:#?}");
    }
    Ok(())
}

async fn commit(dir: &DataDir, json_out: bool, limit: u32) -> CmdResult<()> {
    let queue = open_queue(dir)?;
    let memories = MemoryStore::open(dir.embeddings_db())?;
    dir.ensure_knowledge_graph_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    let graph = GraphStore::open(dir.knowledge_graph_db())?;
    let conflicts = ConflictStore::open(dir.conflicts_db())?;

    let committer = Committer::new(&queue, &memories, &graph, &conflicts, dir.memory_root(), 3);
    let extractor_settings = agentos_config::ExtractorSettings::default();
    let embedder = HashEmbedder;

    let results = committer
        .process_pending(
            &embedder,
            &extractor_settings,
            limit,
            || format!("scan_{}", uuid::Uuid::new_v4()),
            || format!("conflict_{}", uuid::Uuid::new_v4()),
        )
        .await
        .map_err(AgentOsError::from)?;

    let committed = results.iter().filter(|(_, r)| r.is_ok()).count();
    let failed = results.len() - committed;

    if json_out {
        print_json(&json!({
            "committed": committed,
            "failed": failed,
            "results": results.iter().map(|(id, r)| json!({ "id": id, "ok": r.is_ok() })).collect::<Vec<_>>(),
        }));
    } else {
        for (id, result) in &results {
            match result {
                Ok(()) => println!("{id}: committed"),
                Err(e) => println!("{id}: failed ({e})"),
            }
        }
        println!("{committed} committed, {failed} failed");
    }
    Ok(())
}

fn history(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let queue = open_queue(dir)?;
    let log = queue.get_history(id).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!(log));
    } else {
        for entry in &log {
            println!("{:?} -> {:?} at {} ({})", entry.from_status, entry.to_status, entry.at, entry.notes.as_deref().unwrap_or(""));
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
