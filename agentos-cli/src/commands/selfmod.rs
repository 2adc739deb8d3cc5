//! `agentos selfmod` — submit, review, approve, apply, and revert
//! source-level modification proposals.
//!
//! The CLI has no long-lived process, so every invocation rehydrates a
//! fresh `ProposalManager` from the audit trail in `AgentOsStore` and
//! persists a new row after any mutation.

use agentos_core::runtime::self_mod::ProposalManager;
use agentos_core::runtime::store::AgentOsStore;
use agentos_types::selfmod::{
    ChangeType, CodeChange, ModProposalStatus, ModificationProposal, ReviewResult, ReviewVerdict,
};
use agentos_types::AgentOsError;
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::commands::CmdResult;
use crate::data_dir::DataDir;
use crate::output::print_json;

#[derive(Debug, Subcommand)]
pub enum SelfmodCommand {
    /// Submit a new modification proposal.
    Submit(SubmitArgs),
    /// List proposals, optionally filtered by status.
    List { #[arg(long)] status: Option<String> },
    /// Show one proposal's latest recorded state.
    Show { id: String },
    /// Audit history for one proposal.
    History { id: String },
    /// Move a proposal from pending_review to in_review.
    StartReview { id: String },
    /// Attach a review verdict.
    Review(ReviewArgs),
    /// Reject a proposal outright.
    Reject { id: String },
    /// Apply an approved proposal's changes to disk.
    Apply { id: String },
    /// Revert an applied proposal's changes.
    Revert { id: String },
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    description: String,
    #[arg(long)]
    author: String,
    #[arg(long, default_value_t = 1)]
    required_approvals: u32,
    #[arg(long)]
    file: String,
    #[arg(long)]
    original: String,
    #[arg(long)]
    modified: String,
    #[arg(long = "change-type", default_value = "modify_function")]
    change_type: String,
    #[arg(long)]
    element: Option<String>,
    #[arg(long)]
    require_tests: bool,
    #[arg(long)]
    tests_attached: bool,
}

#[derive(Debug, Args)]
pub struct ReviewArgs {
    id: String,
    #[arg(long)]
    reviewer: String,
    #[arg(long)]
    verdict: String,
    #[arg(long)]
    comment: Option<String>,
}

fn parse_enum<T: DeserializeOwned>(field: &'static str, s: &str) -> CmdResult<T> {
    serde_json::from_value(json!(s)).map_err(|_| AgentOsError::validation(field, format!("unrecognized value `{s}`")))
}

fn open_store(dir: &DataDir) -> CmdResult<AgentOsStore> {
    dir.ensure_index_dir().map_err(|e| AgentOsError::Fatal(e.to_string()))?;
    AgentOsStore::open(dir.agentos_db()).map_err(AgentOsError::from)
}

fn hydrated(dir: &DataDir) -> CmdResult<(AgentOsStore, ProposalManager)> {
    let store = open_store(dir)?;
    let manager = ProposalManager::new(dir.memory_root());
    let latest = store.list_latest_modifications().map_err(AgentOsError::from)?;
    manager.hydrate(latest);
    Ok((store, manager))
}

fn persist(store: &AgentOsStore, manager: &ProposalManager, id: &str) -> CmdResult<()> {
    let proposal = manager.get(id).ok_or_else(|| AgentOsError::not_found("proposal", id))?;
    store.save_modification(&proposal).map_err(AgentOsError::from)
}

pub fn run(dir: &DataDir, json_out: bool, cmd: SelfmodCommand) -> CmdResult<()> {
    match cmd {
        SelfmodCommand::Submit(args) => submit(dir, json_out, args),
        SelfmodCommand::List { status } => list(dir, json_out, status),
        SelfmodCommand::Show { id } => show(dir, json_out, &id),
        SelfmodCommand::History { id } => history(dir, json_out, &id),
        SelfmodCommand::StartReview { id } => {
            let (store, manager) = hydrated(dir)?;
            manager.start_review(&id)?;
            persist(&store, &manager, &id)?;
            ok(json_out, &id);
            Ok(())
        }
        SelfmodCommand::Review(args) => review(dir, json_out, args),
        SelfmodCommand::Reject { id } => {
            let (store, manager) = hydrated(dir)?;
            manager.reject(&id)?;
            persist(&store, &manager, &id)?;
            ok(json_out, &id);
            Ok(())
        }
        SelfmodCommand::Apply { id } => {
            let (store, manager) = hydrated(dir)?;
            manager.apply(&id)?;
            persist(&store, &manager, &id)?;
            ok(json_out, &id);
            Ok(())
        }
        SelfmodCommand::Revert { id } => {
            let (store, manager) = hydrated(dir)?;
            manager.revert(&id)?;
            persist(&store, &manager, &id)?;
            ok(json_out, &id);
            Ok(())
        }
    }
}

fn submit(dir: &DataDir, json_out: bool, args: SubmitArgs) -> CmdResult<()> {
    let (store, manager) = hydrated(dir)?;
    let change_type: ChangeType = parse_enum("change-type", &args.change_type)?;
    let id = format!("modprop_{}", uuid::Uuid::new_v4());

    let proposal = ModificationProposal {
        id: id.clone(),
        title: args.title,
        description: args.description,
        author: args.author,
        changes: vec![CodeChange {
            file_path: args.file,
            original_code: args.original,
            modified_code: args.modified,
            change_type,
            element_name: args.element,
        }],
        risk_level: agentos_types::selfmod::RiskLevel::Low,
        required_approvals: args.required_approvals,
        reviews: Vec::new(),
        status: ModProposalStatus::Draft,
        created_at: Utc::now(),
    };

    manager.submit(proposal, args.require_tests, args.tests_attached);
    persist(&store, &manager, &id)?;

    let status = manager.get(&id).map(|p| p.status);
    if json_out {
        print_json(&json!({ "id": id, "status": status }));
    } else {
        println!("submitted {id} -> {status:?}");
    }
    Ok(())
}

fn list(dir: &DataDir, json_out: bool, status: Option<String>) -> CmdResult<()> {
    let (_, manager) = hydrated(dir)?;
    let status_filter: Option<ModProposalStatus> = status.as_deref().map(|s| parse_enum("status", s)).transpose()?;
    let rows: Vec<ModificationProposal> = match status_filter {
        Some(s) => manager.list_by_status(s),
        None => {
            use ModProposalStatus::*;
            [Draft, PendingReview, InReview, Approved, Rejected, Applied, Reverted, FailedApply]
                .into_iter()
                .flat_map(|s| manager.list_by_status(s))
                .collect()
        }
    };
    if json_out {
        print_json(&json!(rows));
    } else {
        for p in &rows {
            println!("{} [{:?}] {} ({:?})", p.id, p.status, p.title, p.risk_level);
        }
    }
    Ok(())
}

fn show(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let (_, manager) = hydrated(dir)?;
    let proposal = manager.get(id).ok_or_else(|| AgentOsError::not_found("proposal", id))?;
    if json_out {
        print_json(&serde_json::to_value(&proposal).unwrap_or(serde_json::Value::Null));
    } else {
        println!("{proposal:#?}");
    }
    Ok(())
}

fn history(dir: &DataDir, json_out: bool, id: &str) -> CmdResult<()> {
    let store = open_store(dir)?;
    let rows = store.get_modification_history(id).map_err(AgentOsError::from)?;
    if json_out {
        print_json(&json!(rows));
    } else {
        for p in &rows {
            println!("{:?} at {}", p.status, p.created_at);
        }
    }
    Ok(())
}

fn review(dir: &DataDir, json_out: bool, args: ReviewArgs) -> CmdResult<()> {
    let (store, manager) = hydrated(dir)?;
    let verdict: ReviewVerdict = parse_enum("verdict", &args.verdict)?;
    manager.record_review(
        &args.id,
        ReviewResult { reviewer: args.reviewer, verdict, comment: args.comment, at: Utc::now() },
    )?;
    persist(&store, &manager, &args.id)?;
    ok(json_out, &args.id);
    Ok(())
}

fn ok(json_out: bool, id: &str) {
    if json_out {
        print_json(&json!({ "ok": true, "id": id }));
    } else {
        println!("ok: {id}");
    }
}
