//! Leaf error types per subsystem, composed into [`agentos_types::AgentOsError`]
//! via `#[from]`: each subsystem's store/runtime keeps its own small
//! `thiserror` enum rather than reaching into the shared taxonomy directly.

use agentos_types::AgentOsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("join: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for AgentOsError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => AgentOsError::not_found("row", id),
            other => AgentOsError::StoreError(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("edge endpoint type mismatch for {edge_type}: expected {expected}")]
    EndpointMismatch {
        edge_type: String,
        expected: String,
    },
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("supersedes cycle detected through {0}")]
    SupersedesCycle(String),
}

impl From<GraphError> for AgentOsError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Store(s) => s.into(),
            GraphError::NodeNotFound(id) => AgentOsError::not_found("node", id),
            GraphError::SupersedesCycle(id) => {
                AgentOsError::Fatal(format!("SUPERSEDES cycle through {id}"))
            }
            GraphError::EndpointMismatch { edge_type, expected } => AgentOsError::validation(
                "edge_type",
                format!("{edge_type} requires endpoints of kind {expected}"),
            ),
        }
    }
}

impl From<crate::writeback::reviewer::ValidationError> for AgentOsError {
    fn from(e: crate::writeback::reviewer::ValidationError) -> Self {
        AgentOsError::validation("write_proposal", e.to_string())
    }
}

impl From<crate::writeback::committer::CommitError> for AgentOsError {
    fn from(e: crate::writeback::committer::CommitError) -> Self {
        match e {
            crate::writeback::committer::CommitError::StalePrecondition => {
                AgentOsError::stale("write proposal's pre-image hash no longer matches")
            }
            crate::writeback::committer::CommitError::Io(io) => {
                AgentOsError::Fatal(io.to_string())
            }
            crate::writeback::committer::CommitError::Store(s) => s.into(),
            crate::writeback::committer::CommitError::Graph(g) => g.into(),
        }
    }
}

impl From<crate::conflict::resolver::ResolveError> for AgentOsError {
    fn from(e: crate::conflict::resolver::ResolveError) -> Self {
        use crate::conflict::resolver::ResolveError;
        match e {
            ResolveError::ConflictNotFound(id) => AgentOsError::not_found("conflict", id),
            ResolveError::MemoryNotFound(id) => AgentOsError::not_found("memory", id),
            ResolveError::MissingMergedContent | ResolveError::MissingTarget => {
                AgentOsError::validation("resolution_request", e.to_string())
            }
            ResolveError::Store(s) => s.into(),
            ResolveError::Graph(g) => g.into(),
        }
    }
}

impl From<crate::runtime::self_mod::ApplyError> for AgentOsError {
    fn from(e: crate::runtime::self_mod::ApplyError) -> Self {
        use crate::runtime::self_mod::ApplyError;
        match e {
            ApplyError::NotFound(id) => AgentOsError::not_found("modification_proposal", id),
            ApplyError::NotApplicable(id) => {
                AgentOsError::stale(format!("proposal {id} is not in an applicable status"))
            }
            ApplyError::Write { .. } => AgentOsError::Fatal(e.to_string()),
        }
    }
}
