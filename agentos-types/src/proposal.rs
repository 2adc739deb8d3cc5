//! The [`WriteProposal`] entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    Create,
    Update,
    Deprecate,
    Promote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    InReview,
    Approved,
    Committed,
    Rejected,
    Modified,
    Deferred,
    Failed,
}

impl ProposalStatus {
    /// Terminal statuses may not transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Committed | ProposalStatus::Rejected | ProposalStatus::Failed
        )
    }

    /// Statuses that count toward the "at most one {pending, in_review,
    /// approved} proposal per path" invariant.
    pub fn blocks_new_proposal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Pending | ProposalStatus::InReview | ProposalStatus::Approved
        )
    }
}

/// A pending mutation of the memory store, awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteProposal {
    pub id: String,
    pub proposal_type: ProposalType,
    pub target_path: String,
    pub reason: String,
    /// Full content for `create`, or a unified-diff-style patch for `update`.
    pub content: String,
    pub proposed_by: String,
    pub retry_count: u32,
    pub status: ProposalStatus,
    pub commit_error: Option<String>,
    /// File hash recorded at enqueue time; the committer's stale-precondition
    /// check compares this against the current file hash before writing.
    pub pre_image_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub scope: Option<String>,
}

/// An immutable append to `review_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub proposal_id: String,
    pub from_status: Option<ProposalStatus>,
    pub to_status: ProposalStatus,
    pub notes: Option<String>,
    pub at: DateTime<Utc>,
}

/// Default cap on commit retries before a proposal stays `failed` permanently
pub const DEFAULT_MAX_RETRIES: u32 = 3;
