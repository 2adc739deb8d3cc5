//! Write-back pipeline: gates mutations of the memory store
//! through a queue → review → commit chain with retry.

pub mod committer;
pub mod queue;
pub mod reviewer;

pub use committer::{CommitError, Committer};
pub use queue::{QueueStats, ReviewQueue};
pub use reviewer::{
    check_proposal, estimate_tokens_from_words, is_near_limit, validate_proposal, Reviewer,
    ValidationError, AUTO_IN_REVIEW_CONFIDENCE,
};
