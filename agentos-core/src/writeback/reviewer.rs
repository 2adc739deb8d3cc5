//! Reviewer: validates a [`WriteProposal`], surfaces
//! conflict candidates without persisting them, and records the reviewer's
//! decision.

use agentos_types::{
    pair_hash, Confidence, ConflictCandidate, Memory, MemoryStatus, ProposalStatus, ProposalType,
    Scope, WriteProposal, MAX_MEMORY_TOKENS,
};
use thiserror::Error;

use crate::conflict::analyzers::{semantic_analyzer, tag_overlap_analyzer};
use crate::error::StoreError;
use crate::writeback::queue::ReviewQueue;

/// Safety factor over the 2000-token limit before the write-back word-count
/// heuristic rejects. Independent of the separate `char_count * 0.25`
/// boundary test used elsewhere for a quick token estimate.
const WORD_COUNT_SAFETY_FACTOR: f64 = 1.1;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("token count {0} exceeds the widened write-back limit")]
    TooManyTokens(u32),
    #[error("path `{0}` escapes the memory root")]
    PathEscapesRoot(String),
    #[error("tag `{0}` is not well-formed")]
    MalformedTag(String),
    #[error("scope `{0}` is not a legal value")]
    InvalidScope(String),
}

/// Word-count-based estimate widened by 10%, distinct from
/// `Memory::estimate_tokens_from_chars` used for context assembly.
pub fn estimate_tokens_from_words(content: &str) -> u32 {
    let words = content.split_whitespace().count() as f64;
    (words * 1.3).ceil() as u32
}

pub fn validate_proposal(proposal: &WriteProposal) -> Result<(), ValidationError> {
    let tokens = estimate_tokens_from_words(&proposal.content);
    let widened_limit = (MAX_MEMORY_TOKENS as f64 * WORD_COUNT_SAFETY_FACTOR) as u32;
    if tokens > widened_limit {
        return Err(ValidationError::TooManyTokens(tokens));
    }
    if proposal.target_path.contains("..") || proposal.target_path.starts_with('/') {
        return Err(ValidationError::PathEscapesRoot(proposal.target_path.clone()));
    }
    for tag in &proposal.tags {
        if tag.trim().is_empty() || tag.chars().any(char::is_whitespace) {
            return Err(ValidationError::MalformedTag(tag.clone()));
        }
    }
    if let Some(scope) = &proposal.scope {
        if !Scope::ALL.iter().any(|s| s.as_str() == scope) {
            return Err(ValidationError::InvalidScope(scope.clone()));
        }
    }
    Ok(())
}

/// Whether `proposal`'s estimated token count is within 10% of the widened
/// limit, logged as `near_limit` rather than rejected.
pub fn is_near_limit(proposal: &WriteProposal) -> bool {
    let tokens = estimate_tokens_from_words(&proposal.content);
    tokens > MAX_MEMORY_TOKENS && tokens <= (MAX_MEMORY_TOKENS as f64 * WORD_COUNT_SAFETY_FACTOR) as u32
}

/// Builds a transient `Memory` from proposal content for conflict-candidate
/// surfacing only; never persisted.
fn proposal_as_memory(proposal: &WriteProposal) -> Memory {
    Memory {
        id: format!("__proposal_{}", proposal.id),
        path: proposal.target_path.clone(),
        directory: proposal
            .target_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default(),
        title: proposal.target_path.clone(),
        body: proposal.content.clone(),
        scope: proposal
            .scope
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Scope::Global),
        priority: 0.5,
        confidence: Confidence::Experimental,
        status: MemoryStatus::Active,
        tags: proposal.tags.iter().cloned().collect(),
        token_count: estimate_tokens_from_words(&proposal.content),
        created_at: proposal.created_at,
        last_used_at: None,
        usage_count: 0,
        content_hash: String::new(),
        composite_embedding: None,
        directory_embedding: None,
        supersedes: Vec::new(),
        related: Vec::new(),
        expires_at: None,
    }
}

/// Surfaces conflict candidates between the proposed content and existing
/// memories, without touching the `ConflictStore`.
pub fn check_proposal(
    proposal: &WriteProposal,
    existing: &[Memory],
    tag_overlap_threshold: f64,
    semantic_threshold: f64,
) -> Vec<ConflictCandidate> {
    let synthetic = proposal_as_memory(proposal);
    let mut pool: Vec<Memory> = existing.to_vec();
    pool.push(synthetic.clone());

    let mut candidates: Vec<ConflictCandidate> = tag_overlap_analyzer(&pool, tag_overlap_threshold, 50)
        .into_iter()
        .chain(semantic_analyzer(&pool, semantic_threshold, 50))
        .filter(|c| c.m1_id == synthetic.id || c.m2_id == synthetic.id)
        .collect();
    candidates.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.dedup_by_key(|c| pair_hash(&c.m1_id, &c.m2_id));
    candidates
}

/// Confidence at/above which a proposal is auto-marked `in_review`
pub const AUTO_IN_REVIEW_CONFIDENCE: f64 = 0.8;

pub struct Reviewer<'a> {
    queue: &'a ReviewQueue,
}

impl<'a> Reviewer<'a> {
    pub fn new(queue: &'a ReviewQueue) -> Self {
        Reviewer { queue }
    }

    /// Runs validation and conflict surfacing; for `create`/`update`
    /// proposals with a high-confidence candidate, auto-transitions to
    /// `in_review` and returns the candidates found.
    pub fn intake(
        &self,
        proposal: &WriteProposal,
        existing: &[Memory],
        tag_overlap_threshold: f64,
        semantic_threshold: f64,
    ) -> Result<Vec<ConflictCandidate>, StoreError> {
        let candidates = match proposal.proposal_type {
            ProposalType::Create | ProposalType::Update => {
                check_proposal(proposal, existing, tag_overlap_threshold, semantic_threshold)
            }
            ProposalType::Deprecate | ProposalType::Promote => Vec::new(),
        };
        let auto_review = candidates.iter().any(|c| c.raw_score >= AUTO_IN_REVIEW_CONFIDENCE);
        if auto_review && proposal.status == ProposalStatus::Pending {
            self.queue.update_status(
                &proposal.id,
                ProposalStatus::InReview,
                Some(&format!("{} conflict candidate(s) at or above auto-review confidence", candidates.len())),
            )?;
        }
        Ok(candidates)
    }

    pub fn approve(&self, id: &str) -> Result<(), StoreError> {
        self.queue.update_status(id, ProposalStatus::Approved, None)
    }

    pub fn reject(&self, id: &str, reason: &str) -> Result<(), StoreError> {
        self.queue.update_status(id, ProposalStatus::Rejected, Some(reason))
    }

    /// Rewrites content and marks `modified`; the Committer still requires a
    /// subsequent `approve` before it will process the proposal.
    pub fn modify(&self, proposal: &WriteProposal, new_content: String, reason: &str) -> Result<(), StoreError> {
        let mut updated = proposal.clone();
        updated.content = new_content;
        updated.status = ProposalStatus::Modified;
        self.queue.update_proposal(&updated)?;
        self.queue.update_status(&proposal.id, ProposalStatus::Modified, Some(reason))
    }

    pub fn defer(&self, id: &str, reason: &str) -> Result<(), StoreError> {
        self.queue.update_status(id, ProposalStatus::Deferred, Some(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn proposal(content: &str) -> WriteProposal {
        WriteProposal {
            id: "p1".into(),
            proposal_type: ProposalType::Create,
            target_path: "global/new.md".into(),
            reason: "test".into(),
            content: content.into(),
            proposed_by: "agent-a".into(),
            retry_count: 0,
            status: ProposalStatus::Pending,
            commit_error: None,
            pre_image_hash: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            tags: vec!["rust".into()],
            scope: Some("global".into()),
        }
    }

    #[test]
    fn rejects_path_escaping_root() {
        let mut p = proposal("short body");
        p.target_path = "../etc/passwd".into();
        assert!(matches!(validate_proposal(&p), Err(ValidationError::PathEscapesRoot(_))));
    }

    #[test]
    fn widened_limit_accepts_up_to_2200_words() {
        let body = "word ".repeat(1690);
        let p = proposal(&body);
        assert!(validate_proposal(&p).is_ok());
        assert!(is_near_limit(&p) || estimate_tokens_from_words(&body) <= MAX_MEMORY_TOKENS);
    }

    #[test]
    fn rejects_well_beyond_widened_limit() {
        let body = "word ".repeat(5000);
        let p = proposal(&body);
        assert!(matches!(validate_proposal(&p), Err(ValidationError::TooManyTokens(_))));
    }

    #[test]
    fn check_proposal_finds_tag_overlap_with_existing_memory() {
        let existing = Memory {
            id: "m1".into(),
            path: "global/existing.md".into(),
            directory: "global".into(),
            title: "existing".into(),
            body: "b".into(),
            scope: Scope::Global,
            priority: 0.5,
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags: BTreeSet::from(["rust".to_string()]),
            token_count: 1,
            created_at: chrono::Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: "h".into(),
            composite_embedding: None,
            directory_embedding: None,
            supersedes: Vec::new(),
            related: Vec::new(),
            expires_at: None,
        };
        let p = proposal("body");
        let candidates = check_proposal(&p, &[existing], 0.5, 0.8);
        assert_eq!(candidates.len(), 1);
    }
}
