//! Self-modification proposal manager: submit, review,
//! approve/reject, apply, and revert source-level `ModificationProposal`s
//! against the filesystem, with synchronous lifecycle callbacks.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use agentos_types::selfmod::{
    assess_risk, touches_core_module, ModProposalStatus, ModificationProposal, ReviewResult,
};
use thiserror::Error;

pub type Callback = Box<dyn Fn(&ModificationProposal) + Send + Sync>;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("proposal {0} is not in an applicable status")]
    NotApplicable(String),
    #[error("proposal {0} not found")]
    NotFound(String),
    #[error("write failed for {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },
}

#[derive(Default)]
struct Callbacks {
    on_submit: Vec<Callback>,
    on_approve: Vec<Callback>,
    on_reject: Vec<Callback>,
    on_apply: Vec<Callback>,
    on_revert: Vec<Callback>,
}

fn fire(handlers: &[Callback], proposal: &ModificationProposal) {
    for handler in handlers {
        let handler: &(dyn Fn(&ModificationProposal) + Send + Sync) = handler.as_ref();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(proposal)));
    }
}

/// Root directory that `file_path` entries in a proposal's changes are
/// resolved against when applying or reverting.
pub struct ProposalManager {
    proposals: RwLock<Vec<ModificationProposal>>,
    callbacks: RwLock<Callbacks>,
    source_root: PathBuf,
}

impl ProposalManager {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        ProposalManager {
            proposals: RwLock::new(Vec::new()),
            callbacks: RwLock::new(Callbacks::default()),
            source_root: source_root.into(),
        }
    }

    pub fn on_submit(&self, handler: Callback) {
        self.callbacks.write().unwrap().on_submit.push(handler);
    }
    pub fn on_approve(&self, handler: Callback) {
        self.callbacks.write().unwrap().on_approve.push(handler);
    }
    pub fn on_reject(&self, handler: Callback) {
        self.callbacks.write().unwrap().on_reject.push(handler);
    }
    pub fn on_apply(&self, handler: Callback) {
        self.callbacks.write().unwrap().on_apply.push(handler);
    }
    pub fn on_revert(&self, handler: Callback) {
        self.callbacks.write().unwrap().on_revert.push(handler);
    }

    /// Assesses risk, sets status to `pending_review` (or straight to
    /// `approved` for a low-risk proposal with no blocking requirement),
    /// stores the proposal, and fires `on_submit`/`on_approve`.
    pub fn submit(&self, mut proposal: ModificationProposal, require_tests: bool, tests_attached: bool) {
        let core_touch = proposal.changes.iter().any(|c| touches_core_module(&c.file_path));
        proposal.risk_level = assess_risk(core_touch, &proposal.changes);

        let auto_approve = proposal.risk_level == agentos_types::selfmod::RiskLevel::Low
            && (!require_tests || tests_attached);

        proposal.status = if auto_approve {
            ModProposalStatus::Approved
        } else {
            ModProposalStatus::PendingReview
        };

        let snapshot = proposal.clone();
        self.proposals.write().unwrap().push(proposal);
        fire(&self.callbacks.read().unwrap().on_submit, &snapshot);
        if auto_approve {
            fire(&self.callbacks.read().unwrap().on_approve, &snapshot);
        }
    }

    /// Seeds the in-memory proposal set from durable storage, replacing
    /// whatever is currently held. Used by callers that persist proposals
    /// externally (e.g. via `AgentOsStore`) and need a fresh `ProposalManager`
    /// to pick up where a prior process left off.
    pub fn hydrate(&self, proposals: Vec<ModificationProposal>) {
        *self.proposals.write().unwrap() = proposals;
    }

    pub fn get(&self, id: &str) -> Option<ModificationProposal> {
        self.proposals.read().unwrap().iter().find(|p| p.id == id).cloned()
    }

    pub fn list_by_status(&self, status: ModProposalStatus) -> Vec<ModificationProposal> {
        self.proposals
            .read()
            .unwrap()
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect()
    }

    /// Moves a `pending_review` proposal to `in_review` so reviewers can
    /// attach [`ReviewResult`]s.
    pub fn start_review(&self, id: &str) -> Result<(), ApplyError> {
        let mut proposals = self.proposals.write().unwrap();
        let proposal = proposals.iter_mut().find(|p| p.id == id).ok_or_else(|| ApplyError::NotFound(id.into()))?;
        if proposal.status != ModProposalStatus::PendingReview {
            return Err(ApplyError::NotApplicable(id.into()));
        }
        proposal.status = ModProposalStatus::InReview;
        Ok(())
    }

    /// Attaches a review and, once [`ModificationProposal::meets_approval_bar`]
    /// holds, transitions to `approved`; a blocking comment transitions
    /// straight to `rejected`.
    pub fn record_review(&self, id: &str, review: ReviewResult) -> Result<(), ApplyError> {
        let (snapshot, approved, rejected) = {
            let mut proposals = self.proposals.write().unwrap();
            let proposal =
                proposals.iter_mut().find(|p| p.id == id).ok_or_else(|| ApplyError::NotFound(id.into()))?;
            if !matches!(proposal.status, ModProposalStatus::PendingReview | ModProposalStatus::InReview) {
                return Err(ApplyError::NotApplicable(id.into()));
            }
            let is_blocking = review.is_blocking();
            proposal.reviews.push(review);
            if is_blocking {
                proposal.status = ModProposalStatus::Rejected;
            } else if proposal.meets_approval_bar() {
                proposal.status = ModProposalStatus::Approved;
            }
            (
                proposal.clone(),
                proposal.status == ModProposalStatus::Approved,
                proposal.status == ModProposalStatus::Rejected,
            )
        };
        if approved {
            fire(&self.callbacks.read().unwrap().on_approve, &snapshot);
        }
        if rejected {
            fire(&self.callbacks.read().unwrap().on_reject, &snapshot);
        }
        Ok(())
    }

    pub fn reject(&self, id: &str) -> Result<(), ApplyError> {
        let snapshot = {
            let mut proposals = self.proposals.write().unwrap();
            let proposal =
                proposals.iter_mut().find(|p| p.id == id).ok_or_else(|| ApplyError::NotFound(id.into()))?;
            proposal.status = ModProposalStatus::Rejected;
            proposal.clone()
        };
        fire(&self.callbacks.read().unwrap().on_reject, &snapshot);
        Ok(())
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        self.source_root.join(file_path)
    }

    /// Writes each change's `modified_code` in declared order. Stops at the
    /// first failure and marks the proposal `failed_apply`, leaving earlier
    /// writes in place.
    pub fn apply(&self, id: &str) -> Result<(), ApplyError> {
        let proposal = self.get(id).ok_or_else(|| ApplyError::NotFound(id.into()))?;
        if proposal.status != ModProposalStatus::Approved {
            return Err(ApplyError::NotApplicable(id.into()));
        }

        for change in &proposal.changes {
            let path = self.resolve(&change.file_path);
            if let Err(source) = write_file(&path, &change.modified_code) {
                self.mark_status(id, ModProposalStatus::FailedApply);
                return Err(ApplyError::Write { path: change.file_path.clone(), source });
            }
        }

        let snapshot = self.mark_status(id, ModProposalStatus::Applied);
        if let Some(snapshot) = snapshot {
            fire(&self.callbacks.read().unwrap().on_apply, &snapshot);
        }
        Ok(())
    }

    /// Writes each change's `original_code` back in reverse order. Only
    /// valid from `applied`.
    pub fn revert(&self, id: &str) -> Result<(), ApplyError> {
        let proposal = self.get(id).ok_or_else(|| ApplyError::NotFound(id.into()))?;
        if proposal.status != ModProposalStatus::Applied {
            return Err(ApplyError::NotApplicable(id.into()));
        }

        for change in proposal.changes.iter().rev() {
            let path = self.resolve(&change.file_path);
            write_file(&path, &change.original_code)
                .map_err(|source| ApplyError::Write { path: change.file_path.clone(), source })?;
        }

        let snapshot = self.mark_status(id, ModProposalStatus::Reverted);
        if let Some(snapshot) = snapshot {
            fire(&self.callbacks.read().unwrap().on_revert, &snapshot);
        }
        Ok(())
    }

    fn mark_status(&self, id: &str, status: ModProposalStatus) -> Option<ModificationProposal> {
        let mut proposals = self.proposals.write().unwrap();
        let proposal = proposals.iter_mut().find(|p| p.id == id)?;
        proposal.status = status;
        Some(proposal.clone())
    }
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::selfmod::{ChangeType, CodeChange, ReviewVerdict, RiskLevel};
    use chrono::Utc;

    fn proposal(id: &str, changes: Vec<CodeChange>) -> ModificationProposal {
        ModificationProposal {
            id: id.into(),
            title: "t".into(),
            description: "d".into(),
            author: "agent-a".into(),
            changes,
            risk_level: RiskLevel::Low,
            required_approvals: 1,
            reviews: Vec::new(),
            status: ModProposalStatus::Draft,
            created_at: Utc::now(),
        }
    }

    fn change(path: &str, original: &str, modified: &str) -> CodeChange {
        CodeChange {
            file_path: path.into(),
            original_code: original.into(),
            modified_code: modified.into(),
            change_type: ChangeType::ModifyFunction,
            element_name: Some("foo".into()),
        }
    }

    #[test]
    fn low_risk_no_tests_required_auto_approves() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProposalManager::new(dir.path());
        let p = proposal("p1", vec![change("src/foo.rs", "old", "new")]);
        manager.submit(p, false, false);
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::Approved);
    }

    #[test]
    fn core_module_touch_requires_review() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProposalManager::new(dir.path());
        let p = proposal("p1", vec![change("src/core/engine.rs", "old", "new")]);
        manager.submit(p, false, false);
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::PendingReview);
    }

    #[test]
    fn blocking_comment_rejects_outright() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProposalManager::new(dir.path());
        let p = proposal("p1", vec![change("src/core/engine.rs", "old", "new")]);
        manager.submit(p, false, false);
        manager.start_review("p1").unwrap();
        manager
            .record_review(
                "p1",
                ReviewResult { reviewer: "r1".into(), verdict: ReviewVerdict::BlockingComment, comment: Some("no".into()), at: Utc::now() },
            )
            .unwrap();
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::Rejected);
    }

    #[test]
    fn apply_then_revert_round_trips_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProposalManager::new(dir.path());
        let p = proposal("p1", vec![change("foo.txt", "original", "modified")]);
        manager.submit(p, false, false);
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::Approved);

        manager.apply("p1").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("foo.txt")).unwrap(), "modified");
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::Applied);

        manager.revert("p1").unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("foo.txt")).unwrap(), "original");
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::Reverted);
    }

    #[test]
    fn apply_stops_at_first_failure_keeping_earlier_writes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ProposalManager::new(dir.path());
        let bad = change("", "old", "new");
        let good = change("a.txt", "old", "written");
        let p = proposal("p1", vec![good, bad]);
        manager.submit(p, false, false);
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::Approved);

        let result = manager.apply("p1");
        assert!(result.is_err());
        assert!(dir.path().join("a.txt").exists());
        assert_eq!(manager.get("p1").unwrap().status, ModProposalStatus::FailedApply);
    }
}
