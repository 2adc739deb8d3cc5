//! The [`ModificationProposal`] (self-modification) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    AddFunction,
    ModifyFunction,
    DeleteFunction,
    AddClass,
    ModifyClass,
    DeleteClass,
    Other,
}

impl ChangeType {
    /// Deleting a function or class bumps risk to a floor of `HIGH`.
    pub fn is_deletion(&self) -> bool {
        matches!(self, ChangeType::DeleteFunction | ChangeType::DeleteClass)
    }
}

/// A single file-level edit inside a [`ModificationProposal`]. Carries full
/// pre/post-image text, not an AST — any static analysis is external
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChange {
    pub file_path: String,
    pub original_code: String,
    pub modified_code: String,
    pub change_type: ChangeType,
    pub element_name: Option<String>,
}

impl CodeChange {
    pub fn lines_changed(&self) -> usize {
        let before = self.original_code.lines().count();
        let after = self.modified_code.lines().count();
        before.max(after)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    BlockingComment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub reviewer: String,
    pub verdict: ReviewVerdict,
    pub comment: Option<String>,
    pub at: DateTime<Utc>,
}

impl ReviewResult {
    pub fn is_blocking(&self) -> bool {
        self.verdict == ReviewVerdict::BlockingComment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModProposalStatus {
    Draft,
    PendingReview,
    InReview,
    Approved,
    Rejected,
    Applied,
    Reverted,
    FailedApply,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationProposal {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub changes: Vec<CodeChange>,
    pub risk_level: RiskLevel,
    pub required_approvals: u32,
    pub reviews: Vec<ReviewResult>,
    pub status: ModProposalStatus,
    pub created_at: DateTime<Utc>,
}

impl ModificationProposal {
    pub fn approvals_count(&self) -> u32 {
        self.reviews
            .iter()
            .filter(|r| r.verdict == ReviewVerdict::Approve)
            .count() as u32
    }

    pub fn has_blocking_comment(&self) -> bool {
        self.reviews.iter().any(ReviewResult::is_blocking)
    }

    /// `approved` iff approvals >= required AND zero blocking comments
    pub fn meets_approval_bar(&self) -> bool {
        self.approvals_count() >= self.required_approvals && !self.has_blocking_comment()
    }
}

/// Deterministic risk assessment at submit time.
pub fn assess_risk(touches_core_module: bool, changes: &[CodeChange]) -> RiskLevel {
    let mut level = RiskLevel::Low;

    if touches_core_module {
        level = bump(level);
    }

    let total_lines: usize = changes.iter().map(CodeChange::lines_changed).sum();
    if total_lines > 200 {
        level = bump(level);
    }

    if changes.iter().any(ChangeType::is_deletion)
        || changes
            .iter()
            .any(|c| matches!(c.change_type, ChangeType::DeleteClass | ChangeType::DeleteFunction))
    {
        level = level.max(RiskLevel::High);
    }

    level
}

fn bump(level: RiskLevel) -> RiskLevel {
    match level {
        RiskLevel::Low => RiskLevel::Medium,
        RiskLevel::Medium => RiskLevel::High,
        RiskLevel::High => RiskLevel::Critical,
        RiskLevel::Critical => RiskLevel::Critical,
    }
}

/// A file path that counts as "touching a core module" for risk assessment
pub fn touches_core_module(path: &str) -> bool {
    path.contains("/core/") || path.starts_with("core/") || path.ends_with("__init__.py")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(change_type: ChangeType, lines: usize) -> CodeChange {
        CodeChange {
            file_path: "src/foo.rs".into(),
            original_code: "x".repeat(lines),
            modified_code: String::new(),
            change_type,
            element_name: Some("foo".into()),
        }
    }

    #[test]
    fn deletion_floors_at_high() {
        let changes = vec![change(ChangeType::DeleteFunction, 1)];
        assert_eq!(assess_risk(false, &changes), RiskLevel::High);
    }

    #[test]
    fn core_module_bumps_one_level() {
        assert!(touches_core_module("src/core/graph.rs"));
        assert!(touches_core_module("pkg/__init__.py"));
        assert_eq!(assess_risk(true, &[]), RiskLevel::Medium);
    }

    #[test]
    fn large_diff_bumps_one_level() {
        let lines: Vec<String> = (0..250).map(|i| i.to_string()).collect();
        let changes = vec![CodeChange {
            file_path: "src/foo.rs".into(),
            original_code: String::new(),
            modified_code: lines.join("\n"),
            change_type: ChangeType::ModifyFunction,
            element_name: None,
        }];
        assert_eq!(assess_risk(false, &changes), RiskLevel::Medium);
    }

    #[test]
    fn approval_bar_requires_no_blocking_comments() {
        let mut p = ModificationProposal {
            id: "p1".into(),
            title: "t".into(),
            description: "d".into(),
            author: "a".into(),
            changes: vec![],
            risk_level: RiskLevel::Low,
            required_approvals: 1,
            reviews: vec![ReviewResult {
                reviewer: "r1".into(),
                verdict: ReviewVerdict::Approve,
                comment: None,
                at: Utc::now(),
            }],
            status: ModProposalStatus::PendingReview,
            created_at: Utc::now(),
        };
        assert!(p.meets_approval_bar());
        p.reviews.push(ReviewResult {
            reviewer: "r2".into(),
            verdict: ReviewVerdict::BlockingComment,
            comment: Some("no".into()),
            at: Utc::now(),
        });
        assert!(!p.meets_approval_bar());
    }
}
