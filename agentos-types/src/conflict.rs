//! The [`Conflict`] entity and resolution types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Contradictory,
    Duplicate,
    Supersession,
    ScopeOverlap,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Unresolved,
    InProgress,
    Resolved,
    Dismissed,
}

/// Which analyzer produced a [`ConflictCandidate`] / [`Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    TagOverlap,
    Semantic,
    Supersession,
    RuleExtraction,
    Manual,
}

/// One memory's role in a conflict pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRole {
    Primary,
    Secondary,
}

/// Raw analyzer output, not yet persisted. The merger groups these by
/// sorted-pair hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCandidate {
    pub m1_id: String,
    pub m2_id: String,
    pub method: DetectionMethod,
    /// `[0, 1]`.
    pub raw_score: f64,
    pub evidence: Vec<String>,
}

impl ConflictCandidate {
    pub fn pair_hash(&self) -> String {
        crate::edge::pair_hash(&self.m1_id, &self.m2_id)
    }
}

/// A persisted, first-class detected relation between two memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub classification: ConflictType,
    pub detection_method: DetectionMethod,
    /// `[0, 1]`.
    pub confidence: f64,
    pub description: String,
    pub evidence: Vec<String>,
    pub status: ConflictStatus,
    pub m1_id: String,
    pub m2_id: String,
    pub m1_role: MemoryRole,
    pub m2_role: MemoryRole,
    pub resolution_action: Option<ResolutionAction>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub suppressed_until: Option<DateTime<Utc>>,
    pub scan_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Conflict {
    pub fn pair_hash(&self) -> String {
        crate::edge::pair_hash(&self.m1_id, &self.m2_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Deprecate,
    Merge,
    Clarify,
    Dismiss,
    Defer,
}

/// Request to close out a [`Conflict`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub conflict_id: String,
    pub action: ResolutionAction,
    pub target_memory_id: Option<String>,
    pub merged_content: Option<String>,
    pub reason: String,
    pub resolved_by: String,
}

/// Audit row written for every resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionLogEntry {
    pub conflict_id: String,
    pub actor: String,
    pub action: ResolutionAction,
    pub memories_modified: Vec<String>,
    pub memories_deprecated: Vec<String>,
    pub memories_created: Vec<String>,
    pub at: DateTime<Utc>,
}

/// One `conflict_scans` audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictScan {
    pub scan_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub methods: Vec<DetectionMethod>,
    pub candidates_found: u64,
    pub new_conflicts: u64,
    pub existing_conflicts: u64,
    pub is_incremental: bool,
    pub target_memory_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_pair_hash_matches_edge_pair_hash() {
        let c = ConflictCandidate {
            m1_id: "b".into(),
            m2_id: "a".into(),
            method: DetectionMethod::Semantic,
            raw_score: 0.9,
            evidence: vec![],
        };
        assert_eq!(c.pair_hash(), "a|b");
    }
}
