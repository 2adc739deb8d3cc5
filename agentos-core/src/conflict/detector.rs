//! Detector orchestration: runs the
//! requested analyzers over a memory set, then hands candidates to the merger.

use std::collections::HashMap;

use agentos_types::{ConflictCandidate, ConflictScan, DetectionMethod, Memory, MemoryStatus, Scope};
use chrono::{Duration, Utc};

use crate::conflict::analyzers::{semantic_analyzer, supersession_analyzer, tag_overlap_analyzer};
use crate::conflict::merger::{MergeOutcome, Merger};
use crate::conflict::store::ConflictStore;
use crate::error::StoreError;

const DEFAULT_MAX_CANDIDATES_PER_METHOD: usize = 200;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub methods: Vec<DetectionMethod>,
    pub tag_overlap_threshold: f64,
    pub semantic_threshold: f64,
    pub exclude_deprecated: bool,
    pub exclude_ephemeral_pairs: bool,
    /// `Some(id)` for an incremental single-target scan; `None` for a full scan.
    pub target_memory_id: Option<String>,
}

impl Default for ScanRequest {
    fn default() -> Self {
        ScanRequest {
            methods: vec![DetectionMethod::TagOverlap, DetectionMethod::Semantic, DetectionMethod::Supersession],
            tag_overlap_threshold: 0.5,
            semantic_threshold: 0.8,
            exclude_deprecated: true,
            exclude_ephemeral_pairs: true,
            target_memory_id: None,
        }
    }
}

pub struct Detector<'a> {
    conflicts: &'a ConflictStore,
    staleness_threshold: Duration,
}

impl<'a> Detector<'a> {
    pub fn new(conflicts: &'a ConflictStore, staleness_threshold: Duration) -> Self {
        Detector { conflicts, staleness_threshold }
    }

    /// Runs a scan per `request` over `memories`, persists a `conflict_scans`
    /// audit row, and returns the merge outcome.
    pub fn scan(
        &self,
        memories: &[Memory],
        request: &ScanRequest,
        scan_id: impl Into<String>,
        next_conflict_id: impl Fn() -> String,
    ) -> Result<MergeOutcome, StoreError> {
        let scan_id = scan_id.into();
        let started_at = Utc::now();

        let pool: Vec<Memory> = memories
            .iter()
            .filter(|m| !(request.exclude_deprecated && m.status == MemoryStatus::Deprecated))
            .filter(|m| match &request.target_memory_id {
                Some(id) => &m.id == id,
                None => true,
            })
            .cloned()
            .collect();

        let scope_pool: Vec<Memory> = if request.target_memory_id.is_some() {
            memories.to_vec()
        } else {
            pool.clone()
        };

        let mut candidates = Vec::new();
        for method in &request.methods {
            let found = match method {
                DetectionMethod::TagOverlap => {
                    tag_overlap_analyzer(&scope_pool, request.tag_overlap_threshold, DEFAULT_MAX_CANDIDATES_PER_METHOD)
                }
                DetectionMethod::Semantic => {
                    semantic_analyzer(&scope_pool, request.semantic_threshold, DEFAULT_MAX_CANDIDATES_PER_METHOD)
                }
                DetectionMethod::Supersession => supersession_analyzer(&scope_pool, DEFAULT_MAX_CANDIDATES_PER_METHOD),
                DetectionMethod::RuleExtraction | DetectionMethod::Manual => Vec::new(),
            };
            candidates.extend(found);
        }

        if request.exclude_ephemeral_pairs {
            let ephemeral: std::collections::HashSet<&str> = memories
                .iter()
                .filter(|m| m.scope == Scope::Ephemeral)
                .map(|m| m.id.as_str())
                .collect();
            candidates.retain(|c: &ConflictCandidate| {
                !(ephemeral.contains(c.m1_id.as_str()) && ephemeral.contains(c.m2_id.as_str()))
            });
        }

        let candidates_found = candidates.len() as u64;
        let memories_by_id: HashMap<String, Memory> =
            scope_pool.into_iter().map(|m| (m.id.clone(), m)).collect();

        let merger = Merger::new(self.conflicts, self.staleness_threshold);
        let outcome = merger.merge(candidates, &memories_by_id, Some(&scan_id), next_conflict_id)?;

        self.conflicts.record_scan(&ConflictScan {
            scan_id,
            started_at,
            ended_at: Some(Utc::now()),
            methods: request.methods.clone(),
            candidates_found,
            new_conflicts: outcome.new_conflicts,
            existing_conflicts: outcome.existing_conflicts,
            is_incremental: request.target_memory_id.is_some(),
            target_memory_id: request.target_memory_id.clone(),
        })?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::Confidence;
    use std::collections::BTreeSet;

    fn memory(id: &str, tags: &[&str]) -> Memory {
        Memory {
            id: id.to_string(),
            path: format!("{id}.md"),
            directory: "global".into(),
            title: id.into(),
            body: "b".into(),
            scope: Scope::Global,
            priority: 0.5,
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags: tags.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            token_count: 1,
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: "h".into(),
            composite_embedding: None,
            directory_embedding: None,
            supersedes: Vec::new(),
            related: Vec::new(),
            expires_at: None,
        }
    }

    #[test]
    fn full_scan_persists_scan_row_and_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let detector = Detector::new(&store, Duration::days(90));
        let memories = vec![memory("a", &["rust", "x"]), memory("b", &["rust", "x"])];
        let mut counter = 0;
        let outcome = detector
            .scan(&memories, &ScanRequest::default(), "scan1", || {
                counter += 1;
                format!("conf{counter}")
            })
            .unwrap();
        assert_eq!(outcome.new_conflicts, 1);
        assert_eq!(store.list_unresolved().unwrap().len(), 1);
    }
}
