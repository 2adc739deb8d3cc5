//! Merger: groups candidates by pair hash, updates
//! existing non-dismissed conflicts or classifies and persists new ones.

use std::collections::HashMap;

use agentos_types::{
    pair_hash, Conflict, ConflictCandidate, ConflictStatus, ConflictType, DetectionMethod, Memory,
    MemoryRole,
};
use chrono::{DateTime, Duration, Utc};

use crate::conflict::store::ConflictStore;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOutcome {
    pub new_conflicts: u64,
    pub existing_conflicts: u64,
}

/// Dominant-method classification.
/// Checked in priority order: explicit supersession, then contradiction
/// (rule-extraction) evidence, then high-similarity same-scope duplicate,
/// then staleness, falling back to tag-overlap-driven scope overlap.
fn classify(
    candidates: &[&ConflictCandidate],
    m1: &Memory,
    m2: &Memory,
    staleness_threshold: Duration,
    now: DateTime<Utc>,
) -> ConflictType {
    if candidates.iter().any(|c| c.method == DetectionMethod::Supersession) {
        return ConflictType::Supersession;
    }
    if candidates.iter().any(|c| c.method == DetectionMethod::RuleExtraction) {
        return ConflictType::Contradictory;
    }
    let semantic_high = candidates
        .iter()
        .find(|c| c.method == DetectionMethod::Semantic && c.raw_score >= 0.92);
    if semantic_high.is_some() && m1.scope == m2.scope {
        return ConflictType::Duplicate;
    }
    let stale = [m1, m2].iter().any(|m| {
        m.last_used_at
            .map(|t| now - t > staleness_threshold)
            .unwrap_or(now - m.created_at > staleness_threshold)
    });
    if stale {
        return ConflictType::Stale;
    }
    if candidates.iter().any(|c| c.method == DetectionMethod::TagOverlap) {
        return ConflictType::ScopeOverlap;
    }
    ConflictType::Contradictory
}

fn dominant_method(candidates: &[&ConflictCandidate]) -> DetectionMethod {
    candidates
        .iter()
        .max_by(|a, b| a.raw_score.partial_cmp(&b.raw_score).unwrap_or(std::cmp::Ordering::Equal))
        .map(|c| c.method)
        .unwrap_or(DetectionMethod::Manual)
}

pub struct Merger<'a> {
    store: &'a ConflictStore,
    staleness_threshold: Duration,
}

impl<'a> Merger<'a> {
    pub fn new(store: &'a ConflictStore, staleness_threshold: Duration) -> Self {
        Merger { store, staleness_threshold }
    }

    /// Groups `candidates` by sorted-pair hash and either updates an
    /// existing conflict (confidence = max, evidence union) or classifies
    /// and persists a new one.
    pub fn merge(
        &self,
        candidates: Vec<ConflictCandidate>,
        memories_by_id: &HashMap<String, Memory>,
        scan_id: Option<&str>,
        next_id: impl Fn() -> String,
    ) -> Result<MergeOutcome, StoreError> {
        let mut groups: HashMap<String, Vec<ConflictCandidate>> = HashMap::new();
        for candidate in candidates {
            groups.entry(candidate.pair_hash()).or_default().push(candidate);
        }

        let mut outcome = MergeOutcome::default();
        let now = Utc::now();

        for (hash, group) in groups {
            let refs: Vec<&ConflictCandidate> = group.iter().collect();
            let max_score = refs.iter().map(|c| c.raw_score).fold(0.0, f64::max);
            let mut evidence: Vec<String> =
                group.iter().flat_map(|c| c.evidence.iter().cloned()).collect();
            evidence.sort();
            evidence.dedup();

            if let Some(mut existing) = self.store.find_active_by_pair(&hash)? {
                existing.confidence = existing.confidence.max(max_score);
                let mut merged_evidence = existing.evidence.clone();
                merged_evidence.extend(evidence);
                merged_evidence.sort();
                merged_evidence.dedup();
                existing.evidence = merged_evidence;
                self.store.upsert(&existing)?;
                outcome.existing_conflicts += 1;
                continue;
            }

            let (Some(m1), Some(m2)) = (
                memories_by_id.get(&group[0].m1_id),
                memories_by_id.get(&group[0].m2_id),
            ) else {
                continue;
            };
            let classification = classify(&refs, m1, m2, self.staleness_threshold, now);
            let method = dominant_method(&refs);
            let conflict = Conflict {
                id: next_id(),
                classification,
                detection_method: method,
                confidence: max_score,
                description: format!("{:?} detected between {} and {}", classification, m1.id, m2.id),
                evidence,
                status: ConflictStatus::Unresolved,
                m1_id: m1.id.clone(),
                m2_id: m2.id.clone(),
                m1_role: MemoryRole::Primary,
                m2_role: MemoryRole::Secondary,
                resolution_action: None,
                resolved_by: None,
                resolved_at: None,
                suppressed_until: None,
                scan_id: scan_id.map(|s| s.to_string()),
                created_at: now,
            };
            self.store.upsert(&conflict)?;
            outcome.new_conflicts += 1;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{Confidence, MemoryStatus, Scope};
    use std::collections::BTreeSet;

    fn memory(id: &str) -> Memory {
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
            tags: BTreeSet::new(),
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
    fn new_pair_classified_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let merger = Merger::new(&store, Duration::days(90));
        let memories: HashMap<String, Memory> =
            [("a".to_string(), memory("a")), ("b".to_string(), memory("b"))].into_iter().collect();
        let candidates = vec![ConflictCandidate {
            m1_id: "a".into(),
            m2_id: "b".into(),
            method: DetectionMethod::Semantic,
            raw_score: 0.95,
            evidence: vec!["cosine 0.95".into()],
        }];
        let mut counter = 0;
        let outcome = merger
            .merge(candidates, &memories, None, || {
                counter += 1;
                format!("conf{counter}")
            })
            .unwrap();
        assert_eq!(outcome.new_conflicts, 1);
        assert_eq!(outcome.existing_conflicts, 0);
        let all = store.list_all().unwrap();
        assert_eq!(all[0].classification, ConflictType::Duplicate);
    }

    #[test]
    fn existing_conflict_takes_max_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let merger = Merger::new(&store, Duration::days(90));
        let memories: HashMap<String, Memory> =
            [("a".to_string(), memory("a")), ("b".to_string(), memory("b"))].into_iter().collect();

        let first = vec![ConflictCandidate {
            m1_id: "a".into(),
            m2_id: "b".into(),
            method: DetectionMethod::TagOverlap,
            raw_score: 0.5,
            evidence: vec!["tag jaccard 0.50".into()],
        }];
        merger.merge(first, &memories, None, || "conf1".into()).unwrap();

        let second = vec![ConflictCandidate {
            m1_id: "a".into(),
            m2_id: "b".into(),
            method: DetectionMethod::TagOverlap,
            raw_score: 0.8,
            evidence: vec!["tag jaccard 0.80".into()],
        }];
        let outcome = merger.merge(second, &memories, None, || "conf2".into()).unwrap();
        assert_eq!(outcome.existing_conflicts, 1);
        assert_eq!(outcome.new_conflicts, 0);

        let updated = store.get("conf1").unwrap().unwrap();
        assert_eq!(updated.confidence, 0.8);
        assert_eq!(updated.evidence.len(), 2);
    }
}
