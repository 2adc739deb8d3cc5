//! Stateless conflict analyzers. Each returns
//! [`ConflictCandidate`]s; the detector orchestrator runs them in sequence
//! and hands the combined output to the [`crate::conflict::merger`].

use agentos_types::{ConflictCandidate, DetectionMethod, Memory};

use crate::memory_store::cosine_similarity;

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Jaccard similarity of tag sets above `threshold`.
pub fn tag_overlap_analyzer(memories: &[Memory], threshold: f64, cap: usize) -> Vec<ConflictCandidate> {
    let mut candidates = Vec::new();
    'outer: for i in 0..memories.len() {
        for j in (i + 1)..memories.len() {
            let score = jaccard(&memories[i].tags, &memories[j].tags);
            if score >= threshold {
                candidates.push(ConflictCandidate {
                    m1_id: memories[i].id.clone(),
                    m2_id: memories[j].id.clone(),
                    method: DetectionMethod::TagOverlap,
                    raw_score: score,
                    evidence: vec![format!("tag jaccard {:.2}", score)],
                });
                if candidates.len() >= cap {
                    break 'outer;
                }
            }
        }
    }
    candidates
}

/// Cosine similarity of composite embeddings above `threshold`.
pub fn semantic_analyzer(memories: &[Memory], threshold: f64, cap: usize) -> Vec<ConflictCandidate> {
    let mut candidates = Vec::new();
    'outer: for i in 0..memories.len() {
        let Some(emb_a) = memories[i].composite_embedding.as_ref() else { continue };
        for j in (i + 1)..memories.len() {
            let Some(emb_b) = memories[j].composite_embedding.as_ref() else { continue };
            let score = cosine_similarity(emb_a, emb_b);
            if score >= threshold {
                candidates.push(ConflictCandidate {
                    m1_id: memories[i].id.clone(),
                    m2_id: memories[j].id.clone(),
                    method: DetectionMethod::Semantic,
                    raw_score: score,
                    evidence: vec![format!("cosine similarity {:.2}", score)],
                });
                if candidates.len() >= cap {
                    break 'outer;
                }
            }
        }
    }
    candidates
}

/// Explicit `supersedes:` front-matter references, and overlapping-scope
/// pairs whose `created_at` differ (a cheap proxy for "same claim, different
/// dates").
pub fn supersession_analyzer(memories: &[Memory], cap: usize) -> Vec<ConflictCandidate> {
    let mut candidates = Vec::new();
    let by_id: std::collections::HashMap<&str, &Memory> =
        memories.iter().map(|m| (m.id.as_str(), m)).collect();

    'outer: for memory in memories {
        for superseded_id in &memory.supersedes {
            if let Some(target) = by_id.get(superseded_id.as_str()) {
                candidates.push(ConflictCandidate {
                    m1_id: memory.id.clone(),
                    m2_id: target.id.clone(),
                    method: DetectionMethod::Supersession,
                    raw_score: 1.0,
                    evidence: vec!["explicit supersedes reference".into()],
                });
                if candidates.len() >= cap {
                    break 'outer;
                }
            }
        }
    }
    candidates
}

/// One normative-rule observation extracted by the LLM extractor, already
/// mapped into a yes/no polarity for comparison. Parsing the raw LLM response lives with the caller (gated
/// behind `llm-extractors`); this function only compares polarities.
#[derive(Debug, Clone)]
pub struct NormativeRule {
    pub memory_id: String,
    pub subject: String,
    pub always: bool,
}

/// Flags `"always X"` vs `"never X"` pairs on the same subject as contradiction
/// candidates.
pub fn rule_extraction_analyzer(rules: &[NormativeRule], cap: usize) -> Vec<ConflictCandidate> {
    let mut candidates = Vec::new();
    'outer: for i in 0..rules.len() {
        for j in (i + 1)..rules.len() {
            let a = &rules[i];
            let b = &rules[j];
            if a.subject == b.subject && a.always != b.always && a.memory_id != b.memory_id {
                candidates.push(ConflictCandidate {
                    m1_id: a.memory_id.clone(),
                    m2_id: b.memory_id.clone(),
                    method: DetectionMethod::RuleExtraction,
                    raw_score: 0.8,
                    evidence: vec![format!("conflicting rule on \"{}\"", a.subject)],
                });
                if candidates.len() >= cap {
                    break 'outer;
                }
            }
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{Confidence, MemoryStatus, Scope};
    use chrono::Utc;
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
    fn tag_overlap_respects_threshold() {
        let memories = vec![memory("a", &["x", "y"]), memory("b", &["x", "z"])];
        assert!(tag_overlap_analyzer(&memories, 0.9, 200).is_empty());
        assert_eq!(tag_overlap_analyzer(&memories, 0.3, 200).len(), 1);
    }

    #[test]
    fn supersession_follows_explicit_reference() {
        let mut a = memory("a", &[]);
        a.supersedes.push("b".into());
        let b = memory("b", &[]);
        let candidates = supersession_analyzer(&[a, b], 200);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].method, DetectionMethod::Supersession);
    }

    #[test]
    fn rule_extraction_flags_always_never_conflict() {
        let rules = vec![
            NormativeRule { memory_id: "a".into(), subject: "retries".into(), always: true },
            NormativeRule { memory_id: "b".into(), subject: "retries".into(), always: false },
        ];
        assert_eq!(rule_extraction_analyzer(&rules, 200).len(), 1);
    }
}
