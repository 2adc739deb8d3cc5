//! Extractor orchestrator: builds `RELATES_TO`/`SUPPORTS`
//! edges from memory content before retrieval queries them. Tag, temporal,
//! and semantic extractors run unconditionally and cheaply; the LLM
//! extractor is optional and gated behind the `llm-extractors` feature.

use std::collections::HashMap;

use agentos_config::ExtractorSettings;
use agentos_types::{sorted_pair, Edge, EdgeType, Memory};
use chrono::Duration;

use crate::memory_store::cosine_similarity;
use crate::GraphStore;

/// Raw extractor output, not yet merged or persisted.
#[derive(Debug, Clone)]
pub struct CandidateEdge {
    pub from_id: String,
    pub to_id: String,
    pub edge_type: EdgeType,
    pub context: Option<String>,
}

fn jaccard(a: &std::collections::BTreeSet<String>, b: &std::collections::BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Jaccard-similar memories by tag set → `RELATES_TO` weighted by the score
pub fn tag_extractor(memories: &[Memory]) -> Vec<CandidateEdge> {
    let mut candidates = Vec::new();
    for i in 0..memories.len() {
        for j in (i + 1)..memories.len() {
            let score = jaccard(&memories[i].tags, &memories[j].tags);
            if score > 0.0 {
                candidates.push(CandidateEdge {
                    from_id: memories[i].id.clone(),
                    to_id: memories[j].id.clone(),
                    edge_type: EdgeType::RelatesTo { weight: score, context: Some("shared tags".into()) },
                    context: Some("shared tags".into()),
                });
            }
        }
    }
    candidates
}

/// Memories created close in time with shared scope → low-weight
/// `RELATES_TO`.
pub fn temporal_extractor(memories: &[Memory], window: Duration) -> Vec<CandidateEdge> {
    let mut candidates = Vec::new();
    for i in 0..memories.len() {
        for j in (i + 1)..memories.len() {
            let a = &memories[i];
            let b = &memories[j];
            if a.scope != b.scope {
                continue;
            }
            let delta = (a.created_at - b.created_at).num_seconds().abs();
            if delta <= window.num_seconds() {
                candidates.push(CandidateEdge {
                    from_id: a.id.clone(),
                    to_id: b.id.clone(),
                    edge_type: EdgeType::RelatesTo { weight: 0.2, context: Some("created close in time".into()) },
                    context: Some("created close in time".into()),
                });
            }
        }
    }
    candidates
}

/// High cosine similarity between composite embeddings → `RELATES_TO`, and
/// above `semantic_supports_threshold` a candidate `SUPPORTS` too.
pub fn semantic_extractor(memories: &[Memory], settings: &ExtractorSettings) -> Vec<CandidateEdge> {
    let mut candidates = Vec::new();
    for i in 0..memories.len() {
        let Some(emb_a) = memories[i].composite_embedding.as_ref() else { continue };
        for j in (i + 1)..memories.len() {
            let Some(emb_b) = memories[j].composite_embedding.as_ref() else { continue };
            let score = cosine_similarity(emb_a, emb_b);
            if score >= settings.semantic_relates_threshold {
                candidates.push(CandidateEdge {
                    from_id: memories[i].id.clone(),
                    to_id: memories[j].id.clone(),
                    edge_type: EdgeType::RelatesTo { weight: score, context: Some("semantic similarity".into()) },
                    context: Some("semantic similarity".into()),
                });
            }
            if score >= settings.semantic_supports_threshold {
                candidates.push(CandidateEdge {
                    from_id: memories[i].id.clone(),
                    to_id: memories[j].id.clone(),
                    edge_type: EdgeType::Supports { strength: score },
                    context: Some("high semantic similarity".into()),
                });
            }
        }
    }
    candidates
}

/// One parsed LLM relationship label.
/// Parse failures are logged and the whole batch is dropped, never raised.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LlmRelationLabel {
    pub to_id: String,
    pub relation: String,
    pub confidence: f64,
    pub reason: String,
}

/// Converts raw LLM JSON into candidate edges; memories under
/// `llm_min_priority` are never sent to the LLM in the first place (callers
/// filter before invoking the model — this function is pure parsing/mapping).
pub fn llm_labels_to_candidates(from_id: &str, labels: &[LlmRelationLabel]) -> Vec<CandidateEdge> {
    labels
        .iter()
        .filter_map(|label| {
            let edge_type = match label.relation.as_str() {
                "SUPPORTS" => EdgeType::Supports { strength: label.confidence },
                "CONTRADICTS" => EdgeType::Contradicts { description: label.reason.clone() },
                "DEPENDS_ON" => EdgeType::DependsOn,
                "SUPERSEDES" => EdgeType::Supersedes { reason: Some(label.reason.clone()) },
                "RELATES_TO" => EdgeType::RelatesTo { weight: label.confidence, context: Some(label.reason.clone()) },
                _ => return None,
            };
            Some(CandidateEdge {
                from_id: from_id.to_string(),
                to_id: label.to_id.clone(),
                edge_type,
                context: Some(label.reason.clone()),
            })
        })
        .collect()
}

/// Groups candidates by `(sorted_pair, edge_type label)`, keeps the
/// highest-weight one, concatenates up to 3 distinct contexts, filters by
/// `min_edge_weight`, and caps edges per source at `max_edges_per_memory`
pub fn merge_candidates(candidates: Vec<CandidateEdge>, settings: &ExtractorSettings) -> Vec<CandidateEdge> {
    struct Group {
        best: CandidateEdge,
        contexts: Vec<String>,
    }

    let mut groups: HashMap<(String, String, &'static str), Group> = HashMap::new();
    for candidate in candidates {
        let (lo, hi) = sorted_pair(&candidate.from_id, &candidate.to_id);
        let key = (lo, hi, candidate.edge_type.label());
        let weight = candidate.edge_type.weight().unwrap_or(1.0);
        match groups.get_mut(&key) {
            Some(group) => {
                if let Some(ctx) = &candidate.context {
                    if group.contexts.len() < 3 && !group.contexts.contains(ctx) {
                        group.contexts.push(ctx.clone());
                    }
                }
                let best_weight = group.best.edge_type.weight().unwrap_or(1.0);
                if weight > best_weight {
                    group.best = candidate;
                }
            }
            None => {
                groups.insert(
                    key,
                    Group { contexts: candidate.context.clone().into_iter().collect(), best: candidate },
                );
            }
        }
    }

    let mut merged: Vec<CandidateEdge> = groups
        .into_values()
        .filter(|g| g.best.edge_type.weight().unwrap_or(1.0) >= settings.min_edge_weight)
        .map(|g| {
            let mut edge = g.best;
            if let EdgeType::RelatesTo { weight, .. } = edge.edge_type {
                edge.edge_type = EdgeType::RelatesTo { weight, context: Some(g.contexts.join("; ")) };
            }
            edge
        })
        .collect();

    let mut per_source: HashMap<String, u32> = HashMap::new();
    merged.sort_by(|a, b| {
        b.edge_type
            .weight()
            .unwrap_or(1.0)
            .partial_cmp(&a.edge_type.weight().unwrap_or(1.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.retain(|c| {
        let count = per_source.entry(c.from_id.clone()).or_insert(0);
        if *count >= settings.max_edges_per_memory {
            return false;
        }
        *count += 1;
        true
    });
    merged
}

/// Persists merged candidates as graph edges, skipping self-referential
/// candidates (the extractors never emit `from_id == to_id`, but pairwise
/// loops over a shared id list make it easy to regress on).
pub fn persist_candidates(graph: &GraphStore, candidates: &[CandidateEdge]) -> Result<usize, crate::error::GraphError> {
    let mut created = 0;
    for candidate in candidates {
        if candidate.from_id == candidate.to_id {
            continue;
        }
        graph.create_edge(
            Edge::new(candidate.from_id.clone(), candidate.to_id.clone(), candidate.edge_type.clone()),
            serde_json::json!({}),
        )?;
        created += 1;
    }
    Ok(created)
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
    fn tag_extractor_scores_by_jaccard() {
        let memories = vec![memory("a", &["rust", "graph"]), memory("b", &["rust", "cli"])];
        let candidates = tag_extractor(&memories);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].edge_type.weight().unwrap() - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn merge_keeps_highest_weight_and_caps_per_source() {
        let settings = ExtractorSettings { max_edges_per_memory: 1, ..ExtractorSettings::default() };
        let candidates = vec![
            CandidateEdge {
                from_id: "a".into(),
                to_id: "b".into(),
                edge_type: EdgeType::RelatesTo { weight: 0.4, context: Some("tags".into()) },
                context: Some("tags".into()),
            },
            CandidateEdge {
                from_id: "a".into(),
                to_id: "c".into(),
                edge_type: EdgeType::RelatesTo { weight: 0.9, context: Some("semantic".into()) },
                context: Some("semantic".into()),
            },
        ];
        let merged = merge_candidates(candidates, &settings);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].to_id, "c");
    }

    #[test]
    fn merge_filters_below_min_weight() {
        let settings = ExtractorSettings { min_edge_weight: 0.5, ..ExtractorSettings::default() };
        let candidates = vec![CandidateEdge {
            from_id: "a".into(),
            to_id: "b".into(),
            edge_type: EdgeType::RelatesTo { weight: 0.2, context: None },
            context: None,
        }];
        assert!(merge_candidates(candidates, &settings).is_empty());
    }
}
