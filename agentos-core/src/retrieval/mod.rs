//! Hybrid retrieval pipeline: vector search over
//! [`crate::MemoryStore`] candidates, BFS graph expansion over
//! [`crate::GraphStore`], score combination, and context assembly.
//!
//! [`extractors`] builds the `RELATES_TO`/`SUPPORTS` edges the graph
//! expansion stage later follows; it runs independently of a query, usually
//! right after write-back commits.

pub mod assembler;
pub mod extractors;

use std::collections::{HashMap, HashSet};

use agentos_config::RetrievalSettings;
use agentos_types::{EdgeType, Embedding, Memory};

use crate::memory_store::{cosine_similarity, MemoryFilter, MemoryStore};
use crate::GraphStore;
use agentos_types::ConnectionTrace;
use agentos_types::RetrievalResult;

pub use assembler::ContextAssembler;

/// Extra filters layered on top of `RetrievalSettings`.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: MemoryFilter,
    pub limit: Option<u32>,
}

pub struct RetrievalPipeline<'a> {
    memories: &'a MemoryStore,
    graph: &'a GraphStore,
    settings: RetrievalSettings,
}

impl<'a> RetrievalPipeline<'a> {
    pub fn new(memories: &'a MemoryStore, graph: &'a GraphStore, settings: RetrievalSettings) -> Self {
        RetrievalPipeline { memories, graph, settings }
    }

    /// Baseline memories always injected ahead of the query: `scope=baseline AND status=active`, sorted by path.
    pub fn baseline(&self) -> Result<Vec<Memory>, crate::error::StoreError> {
        let mut baseline = self.memories.list_baseline()?;
        baseline.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(baseline)
    }

    /// Runs scoring and assembly for a query embedding, returning ranked
    /// [`RetrievalResult`]s (top `limit`, descending `combined_score`).
    pub fn query(
        &self,
        query_embedding: &Embedding,
        options: &QueryOptions,
    ) -> Result<Vec<RetrievalResult>, crate::error::StoreError> {
        let limit = options.limit.unwrap_or(self.settings.default_limit);
        let candidate_count = (limit * self.settings.vector_candidate_multiplier) as usize;

        // Stage 2: vector search.
        let mut filter = options.filter.clone();
        filter.exclude_deprecated = true;
        let pool = self.memories.search_candidates(&filter)?;

        let mut by_id: HashMap<String, Memory> = HashMap::new();
        let mut vector_scores: HashMap<String, f64> = HashMap::new();
        let mut scored: Vec<(String, f64)> = pool
            .iter()
            .filter_map(|m| {
                let emb = m.composite_embedding.as_ref()?;
                Some((m.id.clone(), cosine_similarity(query_embedding, emb)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(candidate_count);
        for m in &pool {
            by_id.insert(m.id.clone(), m.clone());
        }
        for (id, score) in &scored {
            vector_scores.insert(id.clone(), *score);
        }

        // Stage 3: BFS graph expansion from the vector frontier.
        let expansion_types = EdgeType::default_expansion_types();
        let mut visited: HashSet<String> = scored.iter().map(|(id, _)| id.clone()).collect();
        let mut connections: HashMap<String, Vec<ConnectionTrace>> = HashMap::new();
        let mut frontier: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();

        for hop in 1..=self.settings.max_graph_depth {
            let mut next_frontier = Vec::new();
            for source_id in &frontier {
                let edges = self.graph.edges_from(source_id, None);
                for (target_id, edge_type) in edges
                    .into_iter()
                    .filter(|(_, et)| expansion_types.contains(&et.label()))
                    .take(self.settings.max_expansion_per_hop as usize)
                {
                    connections.entry(target_id.clone()).or_default().push(ConnectionTrace {
                        source_id: source_id.clone(),
                        edge_type: edge_type.label().to_string(),
                        hop_count: hop,
                    });
                    if visited.insert(target_id.clone()) {
                        next_frontier.push(target_id);
                    }
                }
            }
            frontier = next_frontier;
            if frontier.is_empty() {
                break;
            }
        }

        // Fetch memories discovered purely through expansion.
        for id in connections.keys() {
            if !by_id.contains_key(id) {
                if let Some(m) = self.memories.get(id)? {
                    by_id.insert(id.clone(), m);
                }
            }
        }

        // Stage 4: score combination.
        let contradicted: HashSet<String> = by_id
            .keys()
            .filter(|id| {
                self.graph
                    .edges_to(id, Some("CONTRADICTS"))
                    .iter()
                    .any(|(source, _)| visited.contains(source))
            })
            .cloned()
            .collect();

        let mut results = Vec::new();
        for id in &visited {
            let Some(memory) = by_id.get(id) else { continue };
            let vector_score = vector_scores.get(id).copied().unwrap_or(0.0);
            let traces = connections.get(id).cloned().unwrap_or_default();

            let mut graph_score: f64 = traces
                .iter()
                .map(|t| {
                    let source_boost = 1.0 + vector_scores.get(&t.source_id).copied().unwrap_or(0.0);
                    self.settings.direct_connection_boost
                        * self.settings.hop_decay.powi(t.hop_count as i32)
                        * source_boost
                })
                .sum();
            graph_score = graph_score.clamp(0.0, 1.0);
            if contradicted.contains(id) {
                graph_score *= self.settings.contradiction_penalty;
            }

            let combined_score =
                self.settings.vector_weight * vector_score + self.settings.graph_weight * graph_score;

            results.push(RetrievalResult {
                memory_id: memory.id.clone(),
                vector_score,
                graph_score,
                combined_score,
                connections: traces,
            });
        }

        // Stage 5: ranking & limiting.
        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit as usize);
        Ok(results)
    }

    pub fn memory(&self, id: &str) -> Result<Option<Memory>, crate::error::StoreError> {
        self.memories.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{Confidence, MemoryStatus, NodeKind, Scope};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn memory(id: &str, embedding: Vec<f32>) -> Memory {
        Memory {
            id: id.to_string(),
            path: format!("{id}.md"),
            directory: "global".into(),
            title: id.into(),
            body: "body".into(),
            scope: Scope::Global,
            priority: 0.5,
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags: BTreeSet::new(),
            token_count: 10,
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: "h".into(),
            composite_embedding: Some(embedding),
            directory_embedding: None,
            supersedes: Vec::new(),
            related: Vec::new(),
            expires_at: None,
        }
    }

    #[test]
    fn query_ranks_by_combined_score_and_expands_related() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();

        let m1 = memory("m1", vec![1.0, 0.0]);
        let m2 = memory("m2", vec![0.0, 1.0]);
        memories.put(&m1).unwrap();
        memories.put(&m2).unwrap();
        graph.upsert_node("m1", NodeKind::Memory, serde_json::json!({})).unwrap();
        graph.upsert_node("m2", NodeKind::Memory, serde_json::json!({})).unwrap();
        graph
            .create_edge(
                agentos_types::Edge::new("m1", "m2", EdgeType::RelatesTo { weight: 0.8, context: None }),
                serde_json::json!({}),
            )
            .unwrap();

        let pipeline = RetrievalPipeline::new(&memories, &graph, RetrievalSettings::default());
        let results = pipeline.query(&vec![1.0, 0.0], &QueryOptions::default()).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].memory_id, "m1");
        assert!(results.iter().any(|r| r.memory_id == "m2"));
    }

    #[test]
    fn baseline_is_sorted_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let mut b1 = memory("b1", vec![1.0]);
        b1.scope = Scope::Baseline;
        b1.path = "zzz.md".into();
        let mut b2 = memory("b2", vec![1.0]);
        b2.scope = Scope::Baseline;
        b2.path = "aaa.md".into();
        memories.put(&b1).unwrap();
        memories.put(&b2).unwrap();

        let pipeline = RetrievalPipeline::new(&memories, &graph, RetrievalSettings::default());
        let baseline = pipeline.baseline().unwrap();
        assert_eq!(baseline[0].id, "b2");
    }
}
