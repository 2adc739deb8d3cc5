//! Context assembler: contradiction detection, dependency
//! ordering, formatting, and token budgeting over a ranked result set.

use std::collections::{HashMap, HashSet};

use agentos_types::{
    pair_hash, AssembledContext, ContextFormat, ContradictionWarning, Memory, RetrievalResult,
};

use crate::GraphStore;

const CHARS_PER_TOKEN: f64 = 4.0; // estimate_tokens = char_count * 0.25

pub struct ContextAssembler<'a> {
    graph: &'a GraphStore,
    max_relationship_context: u32,
}

impl<'a> ContextAssembler<'a> {
    pub fn new(graph: &'a GraphStore, max_relationship_context: u32) -> Self {
        ContextAssembler { graph, max_relationship_context }
    }

    pub fn assemble(
        &self,
        baseline: &[Memory],
        results: &[RetrievalResult],
        memories_by_id: &HashMap<String, Memory>,
        format: ContextFormat,
        token_budget: u32,
    ) -> AssembledContext {
        let warnings = self.contradiction_warnings(results);
        let ordered = self.dependency_order(results);

        let rendered = match format {
            ContextFormat::Markdown => self.render_markdown(baseline, &ordered, memories_by_id, &warnings),
            ContextFormat::Json => self.render_json(baseline, &ordered, memories_by_id, &warnings),
            ContextFormat::PlainText => self.render_plain(baseline, &ordered, memories_by_id, &warnings),
        };

        let estimated_tokens = (rendered.chars().count() as f64 * 0.25).ceil() as u32;
        let (rendered, truncated) = if estimated_tokens > token_budget && token_budget > 0 {
            (self.truncate_to_budget(&rendered, token_budget), true)
        } else {
            (rendered, false)
        };
        let estimated_tokens = (rendered.chars().count() as f64 * 0.25).ceil() as u32;

        AssembledContext {
            baseline_ids: baseline.iter().map(|m| m.id.clone()).collect(),
            results: ordered,
            warnings,
            format,
            rendered,
            truncated,
            estimated_tokens,
        }
    }

    fn contradiction_warnings(&self, results: &[RetrievalResult]) -> Vec<ContradictionWarning> {
        let mut seen = HashSet::new();
        let mut warnings = Vec::new();
        for result in results {
            for (source_id, edge_type) in self.graph.edges_to(&result.memory_id, Some("CONTRADICTS")) {
                if !results.iter().any(|r| r.memory_id == source_id) {
                    continue;
                }
                let key = pair_hash(&result.memory_id, &source_id);
                if seen.insert(key) {
                    let description = match edge_type {
                        agentos_types::EdgeType::Contradicts { description } => description,
                        _ => String::new(),
                    };
                    warnings.push(ContradictionWarning {
                        m1_id: source_id,
                        m2_id: result.memory_id.clone(),
                        description,
                    });
                }
            }
        }
        warnings
    }

    /// Topological sort on `DEPENDS_ON` restricted to the result set; ties
    /// broken by `combined_score` descending. Falls back to pure score order
    /// if the restricted subgraph contains a cycle.
    fn dependency_order(&self, results: &[RetrievalResult]) -> Vec<RetrievalResult> {
        let ids: HashSet<&str> = results.iter().map(|r| r.memory_id.as_str()).collect();
        let mut in_degree: HashMap<String, u32> = results.iter().map(|r| (r.memory_id.clone(), 0)).collect();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for result in results {
            for (target_id, _) in self.graph.edges_from(&result.memory_id, Some("DEPENDS_ON")) {
                if ids.contains(target_id.as_str()) {
                    *in_degree.get_mut(&result.memory_id).unwrap() += 1;
                    dependents.entry(target_id).or_default().push(result.memory_id.clone());
                }
            }
        }

        let by_id: HashMap<&str, &RetrievalResult> =
            results.iter().map(|r| (r.memory_id.as_str(), r)).collect();
        let mut ready: Vec<String> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(id, _)| id.clone())
            .collect();
        sort_by_score_desc(&mut ready, &by_id);

        let mut ordered = Vec::with_capacity(results.len());
        let mut remaining_degree = in_degree.clone();
        while let Some(id) = ready.pop() {
            ordered.push((*by_id[id.as_str()]).clone());
            let mut newly_ready = Vec::new();
            if let Some(deps) = dependents.get(&id) {
                for dependent in deps {
                    let deg = remaining_degree.get_mut(dependent).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(dependent.clone());
                    }
                }
            }
            sort_by_score_desc(&mut newly_ready, &by_id);
            ready.splice(0..0, newly_ready);
        }

        if ordered.len() != results.len() {
            // Cycle in the DEPENDS_ON subgraph: fall back to pure score order.
            let mut fallback = results.to_vec();
            fallback.sort_by(|a, b| {
                b.combined_score
                    .partial_cmp(&a.combined_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            return fallback;
        }
        ordered
    }

    fn render_markdown(
        &self,
        baseline: &[Memory],
        results: &[RetrievalResult],
        by_id: &HashMap<String, Memory>,
        warnings: &[ContradictionWarning],
    ) -> String {
        let mut out = String::new();
        out.push_str("# Retrieved Context\n\n");

        if !warnings.is_empty() {
            out.push_str("## Warnings\n\n");
            for w in warnings {
                out.push_str(&format!(
                    "- Potential contradiction: {} <-> {}: {}\n",
                    w.m1_id, w.m2_id, w.description
                ));
            }
            out.push('\n');
        }

        if !baseline.is_empty() {
            out.push_str("## Baseline\n\n");
            for m in baseline {
                out.push_str(&format!("### {}\n\n{}\n\n", m.title, m.body));
            }
        }

        out.push_str("## Retrieved Memories\n\n");
        for result in results {
            let Some(m) = by_id.get(&result.memory_id) else { continue };
            out.push_str(&format!(
                "### {} (vector={:.3} graph={:.3} combined={:.3})\n\n{}\n\n",
                m.title, result.vector_score, result.graph_score, result.combined_score, m.body
            ));
            if !result.connections.is_empty() {
                out.push_str("Connections:\n");
                for c in result.connections.iter().take(self.max_relationship_context as usize) {
                    out.push_str(&format!(
                        "- {} from {} ({} hop(s))\n",
                        c.edge_type, c.source_id, c.hop_count
                    ));
                }
                out.push('\n');
            }
        }

        out.push_str("## Relationship Map\n\n");
        for result in results {
            for c in result.connections.iter().take(self.max_relationship_context as usize) {
                out.push_str(&format!(
                    "- {} --{}--> {}\n",
                    c.source_id, c.edge_type, result.memory_id
                ));
            }
        }

        out
    }

    fn render_json(
        &self,
        baseline: &[Memory],
        results: &[RetrievalResult],
        by_id: &HashMap<String, Memory>,
        warnings: &[ContradictionWarning],
    ) -> String {
        let body = serde_json::json!({
            "baseline": baseline.iter().map(|m| &m.id).collect::<Vec<_>>(),
            "warnings": warnings,
            "results": results.iter().map(|r| serde_json::json!({
                "memory_id": r.memory_id,
                "title": by_id.get(&r.memory_id).map(|m| m.title.clone()),
                "vector_score": r.vector_score,
                "graph_score": r.graph_score,
                "combined_score": r.combined_score,
                "connections": r.connections.iter().take(self.max_relationship_context as usize).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        });
        serde_json::to_string_pretty(&body).unwrap_or_default()
    }

    fn render_plain(
        &self,
        baseline: &[Memory],
        results: &[RetrievalResult],
        by_id: &HashMap<String, Memory>,
        warnings: &[ContradictionWarning],
    ) -> String {
        let mut out = String::new();
        for w in warnings {
            out.push_str(&format!(
                "Potential contradiction: {} <-> {}: {}\n",
                w.m1_id, w.m2_id, w.description
            ));
        }
        for m in baseline {
            out.push_str(&format!("{}\n{}\n\n", m.title, m.body));
        }
        for result in results {
            let Some(m) = by_id.get(&result.memory_id) else { continue };
            out.push_str(&format!("{}\n{}\n", m.title, m.body));
            for c in result.connections.iter().take(self.max_relationship_context as usize) {
                out.push_str(&format!("  {} from {} ({} hop(s))\n", c.edge_type, c.source_id, c.hop_count));
            }
            out.push('\n');
        }
        out
    }

    fn truncate_to_budget(&self, rendered: &str, token_budget: u32) -> String {
        let budget_chars = (token_budget as f64 / 0.25) as usize;
        let marker = "\n\n[Content truncated to fit token budget]\n";
        if rendered.chars().count() <= budget_chars {
            return rendered.to_string();
        }
        let cut_at = rendered
            .char_indices()
            .take(budget_chars.saturating_sub(marker.len()))
            .map(|(i, _)| i)
            .last()
            .unwrap_or(0);
        let separator_cut = rendered[..cut_at].rfind("\n\n").unwrap_or(cut_at);
        format!("{}{}", &rendered[..separator_cut], marker)
    }
}

fn sort_by_score_desc(ids: &mut [String], by_id: &HashMap<&str, &RetrievalResult>) {
    ids.sort_by(|a, b| {
        by_id[b.as_str()]
            .combined_score
            .partial_cmp(&by_id[a.as_str()].combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{Confidence, EdgeType, MemoryStatus, NodeKind, Scope};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn memory(id: &str) -> Memory {
        Memory {
            id: id.to_string(),
            path: format!("{id}.md"),
            directory: "global".into(),
            title: id.into(),
            body: "body text".into(),
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
            composite_embedding: None,
            directory_embedding: None,
            supersedes: Vec::new(),
            related: Vec::new(),
            expires_at: None,
        }
    }

    fn result(id: &str, score: f64) -> RetrievalResult {
        RetrievalResult {
            memory_id: id.to_string(),
            vector_score: score,
            graph_score: 0.0,
            combined_score: score,
            connections: Vec::new(),
        }
    }

    #[test]
    fn dependency_order_respects_depends_on() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        graph.upsert_node("a", NodeKind::Memory, serde_json::json!({})).unwrap();
        graph.upsert_node("b", NodeKind::Memory, serde_json::json!({})).unwrap();
        graph
            .create_edge(agentos_types::Edge::new("a", "b", EdgeType::DependsOn), serde_json::json!({}))
            .unwrap();

        let by_id: HashMap<String, Memory> =
            [("a".to_string(), memory("a")), ("b".to_string(), memory("b"))].into_iter().collect();
        let results = vec![result("a", 0.9), result("b", 0.5)];

        let assembler = ContextAssembler::new(&graph, 5);
        let assembled = assembler.assemble(&[], &results, &by_id, ContextFormat::Markdown, 100_000);
        let order: Vec<&str> = assembled.results.iter().map(|r| r.memory_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn contradiction_produces_deduplicated_warning() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        graph.upsert_node("a", NodeKind::Memory, serde_json::json!({})).unwrap();
        graph.upsert_node("b", NodeKind::Memory, serde_json::json!({})).unwrap();
        graph
            .create_edge(
                agentos_types::Edge::new("a", "b", EdgeType::Contradicts { description: "conflicting dates".into() }),
                serde_json::json!({}),
            )
            .unwrap();

        let by_id: HashMap<String, Memory> =
            [("a".to_string(), memory("a")), ("b".to_string(), memory("b"))].into_iter().collect();
        let results = vec![result("a", 0.9), result("b", 0.5)];
        let assembler = ContextAssembler::new(&graph, 5);
        let assembled = assembler.assemble(&[], &results, &by_id, ContextFormat::Markdown, 100_000);
        assert_eq!(assembled.warnings.len(), 1);
    }

    #[test]
    fn truncates_and_marks_when_over_budget() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let by_id: HashMap<String, Memory> = [("a".to_string(), memory("a"))].into_iter().collect();
        let results = vec![result("a", 0.9)];
        let assembler = ContextAssembler::new(&graph, 5);
        let assembled = assembler.assemble(&[], &results, &by_id, ContextFormat::PlainText, 2);
        assert!(assembled.truncated);
        assert!(assembled.rendered.contains("[Content truncated to fit token budget]"));
    }
}
