//! Idempotent graph (re)build from `MemoryStore` contents.
//!
//! Scope and memory nodes, tag nodes and `HAS_TAG`/
//! `IN_SCOPE` edges, explicit `supersedes`/`related` front-matter edges, and
//! `TAG_COOCCURS` weights are all derived purely from `Memory` rows, so this
//! can run standalone (`agentos graph migrate`) or at store bootstrap.

use std::collections::HashMap;

use agentos_types::{Edge, EdgeType, Memory, NodeKind, Scope};
use serde_json::json;
use tracing::info;

use crate::error::GraphError;
use crate::graph::GraphStore;

pub struct GraphMigration;

#[derive(Debug, Default, Clone)]
pub struct MigrationReport {
    pub memory_nodes: usize,
    pub tag_nodes: usize,
    pub scope_nodes: usize,
    pub has_tag_edges: usize,
    pub in_scope_edges: usize,
    pub supersedes_edges: usize,
    pub related_edges: usize,
    pub tag_cooccurs_edges: usize,
}

impl GraphMigration {
    /// Rebuilds every node and edge derivable from `memories`. Upserts are
    /// idempotent MERGEs, so running this twice over the same
    /// memory set produces the same graph.
    pub fn run(graph: &GraphStore, memories: &[Memory]) -> Result<MigrationReport, GraphError> {
        let mut report = MigrationReport::default();

        for scope in Scope::ALL {
            graph.upsert_node(scope.as_str(), NodeKind::Scope, json!({ "name": scope.as_str() }))?;
            report.scope_nodes += 1;
        }

        let mut tag_usage: HashMap<String, u64> = HashMap::new();
        for memory in memories {
            graph.upsert_node(
                &memory.id,
                NodeKind::Memory,
                json!({
                    "path": memory.path,
                    "title": memory.title,
                    "scope": memory.scope.as_str(),
                    "status": memory.status,
                }),
            )?;
            report.memory_nodes += 1;

            graph.create_edge(
                Edge::new(memory.id.clone(), memory.scope.as_str(), EdgeType::InScope),
                json!({}),
            )?;
            report.in_scope_edges += 1;

            for tag in &memory.tags {
                *tag_usage.entry(tag.clone()).or_insert(0) += 1;
            }
        }

        for (tag, usage_count) in &tag_usage {
            graph.upsert_node(tag, NodeKind::Tag, json!({ "usage_count": usage_count }))?;
            report.tag_nodes += 1;
        }

        for memory in memories {
            for tag in &memory.tags {
                graph.create_edge(Edge::new(memory.id.clone(), tag.clone(), EdgeType::HasTag), json!({}))?;
                report.has_tag_edges += 1;
            }
            for superseded_id in &memory.supersedes {
                graph.create_edge(
                    Edge::new(memory.id.clone(), superseded_id.clone(), EdgeType::Supersedes { reason: None }),
                    json!({}),
                )?;
                report.supersedes_edges += 1;
            }
            for related_id in &memory.related {
                graph.create_edge(
                    Edge::new(
                        memory.id.clone(),
                        related_id.clone(),
                        EdgeType::RelatesTo { weight: 0.5, context: Some("front_matter related".into()) },
                    ),
                    json!({}),
                )?;
                report.related_edges += 1;
            }
        }

        report.tag_cooccurs_edges = Self::build_tag_cooccurrence(graph, memories)?;

        info!(
            memory_nodes = report.memory_nodes,
            tag_nodes = report.tag_nodes,
            has_tag_edges = report.has_tag_edges,
            "graph migration complete"
        );
        Ok(report)
    }

    fn build_tag_cooccurrence(graph: &GraphStore, memories: &[Memory]) -> Result<usize, GraphError> {
        let mut counts: HashMap<(String, String), u64> = HashMap::new();
        for memory in memories {
            let tags: Vec<&String> = memory.tags.iter().collect();
            for i in 0..tags.len() {
                for j in (i + 1)..tags.len() {
                    let (a, b) = agentos_types::sorted_pair(tags[i], tags[j]);
                    *counts.entry((a, b)).or_insert(0) += 1;
                }
            }
        }
        let mut created = 0;
        for ((a, b), count) in counts {
            graph.create_edge(Edge::new(a, b, EdgeType::TagCooccurs { count }), json!({}))?;
            created += 1;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{Confidence, MemoryStatus};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn memory(id: &str, tags: &[&str]) -> Memory {
        Memory {
            id: id.to_string(),
            path: format!("{id}.md"),
            directory: "global".into(),
            title: id.to_string(),
            body: "body".into(),
            scope: Scope::Global,
            priority: 0.5,
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags: tags.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            token_count: 10,
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: "hash".into(),
            composite_embedding: None,
            directory_embedding: None,
            supersedes: Vec::new(),
            related: Vec::new(),
            expires_at: None,
        }
    }

    #[test]
    fn migration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let memories = vec![memory("mem_2026_01_01_001", &["rust", "testing"])];
        let first = GraphMigration::run(&graph, &memories).unwrap();
        let second = GraphMigration::run(&graph, &memories).unwrap();
        assert_eq!(first.memory_nodes, second.memory_nodes);
        let stats = graph.get_stats();
        assert_eq!(stats.node_counts.get("memory"), Some(&1));
    }

    #[test]
    fn tag_cooccurrence_counts_shared_memories() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let memories = vec![
            memory("m1", &["rust", "testing"]),
            memory("m2", &["rust", "testing"]),
        ];
        GraphMigration::run(&graph, &memories).unwrap();
        assert!(graph.edge_exists("rust", "testing", "TAG_COOCCURS"));
    }
}
