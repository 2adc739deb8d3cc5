//! Knowledge graph store.
//!
//! `rusqlite` holds the durable node/edge rows; a `petgraph::DiGraph` rebuilt
//! from those rows on open serves traversal (BFS expansion, shortest path).
//! This keeps a load-then-serve shape rather than keeping the graph purely
//! row-backed, because the traversal contract (`get_related_memories`,
//! `find_path`, `get_supersession_chain`) is naturally expressed over an
//! adjacency
//! structure, not repeated recursive SQL.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, RwLock};

use agentos_types::{pair_hash, sorted_pair, Edge, EdgeType, NodeKind};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::GraphError;

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: String,
    pub kind: NodeKind,
    pub properties: Value,
}

#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub edge_type: EdgeType,
    pub properties: Value,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GraphStats {
    pub node_counts: HashMap<String, u64>,
    pub edge_counts: HashMap<String, u64>,
}

struct Inner {
    graph: DiGraph<NodeRecord, EdgeRecord>,
    index: HashMap<String, NodeIndex>,
}

/// Single source of truth for node/edge data.
///
/// Not crash-atomic across multiple calls; callers needing atomicity across
/// several graph operations must wrap them in their own transaction boundary
pub struct GraphStore {
    conn: Arc<std::sync::Mutex<Connection>>,
    inner: RwLock<Inner>,
}

fn node_kind_str(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Memory => "memory",
        NodeKind::Tag => "tag",
        NodeKind::Scope => "scope",
        NodeKind::Concept => "concept",
        NodeKind::Agent => "agent",
        NodeKind::Skill => "skill",
        NodeKind::Tool => "tool",
    }
}

fn node_kind_from_str(s: &str) -> Option<NodeKind> {
    match s {
        "memory" => Some(NodeKind::Memory),
        "tag" => Some(NodeKind::Tag),
        "scope" => Some(NodeKind::Scope),
        "concept" => Some(NodeKind::Concept),
        "agent" => Some(NodeKind::Agent),
        "skill" => Some(NodeKind::Skill),
        "tool" => Some(NodeKind::Tool),
        _ => None,
    }
}

impl GraphStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let conn = Connection::open(path).map_err(crate::error::StoreError::from)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(crate::error::StoreError::from)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(crate::error::StoreError::from)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS graph_nodes (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                properties TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS graph_edges (
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                edge_type_label TEXT NOT NULL,
                edge_type_json TEXT NOT NULL,
                properties TEXT NOT NULL,
                PRIMARY KEY (from_id, to_id, edge_type_label)
            );
            "#,
        )
        .map_err(crate::error::StoreError::from)?;

        let inner = Self::load(&conn)?;
        Ok(GraphStore {
            conn: Arc::new(std::sync::Mutex::new(conn)),
            inner: RwLock::new(inner),
        })
    }

    fn load(conn: &Connection) -> Result<Inner, GraphError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        let mut stmt = conn
            .prepare("SELECT id, kind, properties FROM graph_nodes")
            .map_err(crate::error::StoreError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(crate::error::StoreError::from)?;
        for row in rows {
            let (id, kind_str, props_str) = row.map_err(crate::error::StoreError::from)?;
            let kind = node_kind_from_str(&kind_str)
                .ok_or_else(|| GraphError::NodeNotFound(format!("unknown node kind {kind_str}")))?;
            let properties: Value = serde_json::from_str(&props_str)
                .map_err(crate::error::StoreError::from)?;
            let idx = graph.add_node(NodeRecord {
                id: id.clone(),
                kind,
                properties,
            });
            index.insert(id, idx);
        }
        drop(stmt);

        let mut stmt = conn
            .prepare("SELECT from_id, to_id, edge_type_json, properties FROM graph_edges")
            .map_err(crate::error::StoreError::from)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(crate::error::StoreError::from)?;
        for row in rows {
            let (from_id, to_id, edge_type_json, props_str) = row.map_err(crate::error::StoreError::from)?;
            let edge_type: EdgeType = serde_json::from_str(&edge_type_json)
                .map_err(crate::error::StoreError::from)?;
            let properties: Value = serde_json::from_str(&props_str)
                .map_err(crate::error::StoreError::from)?;
            if let (Some(&from), Some(&to)) = (index.get(&from_id), index.get(&to_id)) {
                graph.add_edge(from, to, EdgeRecord { edge_type, properties });
            }
        }

        Ok(Inner { graph, index })
    }

    /// Upsert is a MERGE: replace properties entirely if the node exists.
    pub fn upsert_node(&self, id: &str, kind: NodeKind, properties: Value) -> Result<(), GraphError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_nodes (id, kind, properties) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET kind = excluded.kind, properties = excluded.properties",
            params![id, node_kind_str(kind), properties.to_string()],
        )
        .map_err(crate::error::StoreError::from)?;
        drop(conn);

        let mut inner = self.inner.write().unwrap();
        if let Some(&idx) = inner.index.get(id) {
            let node = inner.graph.node_weight_mut(idx).unwrap();
            node.kind = kind;
            node.properties = properties;
        } else {
            let idx = inner.graph.add_node(NodeRecord {
                id: id.to_string(),
                kind,
                properties,
            });
            inner.index.insert(id.to_string(), idx);
        }
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<NodeRecord> {
        let inner = self.inner.read().unwrap();
        inner.index.get(id).map(|&idx| inner.graph[idx].clone())
    }

    /// Deletes a node and cascades its edges.
    pub fn delete_node(&self, id: &str) -> Result<(), GraphError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM graph_edges WHERE from_id = ?1 OR to_id = ?1",
            params![id],
        )
        .map_err(crate::error::StoreError::from)?;
        conn.execute("DELETE FROM graph_nodes WHERE id = ?1", params![id])
            .map_err(crate::error::StoreError::from)?;
        drop(conn);

        let mut inner = self.inner.write().unwrap();
        if let Some(idx) = inner.index.remove(id) {
            inner.graph.remove_node(idx);
            // removing a node shifts petgraph indices; rebuild the id index.
            inner.index = inner
                .graph
                .node_indices()
                .map(|i| (inner.graph[i].id.clone(), i))
                .collect();
        }
        Ok(())
    }

    fn validate_edge(&self, edge: &Edge) -> Result<(), GraphError> {
        if edge.from_id == edge.to_id {
            return Err(GraphError::EndpointMismatch {
                edge_type: edge.edge_type.label().to_string(),
                expected: "no self-loops".into(),
            });
        }
        if let Some(w) = edge.edge_type.weight() {
            if !(0.0..=1.0).contains(&w) {
                return Err(GraphError::EndpointMismatch {
                    edge_type: edge.edge_type.label().to_string(),
                    expected: "weight in [0,1]".into(),
                });
            }
        }
        let inner = self.inner.read().unwrap();
        let (from_kind, to_kind) = edge.edge_type.expected_endpoints();
        let from_idx = *inner
            .index
            .get(&edge.from_id)
            .ok_or_else(|| GraphError::NodeNotFound(edge.from_id.clone()))?;
        let to_idx = *inner
            .index
            .get(&edge.to_id)
            .ok_or_else(|| GraphError::NodeNotFound(edge.to_id.clone()))?;
        let from_ok = inner.graph[from_idx].kind == from_kind;
        let to_ok = inner.graph[to_idx].kind == to_kind;
        if !from_ok || !to_ok {
            return Err(GraphError::EndpointMismatch {
                edge_type: edge.edge_type.label().to_string(),
                expected: format!("{from_kind:?} -> {to_kind:?}"),
            });
        }
        if matches!(edge.edge_type, EdgeType::Supersedes { .. }) {
            drop(inner);
            if self.would_create_supersedes_cycle(&edge.from_id, &edge.to_id)? {
                return Err(GraphError::SupersedesCycle(edge.to_id.clone()));
            }
        }
        Ok(())
    }

    fn would_create_supersedes_cycle(&self, from: &str, to: &str) -> Result<bool, GraphError> {
        // Adding from->to creates a cycle iff `to` can already reach `from`.
        let inner = self.inner.read().unwrap();
        let Some(&start) = inner.index.get(to) else {
            return Ok(false);
        };
        let Some(&target) = inner.index.get(from) else {
            return Ok(false);
        };
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            if node == target {
                return Ok(true);
            }
            if !visited.insert(node) {
                continue;
            }
            for edge in inner.graph.edges_directed(node, Direction::Outgoing) {
                if matches!(edge.weight().edge_type, EdgeType::Supersedes { .. }) {
                    queue.push_back(edge.target());
                }
            }
        }
        Ok(false)
    }

    /// Creates a typed edge; rejects mismatched endpoint kinds, self-loops,
    /// out-of-range weights, and `SUPERSEDES` cycles.
    pub fn create_edge(&self, edge: Edge, properties: Value) -> Result<(), GraphError> {
        self.validate_edge(&edge)?;
        let label = edge.edge_type.label();
        let edge_type_json = serde_json::to_string(&edge.edge_type).map_err(crate::error::StoreError::from)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO graph_edges (from_id, to_id, edge_type_label, edge_type_json, properties) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(from_id, to_id, edge_type_label) DO UPDATE SET edge_type_json = excluded.edge_type_json, properties = excluded.properties",
            params![edge.from_id, edge.to_id, label, edge_type_json, properties.to_string()],
        )
        .map_err(crate::error::StoreError::from)?;
        drop(conn);

        let mut inner = self.inner.write().unwrap();
        // validate_edge above already confirmed both endpoints exist.
        let from_idx = inner.index[&edge.from_id];
        let to_idx = inner.index[&edge.to_id];
        if let Some(existing) = inner
            .graph
            .edges_connecting(from_idx, to_idx)
            .find(|e| e.weight().edge_type.label() == label)
            .map(|e| e.id())
        {
            inner.graph.remove_edge(existing);
        }
        inner.graph.add_edge(
            from_idx,
            to_idx,
            EdgeRecord {
                edge_type: edge.edge_type,
                properties,
            },
        );
        Ok(())
    }

    pub fn delete_edge(&self, from: &str, to: &str, edge_type_label: &str) -> Result<(), GraphError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM graph_edges WHERE from_id = ?1 AND to_id = ?2 AND edge_type_label = ?3",
            params![from, to, edge_type_label],
        )
        .map_err(crate::error::StoreError::from)?;
        drop(conn);

        let mut inner = self.inner.write().unwrap();
        if let (Some(&from_idx), Some(&to_idx)) = (inner.index.get(from), inner.index.get(to)) {
            if let Some(eid) = inner
                .graph
                .edges_connecting(from_idx, to_idx)
                .find(|e| e.weight().edge_type.label() == edge_type_label)
                .map(|e| e.id())
            {
                inner.graph.remove_edge(eid);
            }
        }
        Ok(())
    }

    pub fn edge_exists(&self, from: &str, to: &str, edge_type_label: &str) -> bool {
        let inner = self.inner.read().unwrap();
        let Some((&from_idx, &to_idx)) = inner.index.get(from).zip(inner.index.get(to)) else {
            return false;
        };
        inner
            .graph
            .edges_connecting(from_idx, to_idx)
            .any(|e| e.weight().edge_type.label() == edge_type_label)
    }

    pub fn edges_from(&self, id: &str, edge_type_label: Option<&str>) -> Vec<(String, EdgeType)> {
        let inner = self.inner.read().unwrap();
        let Some(&idx) = inner.index.get(id) else {
            return Vec::new();
        };
        inner
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| edge_type_label.map_or(true, |t| e.weight().edge_type.label() == t))
            .map(|e| (inner.graph[e.target()].id.clone(), e.weight().edge_type.clone()))
            .collect()
    }

    pub fn edges_to(&self, id: &str, edge_type_label: Option<&str>) -> Vec<(String, EdgeType)> {
        let inner = self.inner.read().unwrap();
        let Some(&idx) = inner.index.get(id) else {
            return Vec::new();
        };
        inner
            .graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| edge_type_label.map_or(true, |t| e.weight().edge_type.label() == t))
            .map(|e| (inner.graph[e.source()].id.clone(), e.weight().edge_type.clone()))
            .collect()
    }

    /// Variable-length traversal over `edge_types` (default: none filter = all
    /// outgoing edges), deduplicated, bounded by `max_depth`.
    pub fn get_related_memories(
        &self,
        id: &str,
        max_depth: u32,
        edge_types: Option<&[&str]>,
    ) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let Some(&start) = inner.index.get(id) else {
            return Vec::new();
        };
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut frontier = vec![start];
        let mut result = Vec::new();
        for _ in 0..max_depth {
            let mut next = Vec::new();
            for node in frontier {
                for edge in inner.graph.edges_directed(node, Direction::Outgoing) {
                    if let Some(types) = edge_types {
                        if !types.contains(&edge.weight().edge_type.label()) {
                            continue;
                        }
                    }
                    let target = edge.target();
                    if visited.insert(target) {
                        result.push(inner.graph[target].id.clone());
                        next.push(target);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        result
    }

    /// All unordered memory pairs with a `CONTRADICTS` edge between them.
    pub fn get_contradiction_pairs(&self) -> Vec<(String, String, String)> {
        let inner = self.inner.read().unwrap();
        let mut seen = HashSet::new();
        let mut pairs = Vec::new();
        for edge in inner.graph.edge_references() {
            if let EdgeType::Contradicts { description } = &edge.weight().edge_type {
                let a = &inner.graph[edge.source()].id;
                let b = &inner.graph[edge.target()].id;
                let key = pair_hash(a, b);
                if seen.insert(key) {
                    let (lo, hi) = sorted_pair(a, b);
                    pairs.push((lo, hi, description.clone()));
                }
            }
        }
        pairs
    }

    /// Walks `SUPERSEDES` edges from `id`, returning the chain of superseded
    /// ids in order.
    pub fn get_supersession_chain(&self, id: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let Some(&mut_start) = inner.index.get(id) else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        let mut current = mut_start;
        let mut guard = HashSet::new();
        loop {
            guard.insert(current);
            let next = inner
                .graph
                .edges_directed(current, Direction::Outgoing)
                .find(|e| matches!(e.weight().edge_type, EdgeType::Supersedes { .. }))
                .map(|e| e.target());
            match next {
                Some(n) if !guard.contains(&n) => {
                    chain.push(inner.graph[n].id.clone());
                    current = n;
                }
                _ => break,
            }
        }
        chain
    }

    /// Breadth-first shortest path bounded by `max_depth`.
    pub fn find_path(&self, from: &str, to: &str, max_depth: u32) -> Option<Vec<String>> {
        let inner = self.inner.read().unwrap();
        let start = *inner.index.get(from)?;
        let goal = *inner.index.get(to)?;
        if start == goal {
            return Some(vec![from.to_string()]);
        }
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut queue = VecDeque::new();
        queue.push_back((start, vec![start]));
        while let Some((node, path)) = queue.pop_front() {
            if path.len() as u32 - 1 >= max_depth {
                continue;
            }
            for edge in inner.graph.edges_directed(node, Direction::Outgoing) {
                let next = edge.target();
                if next == goal {
                    let mut full = path.clone();
                    full.push(next);
                    return Some(full.into_iter().map(|i| inner.graph[i].id.clone()).collect());
                }
                if visited.insert(next) {
                    let mut next_path = path.clone();
                    next_path.push(next);
                    queue.push_back((next, next_path));
                }
            }
        }
        None
    }

    pub fn get_stats(&self) -> GraphStats {
        let inner = self.inner.read().unwrap();
        let mut node_counts = HashMap::new();
        for node in inner.graph.node_weights() {
            *node_counts.entry(node_kind_str(node.kind).to_string()).or_insert(0) += 1;
        }
        let mut edge_counts = HashMap::new();
        for edge in inner.graph.edge_weights() {
            *edge_counts.entry(edge.edge_type.label().to_string()).or_insert(0) += 1;
        }
        GraphStats { node_counts, edge_counts }
    }

    /// Raw SQL passthrough for admin use over the durable node/edge tables.
    /// Stands in for a Cypher-style `execute_cypher`: nothing in the
    /// available stack binds an embedded graph database, so admin queries
    /// run as SQL here instead.
    pub fn execute_sql(&self, query: &str) -> Result<Vec<HashMap<String, String>>, GraphError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(query).map_err(crate::error::StoreError::from)?;
        let col_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let rows = stmt
            .query_map([], |row| {
                let mut map = HashMap::new();
                for (i, name) in col_names.iter().enumerate() {
                    let value: String = row
                        .get::<_, Option<String>>(i)?
                        .unwrap_or_default();
                    map.insert(name.clone(), value);
                }
                Ok(map)
            })
            .map_err(crate::error::StoreError::from)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| crate::error::StoreError::from(e).into())
    }
}

use petgraph::visit::EdgeRef;

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::Edge;

    fn mem(id: &str) -> Value {
        serde_json::json!({"id": id})
    }

    #[test]
    fn upsert_then_get_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        store.upsert_node("m1", NodeKind::Memory, mem("m1")).unwrap();
        store.upsert_node("m1", NodeKind::Memory, mem("m1-updated")).unwrap();
        let stats = store.get_stats();
        assert_eq!(stats.node_counts.get("memory"), Some(&1));
    }

    #[test]
    fn rejects_self_loop() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        store.upsert_node("m1", NodeKind::Memory, mem("m1")).unwrap();
        let edge = Edge::new(
            "m1",
            "m1",
            EdgeType::RelatesTo { weight: 0.5, context: None },
        );
        assert!(store.create_edge(edge, Value::Null).is_err());
    }

    #[test]
    fn rejects_supersedes_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        for id in ["a", "b", "c"] {
            store.upsert_node(id, NodeKind::Memory, mem(id)).unwrap();
        }
        store
            .create_edge(
                Edge::new("a", "b", EdgeType::Supersedes { reason: None }),
                Value::Null,
            )
            .unwrap();
        store
            .create_edge(
                Edge::new("b", "c", EdgeType::Supersedes { reason: None }),
                Value::Null,
            )
            .unwrap();
        let cyclic = Edge::new("c", "a", EdgeType::Supersedes { reason: None });
        assert!(store.create_edge(cyclic, Value::Null).is_err());
    }

    #[test]
    fn find_path_bfs_shortest() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        for id in ["a", "b", "c", "d"] {
            store.upsert_node(id, NodeKind::Memory, mem(id)).unwrap();
        }
        store
            .create_edge(Edge::new("a", "b", EdgeType::RelatesTo { weight: 1.0, context: None }), Value::Null)
            .unwrap();
        store
            .create_edge(Edge::new("b", "c", EdgeType::RelatesTo { weight: 1.0, context: None }), Value::Null)
            .unwrap();
        store
            .create_edge(Edge::new("a", "d", EdgeType::RelatesTo { weight: 1.0, context: None }), Value::Null)
            .unwrap();
        store
            .create_edge(Edge::new("d", "c", EdgeType::RelatesTo { weight: 1.0, context: None }), Value::Null)
            .unwrap();
        let path = store.find_path("a", "c", 5).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.first().unwrap(), "a");
        assert_eq!(path.last().unwrap(), "c");
    }

    #[test]
    fn find_path_respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        for id in ["a", "b", "c"] {
            store.upsert_node(id, NodeKind::Memory, mem(id)).unwrap();
        }
        store
            .create_edge(Edge::new("a", "b", EdgeType::RelatesTo { weight: 1.0, context: None }), Value::Null)
            .unwrap();
        store
            .create_edge(Edge::new("b", "c", EdgeType::RelatesTo { weight: 1.0, context: None }), Value::Null)
            .unwrap();
        assert!(store.find_path("a", "c", 1).is_none());
        assert!(store.find_path("a", "c", 2).is_some());
    }

    #[test]
    fn reopen_rebuilds_graph_from_durable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.sqlite");
        {
            let store = GraphStore::open(&path).unwrap();
            store.upsert_node("m1", NodeKind::Memory, mem("m1")).unwrap();
            store.upsert_node("t1", NodeKind::Tag, mem("t1")).unwrap();
            store
                .create_edge(Edge::new("m1", "t1", EdgeType::HasTag), Value::Null)
                .unwrap();
        }
        let reopened = GraphStore::open(&path).unwrap();
        assert!(reopened.edge_exists("m1", "t1", "HAS_TAG"));
    }
}
