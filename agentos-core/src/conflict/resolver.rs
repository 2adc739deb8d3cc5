//! Resolver: applies a [`ResolutionRequest`] and
//! writes an immutable `resolution_log` entry for every attempt, including
//! partial failures.

use agentos_types::{
    next_memory_id, Confidence, ConflictStatus, Memory, MemoryStatus, ResolutionAction,
    ResolutionLogEntry, ResolutionRequest,
};
use chrono::{Duration, Utc};
use thiserror::Error;

use crate::conflict::store::ConflictStore;
use crate::error::{GraphError, StoreError};
use crate::memory_store::MemoryStore;
use crate::GraphStore;

/// Default suppression window for `defer`.
const DEFAULT_DEFER_TTL: i64 = 7; // days

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("conflict not found: {0}")]
    ConflictNotFound(String),
    #[error("memory not found: {0}")]
    MemoryNotFound(String),
    #[error("merge requires merged_content")]
    MissingMergedContent,
    #[error("deprecate/merge requires target_memory_id")]
    MissingTarget,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub struct Resolver<'a> {
    conflicts: &'a ConflictStore,
    memories: &'a MemoryStore,
    graph: &'a GraphStore,
}

impl<'a> Resolver<'a> {
    pub fn new(conflicts: &'a ConflictStore, memories: &'a MemoryStore, graph: &'a GraphStore) -> Self {
        Resolver { conflicts, memories, graph }
    }

    pub fn resolve(
        &self,
        request: &ResolutionRequest,
        new_memory_id: impl FnOnce() -> String,
    ) -> Result<ResolutionLogEntry, ResolveError> {
        let mut conflict = self
            .conflicts
            .get(&request.conflict_id)?
            .ok_or_else(|| ResolveError::ConflictNotFound(request.conflict_id.clone()))?;

        conflict.status = ConflictStatus::InProgress;
        self.conflicts.upsert(&conflict)?;

        let mut modified = Vec::new();
        let mut deprecated = Vec::new();
        let mut created = Vec::new();

        let result = match request.action {
            ResolutionAction::Deprecate => {
                self.apply_deprecate(request, &mut deprecated)
            }
            ResolutionAction::Merge => self.apply_merge(request, &conflict, &mut deprecated, &mut created, new_memory_id),
            ResolutionAction::Clarify => self.apply_clarify(request, &conflict, &mut modified),
            ResolutionAction::Dismiss => Ok(()),
            ResolutionAction::Defer => Ok(()),
        };

        let log_entry = ResolutionLogEntry {
            conflict_id: request.conflict_id.clone(),
            actor: request.resolved_by.clone(),
            action: request.action,
            memories_modified: modified,
            memories_deprecated: deprecated,
            memories_created: created,
            at: Utc::now(),
        };
        self.conflicts.append_resolution_log(&log_entry)?;

        match result {
            Ok(()) => {
                match request.action {
                    ResolutionAction::Dismiss => {
                        conflict.status = ConflictStatus::Dismissed;
                        conflict.description = format!("{} (dismissed: {})", conflict.description, request.reason);
                    }
                    ResolutionAction::Defer => {
                        conflict.suppressed_until = Some(Utc::now() + Duration::days(DEFAULT_DEFER_TTL));
                        conflict.status = ConflictStatus::Unresolved;
                    }
                    _ => {
                        conflict.status = ConflictStatus::Resolved;
                        conflict.resolution_action = Some(request.action);
                        conflict.resolved_by = Some(request.resolved_by.clone());
                        conflict.resolved_at = Some(Utc::now());
                    }
                }
                self.conflicts.upsert(&conflict)?;
                Ok(log_entry)
            }
            Err(e) => {
                // Conflict stays `in_progress`; the log above already recorded
                // whatever completed before the failure.
                Err(e)
            }
        }
    }

    fn apply_deprecate(&self, request: &ResolutionRequest, deprecated: &mut Vec<String>) -> Result<(), ResolveError> {
        let target_id = request.target_memory_id.as_ref().ok_or(ResolveError::MissingTarget)?;
        let mut target = self
            .memories
            .get(target_id)?
            .ok_or_else(|| ResolveError::MemoryNotFound(target_id.clone()))?;
        target.status = MemoryStatus::Deprecated;
        target.composite_embedding = None;
        self.memories.put(&target)?;
        deprecated.push(target_id.clone());
        Ok(())
    }

    fn apply_merge(
        &self,
        request: &ResolutionRequest,
        conflict: &agentos_types::Conflict,
        deprecated: &mut Vec<String>,
        created: &mut Vec<String>,
        new_memory_id: impl FnOnce() -> String,
    ) -> Result<(), ResolveError> {
        let merged_content = request.merged_content.as_ref().ok_or(ResolveError::MissingMergedContent)?;
        let mut m1 = self
            .memories
            .get(&conflict.m1_id)?
            .ok_or_else(|| ResolveError::MemoryNotFound(conflict.m1_id.clone()))?;
        let m2 = self
            .memories
            .get(&conflict.m2_id)?
            .ok_or_else(|| ResolveError::MemoryNotFound(conflict.m2_id.clone()))?;

        let new_id = new_memory_id();
        let mut tags = m1.tags.clone();
        tags.extend(m2.tags.clone());

        let merged = Memory {
            id: new_id.clone(),
            path: format!("{new_id}.md"),
            directory: m1.directory.clone(),
            title: format!("Merged: {} + {}", m1.title, m2.title),
            body: merged_content.clone(),
            scope: m1.scope,
            priority: m1.priority.max(m2.priority),
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags,
            token_count: Memory::estimate_tokens_from_chars(merged_content),
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: crate::hash::sha256_hex(merged_content),
            composite_embedding: None,
            directory_embedding: None,
            supersedes: vec![m1.id.clone(), m2.id.clone()],
            related: Vec::new(),
            expires_at: None,
        };
        self.memories.put(&merged)?;
        created.push(new_id.clone());

        m1.status = MemoryStatus::Deprecated;
        self.memories.put(&m1)?;
        deprecated.push(m1.id.clone());

        let mut m2 = m2;
        m2.status = MemoryStatus::Deprecated;
        self.memories.put(&m2)?;
        deprecated.push(m2.id.clone());

        self.graph.upsert_node(&new_id, agentos_types::NodeKind::Memory, serde_json::json!({"title": merged.title}))?;
        for superseded in [&conflict.m1_id, &conflict.m2_id] {
            self.graph.create_edge(
                agentos_types::Edge::new(new_id.clone(), superseded.clone(), agentos_types::EdgeType::Supersedes { reason: Some(request.reason.clone()) }),
                serde_json::json!({}),
            )?;
        }
        Ok(())
    }

    fn apply_clarify(
        &self,
        request: &ResolutionRequest,
        conflict: &agentos_types::Conflict,
        modified: &mut Vec<String>,
    ) -> Result<(), ResolveError> {
        for id in [&conflict.m1_id, &conflict.m2_id] {
            let mut memory = self
                .memories
                .get(id)?
                .ok_or_else(|| ResolveError::MemoryNotFound(id.clone()))?;
            memory.body.push_str(&format!("\n\n> Clarification: {}", request.reason));
            self.memories.put(&memory)?;
            modified.push(id.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{ConflictType, DetectionMethod, MemoryRole, Scope};
    use std::collections::BTreeSet;

    fn memory(id: &str) -> Memory {
        Memory {
            id: id.to_string(),
            path: format!("{id}.md"),
            directory: "global".into(),
            title: id.into(),
            body: "original body".into(),
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
            composite_embedding: Some(vec![1.0, 0.0]),
            directory_embedding: None,
            supersedes: Vec::new(),
            related: Vec::new(),
            expires_at: None,
        }
    }

    fn conflict(id: &str, m1: &str, m2: &str) -> agentos_types::Conflict {
        agentos_types::Conflict {
            id: id.to_string(),
            classification: ConflictType::Duplicate,
            detection_method: DetectionMethod::Semantic,
            confidence: 0.95,
            description: "dup".into(),
            evidence: vec![],
            status: ConflictStatus::Unresolved,
            m1_id: m1.to_string(),
            m2_id: m2.to_string(),
            m1_role: MemoryRole::Primary,
            m2_role: MemoryRole::Secondary,
            resolution_action: None,
            resolved_by: None,
            resolved_at: None,
            suppressed_until: None,
            scan_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn deprecate_marks_target_and_resolves_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let conflicts = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();

        memories.put(&memory("m1")).unwrap();
        memories.put(&memory("m2")).unwrap();
        conflicts.upsert(&conflict("c1", "m1", "m2")).unwrap();

        let resolver = Resolver::new(&conflicts, &memories, &graph);
        let request = ResolutionRequest {
            conflict_id: "c1".into(),
            action: ResolutionAction::Deprecate,
            target_memory_id: Some("m2".into()),
            merged_content: None,
            reason: "m1 is newer".into(),
            resolved_by: "alice".into(),
        };
        resolver.resolve(&request, || "unused".into()).unwrap();

        let m2 = memories.get("m2").unwrap().unwrap();
        assert_eq!(m2.status, MemoryStatus::Deprecated);
        assert!(m2.composite_embedding.is_none());
        let updated = conflicts.get("c1").unwrap().unwrap();
        assert_eq!(updated.status, ConflictStatus::Resolved);
    }

    #[test]
    fn merge_creates_new_memory_and_deprecates_originals() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let conflicts = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();

        memories.put(&memory("m1")).unwrap();
        memories.put(&memory("m2")).unwrap();
        graph.upsert_node("m1", agentos_types::NodeKind::Memory, serde_json::json!({})).unwrap();
        graph.upsert_node("m2", agentos_types::NodeKind::Memory, serde_json::json!({})).unwrap();
        conflicts.upsert(&conflict("c1", "m1", "m2")).unwrap();

        let resolver = Resolver::new(&conflicts, &memories, &graph);
        let request = ResolutionRequest {
            conflict_id: "c1".into(),
            action: ResolutionAction::Merge,
            target_memory_id: None,
            merged_content: Some("merged text".into()),
            reason: "combine".into(),
            resolved_by: "alice".into(),
        };
        let log = resolver.resolve(&request, || "mem_merged_1".into()).unwrap();
        assert_eq!(log.memories_created, vec!["mem_merged_1"]);
        assert_eq!(log.memories_deprecated.len(), 2);
        assert!(graph.edge_exists("mem_merged_1", "m1", "SUPERSEDES"));
    }

    #[test]
    fn dismiss_sets_status_without_mutating_memories() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let conflicts = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        memories.put(&memory("m1")).unwrap();
        memories.put(&memory("m2")).unwrap();
        conflicts.upsert(&conflict("c1", "m1", "m2")).unwrap();

        let resolver = Resolver::new(&conflicts, &memories, &graph);
        let request = ResolutionRequest {
            conflict_id: "c1".into(),
            action: ResolutionAction::Dismiss,
            target_memory_id: None,
            merged_content: None,
            reason: "false positive".into(),
            resolved_by: "bob".into(),
        };
        resolver.resolve(&request, || "unused".into()).unwrap();
        let updated = conflicts.get("c1").unwrap().unwrap();
        assert_eq!(updated.status, ConflictStatus::Dismissed);
    }
}
