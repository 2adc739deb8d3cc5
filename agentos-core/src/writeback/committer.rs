//! Committer: processes `approved` proposals through the
//! stale-precondition check, file write, reindex, targeted conflict scan,
//! and graph edge update, in that reconciliation order.

use std::path::{Path, PathBuf};

use agentos_types::{
    Confidence, Memory, MemoryStatus, ProposalStatus, ProposalType, Scope, WriteProposal,
};
use chrono::Utc;
use thiserror::Error;

use crate::collaborators::Embedder;
use crate::conflict::detector::{Detector, ScanRequest};
use crate::conflict::store::ConflictStore;
use crate::error::{GraphError, StoreError};
use crate::graph::GraphStore;
use crate::hash::sha256_hex;
use crate::memory_store::MemoryStore;
use crate::retrieval::extractors::{merge_candidates, persist_candidates, tag_extractor};
use crate::writeback::queue::ReviewQueue;
use agentos_config::ExtractorSettings;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("stale_precondition")]
    StalePrecondition,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CommitError {
    /// The literal string stored in `WriteProposal.commit_error`
    pub fn as_commit_error_string(&self) -> String {
        match self {
            CommitError::StalePrecondition => "stale_precondition".to_string(),
            other => other.to_string(),
        }
    }
}

pub struct Committer<'a> {
    queue: &'a ReviewQueue,
    memories: &'a MemoryStore,
    graph: &'a GraphStore,
    conflicts: &'a ConflictStore,
    memory_root: PathBuf,
    max_retries: u32,
}

impl<'a> Committer<'a> {
    pub fn new(
        queue: &'a ReviewQueue,
        memories: &'a MemoryStore,
        graph: &'a GraphStore,
        conflicts: &'a ConflictStore,
        memory_root: impl Into<PathBuf>,
        max_retries: u32,
    ) -> Self {
        Committer {
            queue,
            memories,
            graph,
            conflicts,
            memory_root: memory_root.into(),
            max_retries,
        }
    }

    fn resolve_path(&self, target_path: &str) -> PathBuf {
        self.memory_root.join(target_path)
    }

    fn current_file_hash(&self, path: &Path) -> std::io::Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(sha256_hex(&std::fs::read_to_string(path)?)))
    }

    fn write_atomic(&self, path: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)
    }

    /// Processes every `approved` proposal up to `limit`, in enqueue order
    /// per `target_path`.
    pub async fn process_pending(
        &self,
        embedder: &dyn Embedder,
        extractor_settings: &ExtractorSettings,
        limit: u32,
        next_scan_id: impl Fn() -> String,
        next_conflict_id: impl Fn() -> String,
    ) -> Result<Vec<(String, Result<(), CommitError>)>, StoreError> {
        let approved = self.queue.get_by_status(ProposalStatus::Approved, limit)?;
        let mut results = Vec::with_capacity(approved.len());
        for proposal in approved {
            if proposal.retry_count > self.max_retries {
                continue;
            }
            let outcome = self
                .commit_one(&proposal, embedder, extractor_settings, &next_scan_id, &next_conflict_id)
                .await;
            results.push((proposal.id.clone(), outcome));
        }
        Ok(results)
    }

    /// Commits a single proposal. On failure the proposal is
    /// marked `failed`, the error recorded, and the retry counter
    /// incremented; it does not auto-retry.
    pub async fn commit_one(
        &self,
        proposal: &WriteProposal,
        embedder: &dyn Embedder,
        extractor_settings: &ExtractorSettings,
        next_scan_id: impl Fn() -> String,
        next_conflict_id: impl Fn() -> String,
    ) -> Result<(), CommitError> {
        match self.try_commit(proposal, embedder, extractor_settings, next_scan_id, next_conflict_id).await {
            Ok(()) => {
                self.queue.update_status(&proposal.id, ProposalStatus::Committed, None)?;
                Ok(())
            }
            Err(err) => {
                self.queue.set_commit_error(&proposal.id, &err.as_commit_error_string())?;
                self.queue.increment_retry(&proposal.id)?;
                self.queue.update_status(&proposal.id, ProposalStatus::Failed, Some(&err.to_string()))?;
                Err(err)
            }
        }
    }

    async fn try_commit(
        &self,
        proposal: &WriteProposal,
        embedder: &dyn Embedder,
        extractor_settings: &ExtractorSettings,
        next_scan_id: impl Fn() -> String,
        next_conflict_id: impl Fn() -> String,
    ) -> Result<(), CommitError> {
        let path = self.resolve_path(&proposal.target_path);
        let current_hash = self.current_file_hash(&path)?;
        if proposal.proposal_type != ProposalType::Create && current_hash != proposal.pre_image_hash {
            return Err(CommitError::StalePrecondition);
        }

        self.write_atomic(&path, &proposal.content)?;
        let new_hash = sha256_hex(&proposal.content);

        let embedding = embedder.embed_text(&proposal.content).await?;

        let existing = self.memories.get_by_path(&proposal.target_path)?;
        let memory = self.build_memory(proposal, existing, new_hash, embedding);
        self.memories.put(&memory)?;

        self.graph.upsert_node(
            &memory.id,
            agentos_types::NodeKind::Memory,
            serde_json::json!({ "title": memory.title, "path": memory.path }),
        )?;

        let pool = self.memories.list_all()?;

        let mut candidates = tag_extractor(&pool);
        candidates.extend(crate::retrieval::extractors::semantic_extractor(&pool, extractor_settings));
        let merged = merge_candidates(candidates, extractor_settings);
        persist_candidates(self.graph, &merged)?;

        let detector = Detector::new(self.conflicts, chrono::Duration::days(90));
        let mut request = ScanRequest::default();
        request.target_memory_id = Some(memory.id.clone());
        detector.scan(&pool, &request, next_scan_id(), next_conflict_id)?;

        Ok(())
    }

    fn build_memory(
        &self,
        proposal: &WriteProposal,
        existing: Option<Memory>,
        content_hash: String,
        embedding: Vec<f32>,
    ) -> Memory {
        let tags = proposal.tags.iter().cloned().collect();
        let scope = proposal
            .scope
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Scope::Global);
        let directory = proposal
            .target_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();
        let title = proposal
            .content
            .lines()
            .find(|l| l.trim_start().starts_with('#'))
            .map(|l| l.trim_start_matches('#').trim().to_string())
            .unwrap_or_else(|| proposal.target_path.clone());

        match existing {
            Some(mut memory) => {
                memory.body = proposal.content.clone();
                memory.title = title;
                memory.tags = tags;
                memory.scope = scope;
                memory.token_count = Memory::estimate_tokens_from_chars(&proposal.content);
                memory.content_hash = content_hash;
                memory.composite_embedding = Some(embedding);
                memory
            }
            None => Memory {
                id: proposal.id.clone(),
                path: proposal.target_path.clone(),
                directory,
                title,
                body: proposal.content.clone(),
                scope,
                priority: 0.5,
                confidence: Confidence::Active,
                status: MemoryStatus::Active,
                tags,
                token_count: Memory::estimate_tokens_from_chars(&proposal.content),
                created_at: Utc::now(),
                last_used_at: None,
                usage_count: 0,
                content_hash,
                composite_embedding: Some(embedding),
                directory_embedding: None,
                supersedes: Vec::new(),
                related: Vec::new(),
                expires_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writeback::queue::ReviewQueue;
    use async_trait::async_trait;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, StoreError> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        fn model_name(&self) -> &str {
            "fixed-test-embedder"
        }
    }

    fn proposal(id: &str, path: &str, content: &str) -> WriteProposal {
        WriteProposal {
            id: id.to_string(),
            proposal_type: ProposalType::Create,
            target_path: path.to_string(),
            reason: "test".into(),
            content: content.into(),
            proposed_by: "agent-a".into(),
            retry_count: 0,
            status: ProposalStatus::Approved,
            commit_error: None,
            pre_image_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tags: vec!["rust".into()],
            scope: Some("global".into()),
        }
    }

    #[tokio::test]
    async fn commit_writes_file_and_indexes_memory() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::open(dir.path().join("q.sqlite")).unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let conflicts = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let root = dir.path().join("memory");
        let committer = Committer::new(&queue, &memories, &graph, &conflicts, &root, 3);

        let p = proposal("mem_2026_07_27_001", "global/new.md", "# New\n\nbody text");
        queue.enqueue(&p).unwrap();

        let settings = agentos_config::ExtractorSettings::default();
        committer
            .commit_one(&p, &FixedEmbedder, &settings, || "scan1".into(), || "conf1".into())
            .await
            .unwrap();

        assert!(root.join("global/new.md").exists());
        let stored = memories.get_by_path("global/new.md").unwrap().unwrap();
        assert_eq!(stored.title, "New");
        let updated = queue.get(&p.id).unwrap().unwrap();
        assert_eq!(updated.status, ProposalStatus::Committed);
    }

    #[tokio::test]
    async fn stale_precondition_fails_update_without_pre_image_match() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::open(dir.path().join("q.sqlite")).unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let graph = GraphStore::open(dir.path().join("g.sqlite")).unwrap();
        let conflicts = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let root = dir.path().join("memory");
        std::fs::create_dir_all(root.join("global")).unwrap();
        std::fs::write(root.join("global/existing.md"), "# Existing\n\noriginal").unwrap();
        let committer = Committer::new(&queue, &memories, &graph, &conflicts, &root, 3);

        let mut p = proposal("mem_2026_07_27_002", "global/existing.md", "# Existing\n\nchanged");
        p.proposal_type = ProposalType::Update;
        p.pre_image_hash = Some("wrong-hash".into());
        queue.enqueue(&p).unwrap();

        let settings = agentos_config::ExtractorSettings::default();
        let result = committer
            .commit_one(&p, &FixedEmbedder, &settings, || "scan1".into(), || "conf1".into())
            .await;
        assert!(matches!(result, Err(CommitError::StalePrecondition)));
        let updated = queue.get(&p.id).unwrap().unwrap();
        assert_eq!(updated.status, ProposalStatus::Failed);
        assert_eq!(updated.commit_error.as_deref(), Some("stale_precondition"));
    }
}
