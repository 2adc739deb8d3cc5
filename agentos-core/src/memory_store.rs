//! `MemoryStore`: the persistence engine for [`Memory`] rows.
//!
//! Open-per-call connections via `spawn_blocking`, embeddings stored as a
//! JSON-encoded float vector. Specialized to the `Memory` schema rather
//! than a generic namespace store, and computes cosine similarity in Rust
//! rather than delegating to a `vec0` KNN query — there is deliberately no
//! ANN index at this stage.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use agentos_types::{Confidence, Embedding, Memory, MemoryStatus, Scope};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

fn embedding_to_json(v: &Embedding) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".into())
}

fn embedding_from_json(s: &str) -> Option<Embedding> {
    serde_json::from_str(s).ok()
}

/// Cosine similarity in `[-1, 1]`; `0.0` if either vector is zero-length or
/// dimension mismatched (callers filter those out before ranking).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)) as f64
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub allowed_scopes: Option<Vec<Scope>>,
    pub min_priority: Option<f64>,
    pub max_token_count: Option<u32>,
    pub exclude_deprecated: bool,
    pub exclude_ephemeral: bool,
}

pub struct MemoryStore {
    db_path: PathBuf,
}

impl MemoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                directory TEXT NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                scope TEXT NOT NULL,
                priority REAL NOT NULL,
                confidence TEXT NOT NULL,
                status TEXT NOT NULL,
                tags TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_used_at TEXT,
                usage_count INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                composite_embedding TEXT,
                directory_embedding TEXT,
                supersedes TEXT NOT NULL,
                related TEXT NOT NULL,
                expires_at TEXT
            );
            CREATE TABLE IF NOT EXISTS system_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);
            "#,
        )?;
        Ok(MemoryStore { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn put(&self, memory: &Memory) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO memories (
                id, path, directory, title, body, scope, priority, confidence, status, tags,
                token_count, created_at, last_used_at, usage_count, content_hash,
                composite_embedding, directory_embedding, supersedes, related, expires_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path, directory = excluded.directory, title = excluded.title,
                body = excluded.body, scope = excluded.scope, priority = excluded.priority,
                confidence = excluded.confidence, status = excluded.status, tags = excluded.tags,
                token_count = excluded.token_count, last_used_at = excluded.last_used_at,
                usage_count = excluded.usage_count, content_hash = excluded.content_hash,
                composite_embedding = excluded.composite_embedding,
                directory_embedding = excluded.directory_embedding,
                supersedes = excluded.supersedes, related = excluded.related,
                expires_at = excluded.expires_at
            "#,
            params![
                memory.id,
                memory.path,
                memory.directory,
                memory.title,
                memory.body,
                memory.scope.as_str(),
                memory.priority,
                confidence_str(memory.confidence),
                status_str(memory.status),
                serde_json::to_string(&memory.tags)?,
                memory.token_count,
                memory.created_at.to_rfc3339(),
                memory.last_used_at.map(|t| t.to_rfc3339()),
                memory.usage_count as i64,
                memory.content_hash,
                memory.composite_embedding.as_ref().map(embedding_to_json),
                memory.directory_embedding.as_ref().map(embedding_to_json),
                serde_json::to_string(&memory.supersedes)?,
                serde_json::to_string(&memory.related)?,
                memory.expires_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Memory>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_memory)
            .optional()?;
        Ok(row)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<Memory>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row("SELECT * FROM memories WHERE path = ?1", params![path], row_to_memory)
            .optional()?;
        Ok(row)
    }

    pub fn list_all(&self) -> Result<Vec<Memory>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM memories ORDER BY path")?;
        let rows = stmt.query_map([], row_to_memory)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn list_baseline(&self) -> Result<Vec<Memory>, StoreError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(Memory::is_baseline)
            .collect())
    }

    /// Candidates for vector search: non-baseline, non-deprecated by default
    ///, further narrowed by `filter`.
    pub fn search_candidates(&self, filter: &MemoryFilter) -> Result<Vec<Memory>, StoreError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|m| m.scope != Scope::Baseline)
            .filter(|m| !(filter.exclude_deprecated && m.status == MemoryStatus::Deprecated))
            .filter(|m| !(filter.exclude_ephemeral && m.scope == Scope::Ephemeral))
            .filter(|m| {
                filter
                    .allowed_scopes
                    .as_ref()
                    .map_or(true, |scopes| scopes.contains(&m.scope))
            })
            .filter(|m| filter.min_priority.map_or(true, |min| m.priority >= min))
            .filter(|m| filter.max_token_count.map_or(true, |max| m.token_count <= max))
            .collect())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    pub fn count_for_date(&self, date: DateTime<Utc>) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        let prefix = format!("mem_{}_%", date.format("%Y_%m_%d"));
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE id LIKE ?1",
            params![prefix],
            |r| r.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn touch_usage(&self, id: &str, used_at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE memories SET usage_count = usage_count + 1, last_used_at = ?2 WHERE id = ?1",
            params![id, used_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn embedding_model(&self) -> Result<Option<String>, StoreError> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM system_meta WHERE key = 'embedding_model'",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_embedding_model(&self, model: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO system_meta (key, value) VALUES ('embedding_model', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![model],
        )?;
        Ok(())
    }
}

fn confidence_str(c: Confidence) -> &'static str {
    match c {
        Confidence::Experimental => "experimental",
        Confidence::Active => "active",
        Confidence::Stable => "stable",
        Confidence::Deprecated => "deprecated",
    }
}

fn status_str(s: MemoryStatus) -> &'static str {
    match s {
        MemoryStatus::Active => "active",
        MemoryStatus::Deprecated => "deprecated",
    }
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let scope_str: String = row.get("scope")?;
    let confidence_str: String = row.get("confidence")?;
    let status_str: String = row.get("status")?;
    let tags_json: String = row.get("tags")?;
    let supersedes_json: String = row.get("supersedes")?;
    let related_json: String = row.get("related")?;
    let composite_json: Option<String> = row.get("composite_embedding")?;
    let directory_json: Option<String> = row.get("directory_embedding")?;
    let created_at: String = row.get("created_at")?;
    let last_used_at: Option<String> = row.get("last_used_at")?;
    let expires_at: Option<String> = row.get("expires_at")?;

    Ok(Memory {
        id: row.get("id")?,
        path: row.get("path")?,
        directory: row.get("directory")?,
        title: row.get("title")?,
        body: row.get("body")?,
        scope: scope_str.parse().unwrap_or(Scope::Global),
        priority: row.get("priority")?,
        confidence: match confidence_str.as_str() {
            "experimental" => Confidence::Experimental,
            "stable" => Confidence::Stable,
            "deprecated" => Confidence::Deprecated,
            _ => Confidence::Active,
        },
        status: if status_str == "deprecated" {
            MemoryStatus::Deprecated
        } else {
            MemoryStatus::Active
        },
        tags: serde_json::from_str::<BTreeSet<String>>(&tags_json).unwrap_or_default(),
        token_count: row.get::<_, i64>("token_count")? as u32,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        last_used_at: last_used_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))
        }),
        usage_count: row.get::<_, i64>("usage_count")? as u64,
        content_hash: row.get("content_hash")?,
        composite_embedding: composite_json.and_then(|s| embedding_from_json(&s)),
        directory_embedding: directory_json.and_then(|s| embedding_from_json(&s)),
        supersedes: serde_json::from_str(&supersedes_json).unwrap_or_default(),
        related: serde_json::from_str(&related_json).unwrap_or_default(),
        expires_at: expires_at.and_then(|s| {
            DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sample(id: &str, scope: Scope) -> Memory {
        Memory {
            id: id.to_string(),
            path: format!("{id}.md"),
            directory: "global".into(),
            title: id.into(),
            body: "hello world".into(),
            scope,
            priority: 0.5,
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags: BTreeSet::new(),
            token_count: 3,
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: "abc".into(),
            composite_embedding: Some(vec![1.0, 0.0, 0.0]),
            directory_embedding: None,
            supersedes: vec![],
            related: vec![],
            expires_at: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let memory = sample("mem_2026_01_01_001", Scope::Global);
        store.put(&memory).unwrap();
        let loaded = store.get(&memory.id).unwrap().unwrap();
        assert_eq!(loaded.id, memory.id);
        assert_eq!(loaded.composite_embedding, memory.composite_embedding);
    }

    #[test]
    fn search_candidates_excludes_baseline_and_deprecated_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        store.put(&sample("b1", Scope::Baseline)).unwrap();
        let mut deprecated = sample("d1", Scope::Global);
        deprecated.status = MemoryStatus::Deprecated;
        store.put(&deprecated).unwrap();
        store.put(&sample("g1", Scope::Global)).unwrap();

        let filter = MemoryFilter { exclude_deprecated: true, ..Default::default() };
        let candidates = store.search_candidates(&filter).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "g1");
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn next_id_count_for_date_scopes_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        store.put(&sample("mem_2026_07_27_001", Scope::Global)).unwrap();
        store.put(&sample("mem_2026_07_27_002", Scope::Global)).unwrap();
        store.put(&sample("mem_2026_07_26_001", Scope::Global)).unwrap();
        let date = DateTime::parse_from_rfc3339("2026-07-27T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(store.count_for_date(date).unwrap(), 2);
    }
}
