//! UsageTracker: logs retrieval queries and per-memory accesses, and
//! produces a [`MemoryHealthReport`]. The detector's `stale` classification
//! is conditional on this tracker being active — a memory is only ever
//! reported stale here when at least one access has
//! been recorded for it, never merely because `last_used_at` is `NULL`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::memory_store::MemoryStore;

#[derive(Debug, Clone)]
pub struct QueryLogEntry {
    pub id: String,
    pub query_text: String,
    pub result_count: u32,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUsageRecord {
    pub memory_id: String,
    pub access_count: u64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryHealthReport {
    pub never_used: Vec<String>,
    pub stale: Vec<String>,
    pub most_used: Vec<(String, u64)>,
}

pub struct UsageTracker {
    db_path: PathBuf,
}

impl UsageTracker {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS query_log (
                id TEXT PRIMARY KEY,
                query_text TEXT NOT NULL,
                result_count INTEGER NOT NULL,
                at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS memory_usage (
                memory_id TEXT PRIMARY KEY,
                access_count INTEGER NOT NULL,
                last_accessed_at TEXT
            );
            "#,
        )?;
        Ok(UsageTracker { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn log_query(&self, query_text: &str, result_count: u32) -> Result<String, StoreError> {
        let id = format!("query_{}", uuid::Uuid::new_v4());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO query_log (id, query_text, result_count, at) VALUES (?1, ?2, ?3, ?4)",
            params![id, query_text, result_count, Utc::now().to_rfc3339()],
        )?;
        Ok(id)
    }

    pub fn get_query_log(&self, limit: u32) -> Result<Vec<QueryLogEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, query_text, result_count, at FROM query_log ORDER BY at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], |row| {
            let at: String = row.get(3)?;
            Ok(QueryLogEntry {
                id: row.get(0)?,
                query_text: row.get(1)?,
                result_count: row.get(2)?,
                at: parse_rfc3339(&at),
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Records one access both in `memory_usage` (this tracker's own audit
    /// trail) and, via `memories.touch_usage`, in the memory's own
    /// `usage_count`/`last_used_at` columns.
    pub fn record_access(&self, memories: &MemoryStore, memory_id: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        memories.touch_usage(memory_id, now)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO memory_usage (memory_id, access_count, last_accessed_at) VALUES (?1, 1, ?2)
             ON CONFLICT(memory_id) DO UPDATE SET
                access_count = access_count + 1,
                last_accessed_at = excluded.last_accessed_at",
            params![memory_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_usage(&self, memory_id: &str) -> Result<Option<MemoryUsageRecord>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT memory_id, access_count, last_accessed_at FROM memory_usage WHERE memory_id = ?1",
            params![memory_id],
            |row| {
                let last_accessed_at: Option<String> = row.get(2)?;
                Ok(MemoryUsageRecord {
                    memory_id: row.get(0)?,
                    access_count: row.get::<_, i64>(1)? as u64,
                    last_accessed_at: last_accessed_at.map(|s| parse_rfc3339(&s)),
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Builds a health report over every memory in `memories`: ones with no
    /// `memory_usage` row at all (`never_used`), ones whose last access is
    /// older than `stale_after` (`stale` — only populated because an access
    /// row exists, per this tracker's activity precondition), and the top
    /// ten by access count (`most_used`).
    pub fn health_report(&self, memories: &MemoryStore, stale_after: Duration) -> Result<MemoryHealthReport, StoreError> {
        let all = memories.list_all()?;
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT memory_id, access_count, last_accessed_at FROM memory_usage")?;
        let rows = stmt.query_map([], |row| {
            let last_accessed_at: Option<String> = row.get(2)?;
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64, last_accessed_at.map(|s| parse_rfc3339(&s))))
        })?;
        let mut usage: std::collections::HashMap<String, (u64, Option<DateTime<Utc>>)> = std::collections::HashMap::new();
        for row in rows {
            let (id, count, last) = row?;
            usage.insert(id, (count, last));
        }
        drop(stmt);

        let now = Utc::now();
        let mut report = MemoryHealthReport::default();
        let mut used: Vec<(String, u64)> = Vec::new();

        for memory in &all {
            match usage.get(&memory.id) {
                None => report.never_used.push(memory.id.clone()),
                Some((count, last)) => {
                    used.push((memory.id.clone(), *count));
                    if let Some(last) = last {
                        if now - *last > stale_after {
                            report.stale.push(memory.id.clone());
                        }
                    }
                }
            }
        }

        used.sort_by(|a, b| b.1.cmp(&a.1));
        report.most_used = used.into_iter().take(10).collect();
        Ok(report)
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{Confidence, Memory, MemoryStatus, Scope};

    fn memory(id: &str) -> Memory {
        Memory {
            id: id.into(),
            path: format!("global/{id}.md"),
            directory: "global".into(),
            title: id.into(),
            body: "body".into(),
            scope: Scope::Global,
            priority: 0.5,
            confidence: Confidence::Active,
            status: MemoryStatus::Active,
            tags: vec![],
            token_count: 10,
            created_at: Utc::now(),
            last_used_at: None,
            usage_count: 0,
            content_hash: "abc".into(),
            composite_embedding: None,
            directory_embedding: None,
            supersedes: vec![],
            related: vec![],
            expires_at: None,
        }
    }

    #[test]
    fn never_accessed_memory_is_never_used() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let tracker = UsageTracker::open(dir.path().join("u.sqlite")).unwrap();
        memories.put(&memory("mem1")).unwrap();

        let report = tracker.health_report(&memories, Duration::days(30)).unwrap();
        assert_eq!(report.never_used, vec!["mem1".to_string()]);
        assert!(report.stale.is_empty());
    }

    #[test]
    fn accessed_memory_appears_in_most_used_not_never_used() {
        let dir = tempfile::tempdir().unwrap();
        let memories = MemoryStore::open(dir.path().join("m.sqlite")).unwrap();
        let tracker = UsageTracker::open(dir.path().join("u.sqlite")).unwrap();
        memories.put(&memory("mem1")).unwrap();

        tracker.record_access(&memories, "mem1").unwrap();
        tracker.record_access(&memories, "mem1").unwrap();

        let report = tracker.health_report(&memories, Duration::days(30)).unwrap();
        assert!(report.never_used.is_empty());
        assert_eq!(report.most_used[0], ("mem1".to_string(), 2));

        let usage = tracker.get_usage("mem1").unwrap().unwrap();
        assert_eq!(usage.access_count, 2);

        let stored = memories.get("mem1").unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
    }

    #[test]
    fn query_log_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = UsageTracker::open(dir.path().join("u.sqlite")).unwrap();
        tracker.log_query("rust error handling", 5).unwrap();
        let log = tracker.get_query_log(10).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].result_count, 5);
    }
}
