//! ReviewQueue: persistent SQL store of [`WriteProposal`]s.
//! Every state change appends to an immutable `review_log`.

use std::path::{Path, PathBuf};

use agentos_types::{ProposalStatus, ProposalType, ReviewLogEntry, WriteProposal};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub pending: u64,
    pub in_review: u64,
    pub approved: u64,
    pub committed: u64,
    pub rejected: u64,
    pub modified: u64,
    pub deferred: u64,
    pub failed: u64,
}

pub struct ReviewQueue {
    db_path: PathBuf,
}

fn proposal_type_str(t: ProposalType) -> &'static str {
    match t {
        ProposalType::Create => "create",
        ProposalType::Update => "update",
        ProposalType::Deprecate => "deprecate",
        ProposalType::Promote => "promote",
    }
}

fn proposal_type_from_str(s: &str) -> ProposalType {
    match s {
        "update" => ProposalType::Update,
        "deprecate" => ProposalType::Deprecate,
        "promote" => ProposalType::Promote,
        _ => ProposalType::Create,
    }
}

fn status_str(s: ProposalStatus) -> &'static str {
    match s {
        ProposalStatus::Pending => "pending",
        ProposalStatus::InReview => "in_review",
        ProposalStatus::Approved => "approved",
        ProposalStatus::Committed => "committed",
        ProposalStatus::Rejected => "rejected",
        ProposalStatus::Modified => "modified",
        ProposalStatus::Deferred => "deferred",
        ProposalStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> ProposalStatus {
    match s {
        "in_review" => ProposalStatus::InReview,
        "approved" => ProposalStatus::Approved,
        "committed" => ProposalStatus::Committed,
        "rejected" => ProposalStatus::Rejected,
        "modified" => ProposalStatus::Modified,
        "deferred" => ProposalStatus::Deferred,
        "failed" => ProposalStatus::Failed,
        _ => ProposalStatus::Pending,
    }
}

impl ReviewQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS write_proposals (
                id TEXT PRIMARY KEY,
                proposal_type TEXT NOT NULL,
                target_path TEXT NOT NULL,
                reason TEXT NOT NULL,
                content TEXT NOT NULL,
                proposed_by TEXT NOT NULL,
                retry_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                commit_error TEXT,
                pre_image_hash TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                tags TEXT NOT NULL,
                scope TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_write_proposals_path ON write_proposals(target_path);
            CREATE TABLE IF NOT EXISTS review_log (
                proposal_id TEXT NOT NULL,
                from_status TEXT,
                to_status TEXT NOT NULL,
                notes TEXT,
                at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_review_log_proposal ON review_log(proposal_id);
            "#,
        )?;
        Ok(ReviewQueue { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Rejects with `StoreError::NotFound` surfaced as a conflict by the
    /// caller when `has_pending_for_path` already holds.
    pub fn enqueue(&self, proposal: &WriteProposal) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO write_proposals
                (id, proposal_type, target_path, reason, content, proposed_by, retry_count,
                 status, commit_error, pre_image_hash, created_at, updated_at, tags, scope)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                proposal.id,
                proposal_type_str(proposal.proposal_type),
                proposal.target_path,
                proposal.reason,
                proposal.content,
                proposal.proposed_by,
                proposal.retry_count,
                status_str(proposal.status),
                proposal.commit_error,
                proposal.pre_image_hash,
                proposal.created_at.to_rfc3339(),
                proposal.updated_at.to_rfc3339(),
                serde_json::to_string(&proposal.tags)?,
                proposal.scope,
            ],
        )?;
        self.append_log(&proposal.id, None, proposal.status, None)?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<WriteProposal>, StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM write_proposals WHERE id = ?1", params![id], row_to_proposal)
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Vec<WriteProposal>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM write_proposals WHERE target_path = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![path], row_to_proposal)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn has_pending_for_path(&self, path: &str) -> Result<Option<WriteProposal>, StoreError> {
        Ok(self
            .get_by_path(path)?
            .into_iter()
            .find(|p| p.status.blocks_new_proposal()))
    }

    pub fn get_pending(&self, limit: u32) -> Result<Vec<WriteProposal>, StoreError> {
        self.get_by_status(ProposalStatus::Pending, limit)
    }

    pub fn get_by_status(&self, status: ProposalStatus, limit: u32) -> Result<Vec<WriteProposal>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM write_proposals WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![status_str(status), limit], row_to_proposal)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn update_status(
        &self,
        id: &str,
        new_status: ProposalStatus,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let from_status: Option<String> = conn
            .query_row("SELECT status FROM write_proposals WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        let Some(from_status) = from_status else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        conn.execute(
            "UPDATE write_proposals SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status_str(new_status), Utc::now().to_rfc3339(), id],
        )?;
        self.append_log(id, Some(status_from_str(&from_status)), new_status, notes)?;
        Ok(())
    }

    /// Full-replace escape hatch restricted to the Reviewer's `modify` action:
    /// never move a terminal status backward.
    pub fn update_proposal(&self, proposal: &WriteProposal) -> Result<(), StoreError> {
        let existing = self
            .get(&proposal.id)?
            .ok_or_else(|| StoreError::NotFound(proposal.id.clone()))?;
        if existing.status.is_terminal() && !proposal.status.is_terminal() {
            return Err(StoreError::NotFound(format!(
                "refusing to move terminal proposal {} backward",
                proposal.id
            )));
        }
        let conn = self.conn()?;
        conn.execute(
            "UPDATE write_proposals SET proposal_type = ?1, target_path = ?2, reason = ?3,
                content = ?4, proposed_by = ?5, retry_count = ?6, status = ?7, commit_error = ?8,
                pre_image_hash = ?9, updated_at = ?10, tags = ?11, scope = ?12
             WHERE id = ?13",
            params![
                proposal_type_str(proposal.proposal_type),
                proposal.target_path,
                proposal.reason,
                proposal.content,
                proposal.proposed_by,
                proposal.retry_count,
                status_str(proposal.status),
                proposal.commit_error,
                proposal.pre_image_hash,
                Utc::now().to_rfc3339(),
                serde_json::to_string(&proposal.tags)?,
                proposal.scope,
                proposal.id,
            ],
        )?;
        if existing.status != proposal.status {
            self.append_log(&proposal.id, Some(existing.status), proposal.status, Some("update_proposal"))?;
        }
        Ok(())
    }

    pub fn increment_retry(&self, id: &str) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE write_proposals SET retry_count = retry_count + 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        conn.query_row("SELECT retry_count FROM write_proposals WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .map_err(StoreError::from)
    }

    pub fn set_commit_error(&self, id: &str, msg: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE write_proposals SET commit_error = ?1, updated_at = ?2 WHERE id = ?3",
            params![msg, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM write_proposals WHERE id = ?1", params![id])?;
        conn.execute("DELETE FROM review_log WHERE proposal_id = ?1", params![id])?;
        Ok(())
    }

    pub fn get_history(&self, id: &str) -> Result<Vec<ReviewLogEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT proposal_id, from_status, to_status, notes, at
             FROM review_log WHERE proposal_id = ?1 ORDER BY at ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let from_status: Option<String> = row.get(1)?;
            let to_status: String = row.get(2)?;
            let at: String = row.get(4)?;
            Ok(ReviewLogEntry {
                proposal_id: row.get(0)?,
                from_status: from_status.map(|s| status_from_str(&s)),
                to_status: status_from_str(&to_status),
                notes: row.get(3)?,
                at: DateTime::parse_from_rfc3339(&at).unwrap().with_timezone(&Utc),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn get_stats(&self) -> Result<QueueStats, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM write_proposals GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: u64 = row.get(1)?;
            Ok((status, count))
        })?;
        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            match status_from_str(&status) {
                ProposalStatus::Pending => stats.pending = count,
                ProposalStatus::InReview => stats.in_review = count,
                ProposalStatus::Approved => stats.approved = count,
                ProposalStatus::Committed => stats.committed = count,
                ProposalStatus::Rejected => stats.rejected = count,
                ProposalStatus::Modified => stats.modified = count,
                ProposalStatus::Deferred => stats.deferred = count,
                ProposalStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    fn append_log(
        &self,
        proposal_id: &str,
        from_status: Option<ProposalStatus>,
        to_status: ProposalStatus,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO review_log (proposal_id, from_status, to_status, notes, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                proposal_id,
                from_status.map(status_str),
                status_str(to_status),
                notes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn row_to_proposal(row: &rusqlite::Row) -> rusqlite::Result<WriteProposal> {
    let proposal_type: String = row.get("proposal_type")?;
    let status: String = row.get("status")?;
    let tags: String = row.get("tags")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(WriteProposal {
        id: row.get("id")?,
        proposal_type: proposal_type_from_str(&proposal_type),
        target_path: row.get("target_path")?,
        reason: row.get("reason")?,
        content: row.get("content")?,
        proposed_by: row.get("proposed_by")?,
        retry_count: row.get("retry_count")?,
        status: status_from_str(&status),
        commit_error: row.get("commit_error")?,
        pre_image_hash: row.get("pre_image_hash")?,
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at).unwrap().with_timezone(&Utc),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        scope: row.get("scope")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(id: &str, path: &str, status: ProposalStatus) -> WriteProposal {
        WriteProposal {
            id: id.to_string(),
            proposal_type: ProposalType::Create,
            target_path: path.to_string(),
            reason: "testing".into(),
            content: "# Title\n\nbody".into(),
            proposed_by: "agent-a".into(),
            retry_count: 0,
            status,
            commit_error: None,
            pre_image_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            tags: vec!["rust".into()],
            scope: Some("global".into()),
        }
    }

    #[test]
    fn enqueue_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::open(dir.path().join("q.sqlite")).unwrap();
        queue.enqueue(&proposal("p1", "global/a.md", ProposalStatus::Pending)).unwrap();
        let got = queue.get("p1").unwrap().unwrap();
        assert_eq!(got.target_path, "global/a.md");
        assert_eq!(queue.get_history("p1").unwrap().len(), 1);
    }

    #[test]
    fn has_pending_for_path_ignores_terminal_proposals() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::open(dir.path().join("q.sqlite")).unwrap();
        queue.enqueue(&proposal("p1", "global/a.md", ProposalStatus::Committed)).unwrap();
        assert!(queue.has_pending_for_path("global/a.md").unwrap().is_none());
        queue.enqueue(&proposal("p2", "global/a.md", ProposalStatus::Pending)).unwrap();
        assert_eq!(queue.has_pending_for_path("global/a.md").unwrap().unwrap().id, "p2");
    }

    #[test]
    fn update_proposal_refuses_to_resurrect_terminal_status() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::open(dir.path().join("q.sqlite")).unwrap();
        queue.enqueue(&proposal("p1", "global/a.md", ProposalStatus::Rejected)).unwrap();
        let mut resurrected = proposal("p1", "global/a.md", ProposalStatus::Pending);
        resurrected.id = "p1".into();
        assert!(queue.update_proposal(&resurrected).is_err());
    }
}
