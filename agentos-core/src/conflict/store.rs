//! Durable conflict tables: `conflicts`, `conflict_scans`, `resolution_log`

use std::path::Path;

use agentos_types::{
    Conflict, ConflictScan, ConflictStatus, ConflictType, DetectionMethod, MemoryRole,
    ResolutionAction, ResolutionLogEntry,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

pub struct ConflictStore {
    db_path: std::path::PathBuf,
}

impl ConflictStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                pair_hash TEXT NOT NULL,
                classification TEXT NOT NULL,
                detection_method TEXT NOT NULL,
                confidence REAL NOT NULL,
                description TEXT NOT NULL,
                evidence TEXT NOT NULL,
                status TEXT NOT NULL,
                m1_id TEXT NOT NULL,
                m2_id TEXT NOT NULL,
                m1_role TEXT NOT NULL,
                m2_role TEXT NOT NULL,
                resolution_action TEXT,
                resolved_by TEXT,
                resolved_at TEXT,
                suppressed_until TEXT,
                scan_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conflicts_pair_hash ON conflicts(pair_hash);
            CREATE TABLE IF NOT EXISTS conflict_scans (
                scan_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                methods TEXT NOT NULL,
                candidates_found INTEGER NOT NULL,
                new_conflicts INTEGER NOT NULL,
                existing_conflicts INTEGER NOT NULL,
                is_incremental INTEGER NOT NULL,
                target_memory_id TEXT
            );
            CREATE TABLE IF NOT EXISTS resolution_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conflict_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                memories_modified TEXT NOT NULL,
                memories_deprecated TEXT NOT NULL,
                memories_created TEXT NOT NULL,
                at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(ConflictStore { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn upsert(&self, conflict: &Conflict) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO conflicts (
                id, pair_hash, classification, detection_method, confidence, description,
                evidence, status, m1_id, m2_id, m1_role, m2_role, resolution_action,
                resolved_by, resolved_at, suppressed_until, scan_id, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
            ON CONFLICT(id) DO UPDATE SET
                classification = excluded.classification, confidence = excluded.confidence,
                description = excluded.description, evidence = excluded.evidence,
                status = excluded.status, resolution_action = excluded.resolution_action,
                resolved_by = excluded.resolved_by, resolved_at = excluded.resolved_at,
                suppressed_until = excluded.suppressed_until
            "#,
            params![
                conflict.id,
                conflict.pair_hash(),
                classification_str(conflict.classification),
                method_str(conflict.detection_method),
                conflict.confidence,
                conflict.description,
                serde_json::to_string(&conflict.evidence)?,
                status_str(conflict.status),
                conflict.m1_id,
                conflict.m2_id,
                role_str(conflict.m1_role),
                role_str(conflict.m2_role),
                conflict.resolution_action.map(action_str),
                conflict.resolved_by,
                conflict.resolved_at.map(|t| t.to_rfc3339()),
                conflict.suppressed_until.map(|t| t.to_rfc3339()),
                conflict.scan_id,
                conflict.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Conflict>, StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM conflicts WHERE id = ?1", params![id], row_to_conflict)
            .optional()
            .map_err(StoreError::from)
    }

    /// The conflict table's unique-pair lookup:
    /// a non-dismissed conflict already tracking this pair, if any.
    pub fn find_active_by_pair(&self, pair_hash: &str) -> Result<Option<Conflict>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM conflicts WHERE pair_hash = ?1 AND status != 'dismissed' ORDER BY created_at DESC LIMIT 1",
            params![pair_hash],
            row_to_conflict,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn list_unresolved(&self) -> Result<Vec<Conflict>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM conflicts WHERE status = 'unresolved' ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_conflict)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Conflicts whose deferral has elapsed: `suppressed_until <= now`
    pub fn due_for_unsuppression(&self, now: DateTime<Utc>) -> Result<Vec<Conflict>, StoreError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|c| c.suppressed_until.map_or(false, |t| t <= now))
            .collect())
    }

    pub fn list_all(&self) -> Result<Vec<Conflict>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM conflicts ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_conflict)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn record_scan(&self, scan: &ConflictScan) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO conflict_scans (
                scan_id, started_at, ended_at, methods, candidates_found, new_conflicts,
                existing_conflicts, is_incremental, target_memory_id
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
            ON CONFLICT(scan_id) DO UPDATE SET
                ended_at = excluded.ended_at, candidates_found = excluded.candidates_found,
                new_conflicts = excluded.new_conflicts, existing_conflicts = excluded.existing_conflicts
            "#,
            params![
                scan.scan_id,
                scan.started_at.to_rfc3339(),
                scan.ended_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&scan.methods)?,
                scan.candidates_found as i64,
                scan.new_conflicts as i64,
                scan.existing_conflicts as i64,
                scan.is_incremental as i64,
                scan.target_memory_id,
            ],
        )?;
        Ok(())
    }

    /// Full resolution history for one conflict, oldest first.
    pub fn get_resolution_log(&self, conflict_id: &str) -> Result<Vec<ResolutionLogEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT conflict_id, actor, action, memories_modified, memories_deprecated, memories_created, at
             FROM resolution_log WHERE conflict_id = ?1 ORDER BY at ASC",
        )?;
        let rows = stmt.query_map(params![conflict_id], row_to_resolution_log_entry)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    pub fn append_resolution_log(&self, entry: &ResolutionLogEntry) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO resolution_log (
                conflict_id, actor, action, memories_modified, memories_deprecated,
                memories_created, at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7)
            "#,
            params![
                entry.conflict_id,
                entry.actor,
                action_str(entry.action),
                serde_json::to_string(&entry.memories_modified)?,
                serde_json::to_string(&entry.memories_deprecated)?,
                serde_json::to_string(&entry.memories_created)?,
                entry.at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn classification_str(c: ConflictType) -> &'static str {
    match c {
        ConflictType::Contradictory => "contradictory",
        ConflictType::Duplicate => "duplicate",
        ConflictType::Supersession => "supersession",
        ConflictType::ScopeOverlap => "scope_overlap",
        ConflictType::Stale => "stale",
    }
}

fn classification_from_str(s: &str) -> ConflictType {
    match s {
        "duplicate" => ConflictType::Duplicate,
        "supersession" => ConflictType::Supersession,
        "scope_overlap" => ConflictType::ScopeOverlap,
        "stale" => ConflictType::Stale,
        _ => ConflictType::Contradictory,
    }
}

fn method_str(m: DetectionMethod) -> &'static str {
    match m {
        DetectionMethod::TagOverlap => "tag_overlap",
        DetectionMethod::Semantic => "semantic",
        DetectionMethod::Supersession => "supersession",
        DetectionMethod::RuleExtraction => "rule_extraction",
        DetectionMethod::Manual => "manual",
    }
}

fn method_from_str(s: &str) -> DetectionMethod {
    match s {
        "semantic" => DetectionMethod::Semantic,
        "supersession" => DetectionMethod::Supersession,
        "rule_extraction" => DetectionMethod::RuleExtraction,
        "manual" => DetectionMethod::Manual,
        _ => DetectionMethod::TagOverlap,
    }
}

fn status_str(s: ConflictStatus) -> &'static str {
    match s {
        ConflictStatus::Unresolved => "unresolved",
        ConflictStatus::InProgress => "in_progress",
        ConflictStatus::Resolved => "resolved",
        ConflictStatus::Dismissed => "dismissed",
    }
}

fn status_from_str(s: &str) -> ConflictStatus {
    match s {
        "in_progress" => ConflictStatus::InProgress,
        "resolved" => ConflictStatus::Resolved,
        "dismissed" => ConflictStatus::Dismissed,
        _ => ConflictStatus::Unresolved,
    }
}

fn role_str(r: MemoryRole) -> &'static str {
    match r {
        MemoryRole::Primary => "primary",
        MemoryRole::Secondary => "secondary",
    }
}

fn role_from_str(s: &str) -> MemoryRole {
    if s == "secondary" {
        MemoryRole::Secondary
    } else {
        MemoryRole::Primary
    }
}

fn action_str(a: ResolutionAction) -> &'static str {
    match a {
        ResolutionAction::Deprecate => "deprecate",
        ResolutionAction::Merge => "merge",
        ResolutionAction::Clarify => "clarify",
        ResolutionAction::Dismiss => "dismiss",
        ResolutionAction::Defer => "defer",
    }
}

fn action_from_str(s: &str) -> ResolutionAction {
    match s {
        "merge" => ResolutionAction::Merge,
        "clarify" => ResolutionAction::Clarify,
        "dismiss" => ResolutionAction::Dismiss,
        "defer" => ResolutionAction::Defer,
        _ => ResolutionAction::Deprecate,
    }
}

fn row_to_conflict(row: &rusqlite::Row) -> rusqlite::Result<Conflict> {
    let evidence_json: String = row.get("evidence")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;
    let suppressed_until: Option<String> = row.get("suppressed_until")?;
    let created_at: String = row.get("created_at")?;
    let resolution_action: Option<String> = row.get("resolution_action")?;

    Ok(Conflict {
        id: row.get("id")?,
        classification: classification_from_str(&row.get::<_, String>("classification")?),
        detection_method: method_from_str(&row.get::<_, String>("detection_method")?),
        confidence: row.get("confidence")?,
        description: row.get("description")?,
        evidence: serde_json::from_str(&evidence_json).unwrap_or_default(),
        status: status_from_str(&row.get::<_, String>("status")?),
        m1_id: row.get("m1_id")?,
        m2_id: row.get("m2_id")?,
        m1_role: role_from_str(&row.get::<_, String>("m1_role")?),
        m2_role: role_from_str(&row.get::<_, String>("m2_role")?),
        resolution_action: resolution_action.map(|s| action_from_str(&s)),
        resolved_by: row.get("resolved_by")?,
        resolved_at: resolved_at.and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))),
        suppressed_until: suppressed_until
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok().map(|t| t.with_timezone(&Utc))),
        scan_id: row.get("scan_id")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_resolution_log_entry(row: &rusqlite::Row) -> rusqlite::Result<ResolutionLogEntry> {
    let action: String = row.get("action")?;
    let at: String = row.get("at")?;
    Ok(ResolutionLogEntry {
        conflict_id: row.get("conflict_id")?,
        actor: row.get("actor")?,
        action: action_from_str(&action),
        memories_modified: serde_json::from_str(&row.get::<_, String>("memories_modified")?).unwrap_or_default(),
        memories_deprecated: serde_json::from_str(&row.get::<_, String>("memories_deprecated")?).unwrap_or_default(),
        memories_created: serde_json::from_str(&row.get::<_, String>("memories_created")?).unwrap_or_default(),
        at: DateTime::parse_from_rfc3339(&at).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, status: ConflictStatus) -> Conflict {
        Conflict {
            id: id.to_string(),
            classification: ConflictType::Duplicate,
            detection_method: DetectionMethod::Semantic,
            confidence: 0.9,
            description: "duplicate claim".into(),
            evidence: vec!["cosine 0.95".into()],
            status,
            m1_id: "m1".into(),
            m2_id: "m2".into(),
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
    fn upsert_then_find_by_pair_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let c = sample("conf1", ConflictStatus::Unresolved);
        store.upsert(&c).unwrap();
        let found = store.find_active_by_pair(&c.pair_hash()).unwrap().unwrap();
        assert_eq!(found.id, "conf1");
    }

    #[test]
    fn dismissed_conflicts_excluded_from_active_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let c = sample("conf1", ConflictStatus::Dismissed);
        store.upsert(&c).unwrap();
        assert!(store.find_active_by_pair(&c.pair_hash()).unwrap().is_none());
    }

    #[test]
    fn resolution_log_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConflictStore::open(dir.path().join("c.sqlite")).unwrap();
        let entry = |action| ResolutionLogEntry {
            conflict_id: "conf1".into(),
            actor: "reviewer-a".into(),
            action,
            memories_modified: vec![],
            memories_deprecated: vec!["m2".into()],
            memories_created: vec![],
            at: Utc::now(),
        };
        store.append_resolution_log(&entry(ResolutionAction::Defer)).unwrap();
        store.append_resolution_log(&entry(ResolutionAction::Deprecate)).unwrap();
        let log = store.get_resolution_log("conf1").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].action, ResolutionAction::Deprecate);
    }
}
