//! AgentOsStore: durable record of agent state, inter-agent
//! messages, self-modification proposals, and sessions, backed by a single
//! SQLite database. All timestamps are stored as RFC3339 UTC.

use std::path::{Path, PathBuf};

use agentos_types::{
    selfmod::ModificationProposal, AgentRuntimeStatus, AgentState, DeliveryStatus, Message,
    MessagePriority, MessageType, Recipient, Session,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

pub struct AgentOsStore {
    db_path: PathBuf,
}

fn status_str(s: AgentRuntimeStatus) -> &'static str {
    match s {
        AgentRuntimeStatus::Idle => "idle",
        AgentRuntimeStatus::Busy => "busy",
        AgentRuntimeStatus::Waiting => "waiting",
        AgentRuntimeStatus::Terminated => "terminated",
        AgentRuntimeStatus::Error => "error",
    }
}

fn status_from_str(s: &str) -> AgentRuntimeStatus {
    match s {
        "busy" => AgentRuntimeStatus::Busy,
        "waiting" => AgentRuntimeStatus::Waiting,
        "terminated" => AgentRuntimeStatus::Terminated,
        "error" => AgentRuntimeStatus::Error,
        _ => AgentRuntimeStatus::Idle,
    }
}

fn message_type_str(t: MessageType) -> &'static str {
    match t {
        MessageType::Request => "request",
        MessageType::Inform => "inform",
        MessageType::Broadcast => "broadcast",
        MessageType::Response => "response",
    }
}

fn message_type_from_str(s: &str) -> MessageType {
    match s {
        "request" => MessageType::Request,
        "broadcast" => MessageType::Broadcast,
        "response" => MessageType::Response,
        _ => MessageType::Inform,
    }
}

fn priority_str(p: MessagePriority) -> &'static str {
    match p {
        MessagePriority::Low => "low",
        MessagePriority::Normal => "normal",
        MessagePriority::High => "high",
        MessagePriority::Critical => "critical",
    }
}

fn priority_from_str(s: &str) -> MessagePriority {
    match s {
        "low" => MessagePriority::Low,
        "high" => MessagePriority::High,
        "critical" => MessagePriority::Critical,
        _ => MessagePriority::Normal,
    }
}

fn delivery_status_str(s: DeliveryStatus) -> &'static str {
    match s {
        DeliveryStatus::Queued => "queued",
        DeliveryStatus::Delivered => "delivered",
        DeliveryStatus::Read => "read",
        DeliveryStatus::DeadLettered => "dead_lettered",
    }
}

fn delivery_status_from_str(s: &str) -> DeliveryStatus {
    match s {
        "delivered" => DeliveryStatus::Delivered,
        "read" => DeliveryStatus::Read,
        "dead_lettered" => DeliveryStatus::DeadLettered,
        _ => DeliveryStatus::Queued,
    }
}

/// Flattens [`Recipient`] to `(kind, value_json)` for storage.
fn recipient_to_columns(recipient: &Recipient) -> (&'static str, String) {
    match recipient {
        Recipient::Agent(id) => ("agent", serde_json::to_string(id).unwrap()),
        Recipient::List(ids) => ("list", serde_json::to_string(ids).unwrap()),
        Recipient::AllExceptSender => ("broadcast", "null".to_string()),
    }
}

fn recipient_from_columns(kind: &str, value_json: &str) -> Recipient {
    match kind {
        "list" => Recipient::List(serde_json::from_str(value_json).unwrap_or_default()),
        "broadcast" => Recipient::AllExceptSender,
        _ => Recipient::Agent(serde_json::from_str(value_json).unwrap_or_default()),
    }
}

/// Optional filters for [`AgentOsStore::get_messages`].
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub session_id: Option<String>,
    pub sender: Option<String>,
    pub receiver: Option<String>,
    pub correlation_id: Option<String>,
    pub limit: Option<u32>,
}

impl AgentOsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agent_states (
                agent_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                status TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                api_call_count INTEGER NOT NULL,
                context TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (agent_id, session_id)
            );
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT,
                sender TEXT NOT NULL,
                recipient_kind TEXT NOT NULL,
                recipient_value TEXT NOT NULL,
                receiver_hint TEXT,
                message_type TEXT NOT NULL,
                priority TEXT NOT NULL,
                payload TEXT NOT NULL,
                correlation_id TEXT,
                delivery_status TEXT NOT NULL,
                tags TEXT NOT NULL,
                queued_at TEXT NOT NULL,
                delivered_at TEXT,
                read_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages (session_id);
            CREATE INDEX IF NOT EXISTS idx_messages_correlation ON messages (correlation_id);
            CREATE TABLE IF NOT EXISTS modifications (
                id TEXT NOT NULL,
                proposal_json TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                PRIMARY KEY (id, recorded_at)
            );
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                total_tokens INTEGER NOT NULL,
                total_api_calls INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(AgentOsStore { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn save_agent_state(&self, state: &AgentState) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO agent_states (agent_id, session_id, status, token_count, api_call_count, context, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(agent_id, session_id) DO UPDATE SET
                status = excluded.status,
                token_count = excluded.token_count,
                api_call_count = excluded.api_call_count,
                context = excluded.context,
                updated_at = excluded.updated_at",
            params![
                state.agent_id,
                state.session_id,
                status_str(state.status),
                state.token_count as i64,
                state.api_call_count as i64,
                state.context.to_string(),
                state.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_agent_state(&self, agent_id: &str, session_id: &str) -> Result<Option<AgentState>, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT agent_id, session_id, status, token_count, api_call_count, context, updated_at
             FROM agent_states WHERE agent_id = ?1 AND session_id = ?2",
            params![agent_id, session_id],
            |row| {
                let context: String = row.get(5)?;
                let updated_at: String = row.get(6)?;
                Ok(AgentState {
                    agent_id: row.get(0)?,
                    session_id: row.get(1)?,
                    status: status_from_str(&row.get::<_, String>(2)?),
                    token_count: row.get::<_, i64>(3)? as u64,
                    api_call_count: row.get::<_, i64>(4)? as u64,
                    context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
                    updated_at: parse_rfc3339(&updated_at),
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let (recipient_kind, recipient_value) = recipient_to_columns(&message.recipient);
        let receiver_hint = match &message.recipient {
            Recipient::Agent(id) => Some(id.clone()),
            _ => None,
        };
        conn.execute(
            "INSERT INTO messages (id, session_id, sender, recipient_kind, recipient_value, receiver_hint,
                message_type, priority, payload, correlation_id, delivery_status, tags,
                queued_at, delivered_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(id) DO UPDATE SET
                delivery_status = excluded.delivery_status,
                delivered_at = excluded.delivered_at,
                read_at = excluded.read_at",
            params![
                message.id,
                None::<String>,
                message.sender,
                recipient_kind,
                recipient_value,
                receiver_hint,
                message_type_str(message.message_type),
                priority_str(message.priority),
                message.payload.to_string(),
                message.correlation_id,
                delivery_status_str(message.delivery_status),
                serde_json::to_string(&message.tags).unwrap_or_else(|_| "[]".into()),
                message.queued_at.to_rfc3339(),
                message.delivered_at.map(|t| t.to_rfc3339()),
                message.read_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    pub fn get_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn()?;
        let mut sql = String::from(
            "SELECT id, sender, recipient_kind, recipient_value, message_type, priority, payload,
                correlation_id, delivery_status, tags, queued_at, delivered_at, read_at
             FROM messages WHERE 1=1",
        );
        if filter.session_id.is_some() {
            sql.push_str(" AND session_id = :session_id");
        }
        if filter.sender.is_some() {
            sql.push_str(" AND sender = :sender");
        }
        if filter.receiver.is_some() {
            sql.push_str(" AND receiver_hint = :receiver");
        }
        if filter.correlation_id.is_some() {
            sql.push_str(" AND correlation_id = :correlation_id");
        }
        sql.push_str(" ORDER BY queued_at ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut named: Vec<(&str, &dyn rusqlite::ToSql)> = Vec::new();
        if let Some(v) = &filter.session_id {
            named.push((":session_id", v));
        }
        if let Some(v) = &filter.sender {
            named.push((":sender", v));
        }
        if let Some(v) = &filter.receiver {
            named.push((":receiver", v));
        }
        if let Some(v) = &filter.correlation_id {
            named.push((":correlation_id", v));
        }

        let rows = stmt.query_map(named.as_slice(), row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn mark_delivered(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE messages SET delivery_status = ?1, delivered_at = ?2 WHERE id = ?3",
            params![delivery_status_str(DeliveryStatus::Delivered), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    pub fn mark_read(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE messages SET delivery_status = ?1, read_at = ?2 WHERE id = ?3",
            params![delivery_status_str(DeliveryStatus::Read), Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("message {id}")));
        }
        Ok(())
    }

    /// Persists a proposal snapshot as an audit entry; calling this again
    /// for the same id appends a new audit row rather than overwriting.
    pub fn save_modification(&self, proposal: &ModificationProposal) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO modifications (id, proposal_json, status, created_at, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                proposal.id,
                serde_json::to_string(proposal).unwrap_or_default(),
                format!("{:?}", proposal.status),
                proposal.created_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recent audit row per distinct proposal id, for a `selfmod
    /// list` view across every proposal ever submitted.
    pub fn list_latest_modifications(&self) -> Result<Vec<ModificationProposal>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT proposal_json FROM modifications m
             WHERE recorded_at = (SELECT MAX(recorded_at) FROM modifications WHERE id = m.id)
             GROUP BY id
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;
        let mut out = Vec::new();
        for row in rows {
            let json = row?;
            if let Ok(p) = serde_json::from_str(&json) {
                out.push(p);
            }
        }
        Ok(out)
    }

    pub fn get_modification_history(&self, id: &str) -> Result<Vec<ModificationProposal>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT proposal_json FROM modifications WHERE id = ?1 ORDER BY recorded_at ASC",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let json: String = row.get(0)?;
            Ok(json)
        })?;
        let mut out = Vec::new();
        for row in rows {
            let json = row?;
            if let Ok(p) = serde_json::from_str(&json) {
                out.push(p);
            }
        }
        Ok(out)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (id, started_at, ended_at, total_tokens, total_api_calls)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                ended_at = excluded.ended_at,
                total_tokens = excluded.total_tokens,
                total_api_calls = excluded.total_api_calls",
            params![
                session.id,
                session.started_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.total_tokens as i64,
                session.total_api_calls as i64,
            ],
        )?;
        Ok(())
    }

    pub fn end_session(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sessions SET ended_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    pub fn update_session_stats(&self, id: &str, total_tokens: u64, total_api_calls: u64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sessions SET total_tokens = ?1, total_api_calls = ?2 WHERE id = ?3",
            params![total_tokens as i64, total_api_calls as i64, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    pub fn get_active_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, ended_at, total_tokens, total_api_calls FROM sessions WHERE ended_at IS NULL",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Deletes ended sessions (and their messages) older than `max_age_days`.
    pub fn cleanup_older_than(&self, max_age_days: i64) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let cutoff = (Utc::now() - chrono::Duration::days(max_age_days)).to_rfc3339();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE ended_at IS NOT NULL AND ended_at < ?1",
            params![cutoff],
        )?;
        conn.execute("DELETE FROM messages WHERE queued_at < ?1", params![cutoff])?;
        Ok(deleted as u64)
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let recipient_kind: String = row.get(2)?;
    let recipient_value: String = row.get(3)?;
    let tags_json: String = row.get(9)?;
    let queued_at: String = row.get(10)?;
    let delivered_at: Option<String> = row.get(11)?;
    let read_at: Option<String> = row.get(12)?;
    Ok(Message {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: recipient_from_columns(&recipient_kind, &recipient_value),
        message_type: message_type_from_str(&row.get::<_, String>(4)?),
        priority: priority_from_str(&row.get::<_, String>(5)?),
        payload: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or(serde_json::Value::Null),
        correlation_id: row.get(7)?,
        delivery_status: delivery_status_from_str(&row.get::<_, String>(8)?),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        queued_at: parse_rfc3339(&queued_at),
        delivered_at: delivered_at.map(|s| parse_rfc3339(&s)),
        read_at: read_at.map(|s| parse_rfc3339(&s)),
    })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    let started_at: String = row.get(1)?;
    let ended_at: Option<String> = row.get(2)?;
    Ok(Session {
        id: row.get(0)?,
        started_at: parse_rfc3339(&started_at),
        ended_at: ended_at.map(|s| parse_rfc3339(&s)),
        total_tokens: row.get::<_, i64>(3)? as u64,
        total_api_calls: row.get::<_, i64>(4)? as u64,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::selfmod::{ModProposalStatus, RiskLevel};

    fn agent_state(agent_id: &str, session_id: &str) -> AgentState {
        AgentState {
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            status: AgentRuntimeStatus::Busy,
            token_count: 100,
            api_call_count: 2,
            context: serde_json::json!({"k": "v"}),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_get_agent_state_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        let state = agent_state("agent-a", "sess-1");
        store.save_agent_state(&state).unwrap();
        let fetched = store.get_agent_state("agent-a", "sess-1").unwrap().unwrap();
        assert_eq!(fetched.token_count, 100);
        assert_eq!(fetched.status, AgentRuntimeStatus::Busy);
    }

    #[test]
    fn upsert_agent_state_overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        let mut state = agent_state("agent-a", "sess-1");
        store.save_agent_state(&state).unwrap();
        state.token_count = 500;
        store.save_agent_state(&state).unwrap();
        assert_eq!(store.get_agent_state("agent-a", "sess-1").unwrap().unwrap().token_count, 500);
    }

    #[test]
    fn message_filters_by_sender_and_correlation() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        let mut m1 = Message::new("m1", "agent-a", Recipient::Agent("agent-b".into()), MessageType::Request, MessagePriority::Normal, serde_json::json!({}));
        m1.correlation_id = Some("corr-1".into());
        let mut m2 = Message::new("m2", "agent-c", Recipient::Agent("agent-b".into()), MessageType::Request, MessagePriority::Normal, serde_json::json!({}));
        m2.correlation_id = Some("corr-2".into());
        store.save_message(&m1).unwrap();
        store.save_message(&m2).unwrap();

        let by_sender = store.get_messages(&MessageFilter { sender: Some("agent-a".into()), ..Default::default() }).unwrap();
        assert_eq!(by_sender.len(), 1);
        assert_eq!(by_sender[0].id, "m1");

        let by_corr = store.get_messages(&MessageFilter { correlation_id: Some("corr-2".into()), ..Default::default() }).unwrap();
        assert_eq!(by_corr.len(), 1);
        assert_eq!(by_corr[0].id, "m2");
    }

    #[test]
    fn mark_delivered_then_read_updates_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        let m = Message::new("m1", "agent-a", Recipient::Agent("agent-b".into()), MessageType::Inform, MessagePriority::Normal, serde_json::json!({}));
        store.save_message(&m).unwrap();
        store.mark_delivered("m1").unwrap();
        store.mark_read("m1").unwrap();
        let fetched = &store.get_messages(&MessageFilter::default()).unwrap()[0];
        assert_eq!(fetched.delivery_status, DeliveryStatus::Read);
    }

    #[test]
    fn sessions_track_active_and_end() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        store.save_session(&Session { id: "sess-1".into(), started_at: Utc::now(), ended_at: None, total_tokens: 0, total_api_calls: 0 }).unwrap();
        assert_eq!(store.get_active_sessions().unwrap().len(), 1);
        store.update_session_stats("sess-1", 42, 3).unwrap();
        store.end_session("sess-1").unwrap();
        assert_eq!(store.get_active_sessions().unwrap().len(), 0);
    }

    #[test]
    fn modification_history_appends_audit_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        let mut proposal = ModificationProposal {
            id: "p1".into(),
            title: "t".into(),
            description: "d".into(),
            author: "agent-a".into(),
            changes: vec![],
            risk_level: RiskLevel::Low,
            required_approvals: 1,
            reviews: vec![],
            status: ModProposalStatus::Draft,
            created_at: Utc::now(),
        };
        store.save_modification(&proposal).unwrap();
        proposal.status = ModProposalStatus::Approved;
        store.save_modification(&proposal).unwrap();
        let history = store.get_modification_history("p1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, ModProposalStatus::Approved);
    }

    #[test]
    fn list_latest_modifications_returns_one_row_per_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentOsStore::open(dir.path().join("s.sqlite")).unwrap();
        let mut p1 = ModificationProposal {
            id: "p1".into(),
            title: "t1".into(),
            description: "d".into(),
            author: "agent-a".into(),
            changes: vec![],
            risk_level: RiskLevel::Low,
            required_approvals: 1,
            reviews: vec![],
            status: ModProposalStatus::Draft,
            created_at: Utc::now(),
        };
        store.save_modification(&p1).unwrap();
        p1.status = ModProposalStatus::Approved;
        store.save_modification(&p1).unwrap();

        let p2 = ModificationProposal { id: "p2".into(), ..p1.clone() };
        store.save_modification(&p2).unwrap();

        let latest = store.list_latest_modifications().unwrap();
        assert_eq!(latest.len(), 2);
        let p1_latest = latest.iter().find(|p| p.id == "p1").unwrap();
        assert_eq!(p1_latest.status, ModProposalStatus::Approved);
    }
}
