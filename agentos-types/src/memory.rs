//! The [`Memory`] entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a memory lives in the retrieval hierarchy.
///
/// `Baseline` memories are injected into every query pack regardless of the
/// query. Closed set by design — a new scope is a
/// schema change, not runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Baseline,
    Global,
    Agent,
    Project,
    Ephemeral,
    Deprecated,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Baseline => "baseline",
            Scope::Global => "global",
            Scope::Agent => "agent",
            Scope::Project => "project",
            Scope::Ephemeral => "ephemeral",
            Scope::Deprecated => "deprecated",
        }
    }

    /// All legal scope values, for front-matter validation and `--scope` CLI checks.
    pub const ALL: [Scope; 6] = [
        Scope::Baseline,
        Scope::Global,
        Scope::Agent,
        Scope::Project,
        Scope::Ephemeral,
        Scope::Deprecated,
    ];
}

impl std::str::FromStr for Scope {
    type Err = crate::error::AgentOsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(Scope::Baseline),
            "global" => Ok(Scope::Global),
            "agent" => Ok(Scope::Agent),
            "project" => Ok(Scope::Project),
            "ephemeral" => Ok(Scope::Ephemeral),
            "deprecated" => Ok(Scope::Deprecated),
            other => Err(crate::error::AgentOsError::validation(
                "scope",
                format!("unknown scope `{other}`"),
            )),
        }
    }
}

/// Maturity/trust tier of a memory's content, separate from its lifecycle `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Experimental,
    Active,
    Stable,
    Deprecated,
}

/// Lifecycle status. `Deprecated` excludes a memory from default retrieval
/// but the row is never hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Active,
    Deprecated,
}

/// Dense vector used for similarity ranking. Stored as float32 to match the
/// on-disk blob format.
pub type Embedding = Vec<f32>;

/// A named unit of persistent knowledge with content body and front-matter metadata.
///
/// `id` is assigned at creation time by the write-back pipeline
/// (`mem_<date>_<n>`) and is never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub path: String,
    pub directory: String,
    pub title: String,
    pub body: String,
    pub scope: Scope,
    /// Retrieval weight in `[0, 1]`; higher sorts earlier when scores tie.
    pub priority: f64,
    pub confidence: Confidence,
    pub status: MemoryStatus,
    pub tags: BTreeSet<String>,
    pub token_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u64,
    /// SHA-256 hex digest of `body`, used by the committer's stale-precondition check.
    pub content_hash: String,
    /// Dense embedding of the memory's own text.
    pub composite_embedding: Option<Embedding>,
    /// Mean of `composite_embedding` across every memory in `directory`.
    pub directory_embedding: Option<Embedding>,
    /// Front-matter `supersedes:` ids, if any.
    pub supersedes: Vec<String>,
    /// Front-matter `related:` ids, if any.
    pub related: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Maximum token count a single memory may carry.
pub const MAX_MEMORY_TOKENS: u32 = 2000;

impl Memory {
    /// Tokens estimated the way the context assembler does: `char_count * 0.25`.
    ///
    /// This is distinct from the write-back proposal check (`word_count * 1.3`,
    /// widened by 10%) — the two estimators serve different boundary tests
    /// and must not be unified.
    pub fn estimate_tokens_from_chars(body: &str) -> u32 {
        ((body.chars().count() as f64) * 0.25).ceil() as u32
    }

    pub fn is_retrievable_by_default(&self) -> bool {
        self.status == MemoryStatus::Active
    }

    pub fn is_baseline(&self) -> bool {
        self.scope == Scope::Baseline && self.status == MemoryStatus::Active
    }
}

/// Generates the next append-only memory id for a given UTC date, e.g. `mem_2026_07_27_003`.
///
/// `existing_count` is the number of ids already minted for that date; the
/// caller (write-back committer) is responsible for holding whatever lock
/// makes this atomic, so ids stay globally unique and append-only.
pub fn next_memory_id(date: DateTime<Utc>, existing_count: u32) -> String {
    format!(
        "mem_{}_{:03}",
        date.format("%Y_%m_%d"),
        existing_count + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trips_through_str() {
        for s in Scope::ALL {
            let parsed: Scope = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn unknown_scope_is_validation_failure() {
        let err = "nonsense".parse::<Scope>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationFailure);
    }

    #[test]
    fn next_id_increments_and_zero_pads() {
        let date = DateTime::parse_from_rfc3339("2026-07-27T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(next_memory_id(date, 0), "mem_2026_07_27_001");
        assert_eq!(next_memory_id(date, 41), "mem_2026_07_27_042");
    }

    #[test]
    fn token_estimate_matches_char_count_formula() {
        let body = "a".repeat(100);
        assert_eq!(Memory::estimate_tokens_from_chars(&body), 25);
    }
}
