//! Edge (relationship) model.

use serde::{Deserialize, Serialize};

/// Node kinds stored in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Memory,
    Tag,
    Scope,
    Concept,
    Agent,
    Skill,
    Tool,
}

/// A typed, directed, sometimes weighted edge between two graph nodes.
///
/// Each variant fixes its own endpoint node kinds; [`EdgeType::expected_endpoints`]
/// exposes that for the store's validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    RelatesTo { weight: f64, context: Option<String> },
    Supports { strength: f64 },
    Contradicts { description: String },
    DependsOn,
    Supersedes { reason: Option<String> },
    HasTag,
    InScope,
    TagCooccurs { count: u64 },
    HasSkill { primary: bool },
    HasTool,
    PrefersScope,
    SkillDependsOn,
    UsesTool,
}

impl EdgeType {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeType::RelatesTo { .. } => "RELATES_TO",
            EdgeType::Supports { .. } => "SUPPORTS",
            EdgeType::Contradicts { .. } => "CONTRADICTS",
            EdgeType::DependsOn => "DEPENDS_ON",
            EdgeType::Supersedes { .. } => "SUPERSEDES",
            EdgeType::HasTag => "HAS_TAG",
            EdgeType::InScope => "IN_SCOPE",
            EdgeType::TagCooccurs { .. } => "TAG_COOCCURS",
            EdgeType::HasSkill { .. } => "HAS_SKILL",
            EdgeType::HasTool => "HAS_TOOL",
            EdgeType::PrefersScope => "PREFERS_SCOPE",
            EdgeType::SkillDependsOn => "SKILL_DEPENDS_ON",
            EdgeType::UsesTool => "USES_TOOL",
        }
    }

    /// `(from, to)` node kinds this edge type is legal between. The store
    /// rejects an edge whose endpoints don't match.
    pub fn expected_endpoints(&self) -> (NodeKind, NodeKind) {
        match self {
            EdgeType::RelatesTo { .. }
            | EdgeType::Supports { .. }
            | EdgeType::Contradicts { .. }
            | EdgeType::DependsOn
            | EdgeType::Supersedes { .. } => (NodeKind::Memory, NodeKind::Memory),
            EdgeType::HasTag => (NodeKind::Memory, NodeKind::Tag),
            EdgeType::InScope => (NodeKind::Memory, NodeKind::Scope),
            EdgeType::TagCooccurs { .. } => (NodeKind::Tag, NodeKind::Tag),
            EdgeType::HasSkill { .. } => (NodeKind::Agent, NodeKind::Skill),
            EdgeType::HasTool => (NodeKind::Agent, NodeKind::Tool),
            EdgeType::PrefersScope => (NodeKind::Agent, NodeKind::Scope),
            EdgeType::SkillDependsOn => (NodeKind::Skill, NodeKind::Skill),
            EdgeType::UsesTool => (NodeKind::Skill, NodeKind::Tool),
        }
    }

    /// Edge types the retrieval pipeline's graph-expansion stage follows by
    /// default.
    pub fn default_expansion_types() -> [&'static str; 3] {
        ["SUPPORTS", "RELATES_TO", "DEPENDS_ON"]
    }

    /// Whether this edge type carries a `weight`/`strength` in `[0, 1]` that
    /// the store must validate.
    pub fn weight(&self) -> Option<f64> {
        match self {
            EdgeType::RelatesTo { weight, .. } => Some(*weight),
            EdgeType::Supports { strength } => Some(*strength),
            _ => None,
        }
    }
}

/// A persisted edge row: endpoints plus the typed payload above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from_id: String,
    pub to_id: String,
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, edge_type: EdgeType) -> Self {
        Edge {
            from_id: from_id.into(),
            to_id: to_id.into(),
            edge_type,
        }
    }

    /// The unordered pair key used by dedupe logic across conflicts and
    /// the `(from, to, type)` uniqueness invariant.
    pub fn pair_key(&self) -> (String, String) {
        sorted_pair(&self.from_id, &self.to_id)
    }
}

/// Canonical unordered-pair key: `min(a, b), max(a, b)` (GLOSSARY "Pair hash").
pub fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// `min(a,b)|max(a,b)` — the literal string form used as a SQL unique key
/// for an unordered memory pair.
pub fn pair_hash(a: &str, b: &str) -> String {
    let (lo, hi) = sorted_pair(a, b);
    format!("{lo}|{hi}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_hash_is_order_independent() {
        assert_eq!(pair_hash("b", "a"), pair_hash("a", "b"));
    }

    #[test]
    fn no_self_loop_allowed_is_caller_responsibility_but_detectable() {
        let e = Edge::new("m1", "m1", EdgeType::DependsOn);
        assert_eq!(e.from_id, e.to_id);
    }

    #[test]
    fn expansion_types_match_spec_default() {
        assert_eq!(
            EdgeType::default_expansion_types(),
            ["SUPPORTS", "RELATES_TO", "DEPENDS_ON"]
        );
    }
}
