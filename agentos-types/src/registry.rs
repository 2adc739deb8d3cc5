//! Agent / Skill / Tool registry entity definitions.
//!
//! These are YAML-defined in practice, but parsing YAML/Markdown front-matter
//! is an external collaborator's job;
//! this module only defines the typed shape a `Loader` hands back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Cli,
    Api,
    Mcp,
    Function,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillsConfig {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub disabled: Vec<String>,
}

/// Empty `enabled` means "all allowed except `disabled`".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl ToolsConfig {
    pub fn allows(&self, tool_id: &str) -> bool {
        if self.disabled.iter().any(|t| t == tool_id) {
            return false;
        }
        self.enabled.is_empty() || self.enabled.iter().any(|t| t == tool_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub required_scopes: Vec<String>,
    pub preferred_scopes: Vec<String>,
    pub excluded_scopes: Vec<String>,
    pub preferred_tags: Vec<String>,
    pub context_budget: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Professional,
    Casual,
    Concise,
    Verbose,
}

impl Default for Tone {
    fn default() -> Self {
        Tone::Professional
    }
}

impl Tone {
    /// Non-strict parsing: unknown tone falls back to `professional`.
    /// Returns whether the input was recognized, so `load_all` can record
    /// a validation warning.
    pub fn parse_lenient(s: &str) -> (Tone, bool) {
        match s {
            "professional" => (Tone::Professional, true),
            "casual" => (Tone::Casual, true),
            "concise" => (Tone::Concise, true),
            "verbose" => (Tone::Verbose, true),
            _ => (Tone::Professional, false),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorConfig {
    pub tone: Tone,
    pub verbosity: Option<String>,
    pub focus_areas: Vec<String>,
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConstraints {
    pub token_ceiling: Option<u64>,
    pub tool_execution_allowed: bool,
    pub memory_write_allowed: bool,
    pub allowed_scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub description: String,
    pub skills: SkillsConfig,
    pub tools: ToolsConfig,
    pub memory: MemoryConfig,
    pub behavior: BehaviorConfig,
    pub constraints: AgentConstraints,
    pub enabled: bool,
    /// Populated by the registry loader when a referenced skill/tool id does
    /// not exist; the agent remains loadable regardless.
    pub validation_warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub description: String,
    pub depends_on: Vec<String>,
    /// Tool ids this skill invokes; backs the `USES_TOOL` graph edge.
    #[serde(default)]
    pub uses_tools: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub kind: ToolKind,
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub description: String,
    /// CLI tools: the command to run for a liveness probe.
    pub check_command: Option<String>,
    /// API tools: environment variable whose presence implies credentials exist.
    pub auth_env_var: Option<String>,
    pub required_platform: Option<String>,
    pub required_files: Vec<String>,
    pub enabled: bool,
}

/// A single scored hit from `AgentRegistry::search` / `SkillRegistry::search`
/// / `ToolRegistry::search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit<T> {
    pub item: T,
    pub score: f64,
    pub rationale: Vec<String>,
}

/// Availability probe result, cached per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_enabled_list_allows_everything_not_disabled() {
        let cfg = ToolsConfig {
            enabled: vec![],
            disabled: vec!["rm".into()],
        };
        assert!(cfg.allows("ls"));
        assert!(!cfg.allows("rm"));
    }

    #[test]
    fn nonempty_enabled_list_is_an_allow_list() {
        let cfg = ToolsConfig {
            enabled: vec!["ls".into()],
            disabled: vec![],
        };
        assert!(cfg.allows("ls"));
        assert!(!cfg.allows("cat"));
    }

    #[test]
    fn invalid_tone_falls_back_non_strict() {
        let (tone, ok) = Tone::parse_lenient("invalid");
        assert_eq!(tone, Tone::Professional);
        assert!(!ok);
    }
}
