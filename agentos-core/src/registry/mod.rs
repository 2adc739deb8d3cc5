//! Agent / Skill / Tool registries and the cross-registry matcher. Each registry is generic over the typed entity it holds; loading
//! from YAML/Markdown is delegated to a [`crate::collaborators`] loader
//! trait, never parsed here.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use agentos_types::{
    AgentConstraints, AgentDefinition, Availability, BehaviorConfig, MemoryConfig, SearchHit,
    SkillDefinition, SkillsConfig, Tone, ToolDefinition, ToolKind, ToolsConfig,
};
use serde_json::json;

use crate::collaborators::{AgentLoader, SkillLoader, ToolLoader};
use crate::error::{GraphError, StoreError};
use crate::graph::GraphStore;

mod matcher;
mod tool_availability;

pub use matcher::{AgentMatch, AgentMatcher};
pub use tool_availability::check_tool_availability;

/// Common accessors every registry entity exposes, so [`Registry<T>`] can
/// stay generic over scoring, lookup, and enable/disable.
pub trait RegistryEntity: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn tags(&self) -> &BTreeSet<String>;
    fn category(&self) -> Option<&str>;
    fn enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
}

impl RegistryEntity for AgentDefinition {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { &self.description }
    fn tags(&self) -> &BTreeSet<String> { &self.tags }
    fn category(&self) -> Option<&str> { self.category.as_deref() }
    fn enabled(&self) -> bool { self.enabled }
    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
}

impl RegistryEntity for SkillDefinition {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { &self.description }
    fn tags(&self) -> &BTreeSet<String> { &self.tags }
    fn category(&self) -> Option<&str> { self.category.as_deref() }
    fn enabled(&self) -> bool { self.enabled }
    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
}

impl RegistryEntity for ToolDefinition {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { &self.description }
    fn tags(&self) -> &BTreeSet<String> { &self.tags }
    fn category(&self) -> Option<&str> { self.category.as_deref() }
    fn enabled(&self) -> bool { self.enabled }
    fn set_enabled(&mut self, enabled: bool) { self.enabled = enabled; }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub total: u64,
    pub enabled: u64,
    pub disabled: u64,
    pub by_category: HashMap<String, u64>,
}

/// Scores `item` against `query`, returning the score and a rationale trail.
fn score_entity<T: RegistryEntity>(item: &T, query: &str) -> (f64, Vec<String>) {
    let query_lower = query.to_lowercase();
    let mut score = 0.0;
    let mut rationale = Vec::new();

    if item.id().to_lowercase() == query_lower {
        score += 100.0;
        rationale.push("exact id match".to_string());
    }

    let name_lower = item.name().to_lowercase();
    if name_lower.contains(&query_lower) {
        score += 50.0;
        rationale.push("name contains query".to_string());
        if name_lower.starts_with(&query_lower) {
            score += 25.0;
            rationale.push("name starts with query".to_string());
        }
    }

    if item.description().to_lowercase().contains(&query_lower) {
        score += 20.0;
        rationale.push("description contains query".to_string());
    }

    if item.tags().iter().any(|t| t.to_lowercase().contains(&query_lower)) {
        score += 10.0;
        rationale.push("tag contains query".to_string());
    }

    (score, rationale)
}

/// Generic registry over one entity type: `AgentRegistry`,
/// `SkillRegistry`, and `ToolRegistry` are all instantiations of this.
pub struct Registry<T: RegistryEntity> {
    items: RwLock<HashMap<String, T>>,
}

impl<T: RegistryEntity> Default for Registry<T> {
    fn default() -> Self {
        Registry { items: RwLock::new(HashMap::new()) }
    }
}

impl<T: RegistryEntity> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full item set with whatever the loader returns.
    pub fn load_all(&self, items: Vec<T>) {
        let mut guard = self.items.write().unwrap();
        guard.clear();
        for item in items {
            guard.insert(item.id().to_string(), item);
        }
    }

    /// Same as `load_all` with a fresh load — the distinction is semantic
    ///, the implementation is identical.
    pub fn reload(&self, items: Vec<T>) {
        self.load_all(items);
    }

    pub fn load_by_id(&self, id: &str) -> Option<T> {
        self.items.read().unwrap().get(id).cloned()
    }

    pub fn find_by_id(&self, id: &str) -> Option<T> {
        self.load_by_id(id)
    }

    pub fn find_by_category(&self, category: &str) -> Vec<T> {
        self.items
            .read()
            .unwrap()
            .values()
            .filter(|i| i.category() == Some(category))
            .cloned()
            .collect()
    }

    /// `match_all = true` requires every tag present; otherwise any overlap.
    pub fn find_by_tags(&self, tags: &[String], match_all: bool) -> Vec<T> {
        self.items
            .read()
            .unwrap()
            .values()
            .filter(|i| {
                if match_all {
                    tags.iter().all(|t| i.tags().contains(t))
                } else {
                    tags.iter().any(|t| i.tags().contains(t))
                }
            })
            .cloned()
            .collect()
    }

    pub fn search(&self, query: &str, enabled_only: bool, category: Option<&str>) -> Vec<SearchHit<T>> {
        let mut hits: Vec<SearchHit<T>> = self
            .items
            .read()
            .unwrap()
            .values()
            .filter(|i| !enabled_only || i.enabled())
            .filter(|i| category.map(|c| i.category() == Some(c)).unwrap_or(true))
            .map(|i| {
                let (score, rationale) = score_entity(i, query);
                SearchHit { item: i.clone(), score, rationale }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }

    pub fn enable(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.items.write().unwrap();
        let item = guard.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        item.set_enabled(true);
        Ok(())
    }

    pub fn disable(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.items.write().unwrap();
        let item = guard.get_mut(id).ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        item.set_enabled(false);
        Ok(())
    }

    pub fn list_all(&self) -> Vec<T> {
        self.items.read().unwrap().values().cloned().collect()
    }

    pub fn get_stats(&self) -> RegistryStats {
        let items = self.items.read().unwrap();
        let mut stats = RegistryStats { total: items.len() as u64, ..Default::default() };
        for item in items.values() {
            if item.enabled() {
                stats.enabled += 1;
            } else {
                stats.disabled += 1;
            }
            if let Some(category) = item.category() {
                *stats.by_category.entry(category.to_string()).or_insert(0) += 1;
            }
        }
        stats
    }
}

pub type AgentRegistry = Registry<AgentDefinition>;
pub type SkillRegistry = Registry<SkillDefinition>;

impl AgentRegistry {
    pub fn load_from(&self, loader: &dyn AgentLoader) -> Result<(), StoreError> {
        self.load_all(loader.load_all()?);
        Ok(())
    }

    /// Upserts an `AgentNode` for each loaded agent and its `HAS_SKILL`,
    /// `HAS_TOOL`, and `PREFERS_SCOPE` edges.
    /// Idempotent: re-running with the same data is a no-op on the graph.
    pub fn sync_to_graph(&self, graph: &GraphStore) -> Result<(), GraphError> {
        for agent in self.list_all() {
            graph.upsert_node(
                &agent.id,
                agentos_types::NodeKind::Agent,
                json!({ "name": agent.name, "category": agent.category }),
            )?;
            for skill_id in agent.skills.primary.iter() {
                graph.create_edge(
                    agentos_types::Edge::new(&agent.id, skill_id, agentos_types::EdgeType::HasSkill { primary: true }),
                    json!({}),
                )?;
            }
            for skill_id in agent.skills.secondary.iter() {
                graph.create_edge(
                    agentos_types::Edge::new(&agent.id, skill_id, agentos_types::EdgeType::HasSkill { primary: false }),
                    json!({}),
                )?;
            }
            for tool_id in agent.tools.enabled.iter() {
                graph.create_edge(
                    agentos_types::Edge::new(&agent.id, tool_id, agentos_types::EdgeType::HasTool),
                    json!({}),
                )?;
            }
            for scope in agent.memory.preferred_scopes.iter() {
                graph.create_edge(
                    agentos_types::Edge::new(&agent.id, scope, agentos_types::EdgeType::PrefersScope),
                    json!({}),
                )?;
            }
        }
        Ok(())
    }
}

impl SkillRegistry {
    pub fn load_from(&self, loader: &dyn SkillLoader) -> Result<(), StoreError> {
        self.load_all(loader.load_all()?);
        Ok(())
    }

    /// Upserts a `SkillNode` and its `SKILL_DEPENDS_ON` edges.
    pub fn sync_to_graph(&self, graph: &GraphStore) -> Result<(), GraphError> {
        for skill in self.list_all() {
            graph.upsert_node(
                &skill.id,
                agentos_types::NodeKind::Skill,
                json!({ "name": skill.name, "category": skill.category }),
            )?;
            for dep in skill.depends_on.iter() {
                graph.create_edge(
                    agentos_types::Edge::new(&skill.id, dep, agentos_types::EdgeType::SkillDependsOn),
                    json!({}),
                )?;
            }
        }
        Ok(())
    }
}

pub struct ToolRegistry {
    inner: Registry<ToolDefinition>,
    availability: RwLock<HashMap<String, Availability>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        ToolRegistry { inner: Registry::new(), availability: RwLock::new(HashMap::new()) }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from(&self, loader: &dyn ToolLoader) -> Result<(), StoreError> {
        self.inner.load_all(loader.load_all()?);
        Ok(())
    }

    pub fn load_all(&self, items: Vec<ToolDefinition>) {
        self.inner.load_all(items);
    }
    pub fn reload(&self, items: Vec<ToolDefinition>) {
        self.inner.reload(items);
    }
    pub fn find_by_id(&self, id: &str) -> Option<ToolDefinition> {
        self.inner.find_by_id(id)
    }
    pub fn find_by_category(&self, category: &str) -> Vec<ToolDefinition> {
        self.inner.find_by_category(category)
    }
    pub fn find_by_tags(&self, tags: &[String], match_all: bool) -> Vec<ToolDefinition> {
        self.inner.find_by_tags(tags, match_all)
    }
    pub fn search(&self, query: &str, enabled_only: bool, category: Option<&str>) -> Vec<SearchHit<ToolDefinition>> {
        self.inner.search(query, enabled_only, category)
    }
    pub fn enable(&self, id: &str) -> Result<(), StoreError> {
        self.inner.enable(id)
    }
    pub fn disable(&self, id: &str) -> Result<(), StoreError> {
        self.inner.disable(id)
    }
    pub fn list_all(&self) -> Vec<ToolDefinition> {
        self.inner.list_all()
    }
    pub fn get_stats(&self) -> RegistryStats {
        self.inner.get_stats()
    }

    /// Probes and caches availability for every loaded tool using
    /// type-specific liveness signals. Re-running overwrites the cache
    /// (it is per-run, not persisted).
    pub fn check_availability_all(&self) {
        let tools = self.list_all();
        let mut cache = self.availability.write().unwrap();
        for tool in tools {
            cache.insert(tool.id.clone(), check_tool_availability(&tool));
        }
    }

    pub fn get_cached_availability(&self, id: &str) -> Option<Availability> {
        self.availability.read().unwrap().get(id).copied()
    }

    /// Upserts a `ToolNode` and its `USES_TOOL` edges (skill → tool).
    pub fn sync_to_graph(&self, graph: &GraphStore, skills: &SkillRegistry) -> Result<(), GraphError> {
        for tool in self.list_all() {
            graph.upsert_node(
                &tool.id,
                agentos_types::NodeKind::Tool,
                json!({ "name": tool.name, "kind": format!("{:?}", tool.kind) }),
            )?;
        }
        for skill in skills.list_all() {
            for tool_id in skill.uses_tools.iter() {
                graph.create_edge(
                    agentos_types::Edge::new(&skill.id, tool_id, agentos_types::EdgeType::UsesTool),
                    json!({}),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str, name: &str) -> AgentDefinition {
        AgentDefinition {
            id: id.into(),
            name: name.into(),
            category: Some("ops".into()),
            tags: BTreeSet::from(["rust".to_string()]),
            description: "handles rust tasks".into(),
            skills: SkillsConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            behavior: BehaviorConfig { tone: Tone::Professional, verbosity: None, focus_areas: vec!["rust".into()], guidelines: vec![] },
            constraints: AgentConstraints::default(),
            enabled: true,
            validation_warnings: vec![],
        }
    }

    #[test]
    fn exact_id_match_outscores_partial_name_match() {
        let reg: Registry<AgentDefinition> = Registry::new();
        reg.load_all(vec![agent("rustacean", "Helper"), agent("helper-2", "rustacean helper")]);
        let hits = reg.search("rustacean", false, None);
        assert_eq!(hits[0].item.id, "rustacean");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn find_by_tags_match_all_requires_every_tag() {
        let mut a = agent("a1", "A");
        a.tags = BTreeSet::from(["rust".to_string(), "cli".to_string()]);
        let mut b = agent("b1", "B");
        b.tags = BTreeSet::from(["rust".to_string()]);
        let reg: Registry<AgentDefinition> = Registry::new();
        reg.load_all(vec![a, b]);
        let matched = reg.find_by_tags(&["rust".into(), "cli".into()], true);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "a1");
    }

    #[test]
    fn enable_disable_round_trips_and_missing_id_errors() {
        let reg: Registry<AgentDefinition> = Registry::new();
        reg.load_all(vec![agent("a1", "A")]);
        reg.disable("a1").unwrap();
        assert!(!reg.find_by_id("a1").unwrap().enabled);
        reg.enable("a1").unwrap();
        assert!(reg.find_by_id("a1").unwrap().enabled);
        assert!(reg.disable("missing").is_err());
    }

    #[test]
    fn stats_count_enabled_and_by_category() {
        let reg: Registry<AgentDefinition> = Registry::new();
        let mut disabled_agent = agent("a2", "B");
        disabled_agent.enabled = false;
        reg.load_all(vec![agent("a1", "A"), disabled_agent]);
        let stats = reg.get_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.enabled, 1);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.by_category.get("ops"), Some(&2));
    }
}
