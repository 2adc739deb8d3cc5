//! AgentMatcher: ranks enabled agents against a task
//! description and/or a required skill/tag set.

use agentos_types::AgentDefinition;

#[derive(Debug, Clone)]
pub struct AgentMatch {
    pub agent: AgentDefinition,
    pub score: f64,
    pub rationale: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AgentMatcher;

impl AgentMatcher {
    pub fn new() -> Self {
        AgentMatcher
    }

    /// `score = 0.5 * skill_match + 0.3 * tag_match + 0.2 * focus_area_match`
    ///. An empty `required_skills`/`required_tags`
    /// scores that component at 1.0 (nothing required, nothing missed).
    pub fn match_task(
        &self,
        agents: &[AgentDefinition],
        task_description: &str,
        required_skills: &[String],
        required_tags: &[String],
    ) -> Vec<AgentMatch> {
        let description_lower = task_description.to_lowercase();

        let mut matches: Vec<AgentMatch> = agents
            .iter()
            .filter(|a| a.enabled)
            .map(|agent| {
                let mut rationale = Vec::new();

                let all_skills: Vec<&String> =
                    agent.skills.primary.iter().chain(agent.skills.secondary.iter()).collect();
                let skill_score = if required_skills.is_empty() {
                    1.0
                } else {
                    let matched = required_skills.iter().filter(|s| all_skills.contains(s)).count();
                    if matched > 0 {
                        rationale.push(format!("{matched}/{} required skills present", required_skills.len()));
                    }
                    matched as f64 / required_skills.len() as f64
                };

                let tag_score = if required_tags.is_empty() {
                    1.0
                } else {
                    let matched = required_tags.iter().filter(|t| agent.tags.contains(t.as_str())).count();
                    if matched > 0 {
                        rationale.push(format!("{matched}/{} required tags present", required_tags.len()));
                    }
                    matched as f64 / required_tags.len() as f64
                };

                let focus_score = if agent.behavior.focus_areas.is_empty() || description_lower.is_empty() {
                    0.0
                } else {
                    let matched = agent
                        .behavior
                        .focus_areas
                        .iter()
                        .filter(|area| description_lower.contains(&area.to_lowercase()))
                        .count();
                    if matched > 0 {
                        rationale.push(format!("{matched} focus area(s) match task description"));
                    }
                    matched as f64 / agent.behavior.focus_areas.len() as f64
                };

                let score = 0.5 * skill_score + 0.3 * tag_score + 0.2 * focus_score;
                AgentMatch { agent: agent.clone(), score, rationale }
            })
            .collect();

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentos_types::{
        AgentConstraints, BehaviorConfig, MemoryConfig, SkillsConfig, Tone, ToolsConfig,
    };
    use std::collections::BTreeSet;

    fn agent(id: &str, primary_skills: &[&str], focus_areas: &[&str]) -> AgentDefinition {
        AgentDefinition {
            id: id.into(),
            name: id.into(),
            category: None,
            tags: BTreeSet::new(),
            description: String::new(),
            skills: SkillsConfig { primary: primary_skills.iter().map(|s| s.to_string()).collect(), secondary: vec![], disabled: vec![] },
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
            behavior: BehaviorConfig { tone: Tone::Professional, verbosity: None, focus_areas: focus_areas.iter().map(|s| s.to_string()).collect(), guidelines: vec![] },
            constraints: AgentConstraints::default(),
            enabled: true,
            validation_warnings: vec![],
        }
    }

    #[test]
    fn agent_with_matching_skill_and_focus_area_scores_highest() {
        let matcher = AgentMatcher::new();
        let agents = vec![
            agent("rust-expert", &["rust-review"], &["rust"]),
            agent("generalist", &[], &[]),
        ];
        let matches = matcher.match_task(&agents, "review this rust pull request", &["rust-review".into()], &[]);
        assert_eq!(matches[0].agent.id, "rust-expert");
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn disabled_agents_are_excluded() {
        let matcher = AgentMatcher::new();
        let mut disabled = agent("a1", &[], &[]);
        disabled.enabled = false;
        let matches = matcher.match_task(&[disabled], "anything", &[], &[]);
        assert!(matches.is_empty());
    }
}
