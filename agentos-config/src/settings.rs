//! Typed AgentOS settings (TOML), layered on top of [`crate::load_and_apply`].
//!
//! Covers the tunables left as named defaults rather than hard constants:
//! retrieval scoring weights, extractor thresholds, write-back retry limits,
//! and LLM call timeouts.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("read settings file: {0}")]
    Read(std::io::Error),
    #[error("parse settings toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("vector_weight + graph_weight must sum to 1.0, got {0}")]
    WeightsDontSumToOne(f64),
}

/// Hybrid retrieval tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub vector_candidate_multiplier: u32,
    pub max_graph_depth: u32,
    pub max_expansion_per_hop: u32,
    pub hop_decay: f64,
    pub direct_connection_boost: f64,
    pub vector_weight: f64,
    pub graph_weight: f64,
    pub max_relationship_context: u32,
    pub contradiction_penalty: f64,
    pub default_limit: u32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        RetrievalSettings {
            vector_candidate_multiplier: 3,
            max_graph_depth: 2,
            max_expansion_per_hop: 20,
            hop_decay: 0.7,
            direct_connection_boost: 1.0,
            vector_weight: 0.6,
            graph_weight: 0.4,
            max_relationship_context: 5,
            contradiction_penalty: 0.5,
            default_limit: 10,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        let sum = self.vector_weight + self.graph_weight;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(SettingsError::WeightsDontSumToOne(sum));
        }
        Ok(())
    }
}

/// Extractor orchestrator thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    pub min_edge_weight: f64,
    pub max_edges_per_memory: u32,
    pub semantic_relates_threshold: f64,
    pub semantic_supports_threshold: f64,
    pub llm_min_priority: f64,
    pub llm_max_context_memories: u32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        ExtractorSettings {
            min_edge_weight: 0.3,
            max_edges_per_memory: 30,
            semantic_relates_threshold: 0.75,
            semantic_supports_threshold: 0.9,
            llm_min_priority: 0.7,
            llm_max_context_memories: 10,
        }
    }
}

/// Write-back pipeline tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WritebackSettings {
    pub max_retries: u32,
    pub auto_review_confidence_threshold: f64,
}

impl Default for WritebackSettings {
    fn default() -> Self {
        WritebackSettings {
            max_retries: 3,
            auto_review_confidence_threshold: 0.8,
        }
    }
}

/// LLM call retry/backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmCallSettings {
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub backoff_initial_seconds: u64,
    pub backoff_factor: f64,
}

impl Default for LlmCallSettings {
    fn default() -> Self {
        LlmCallSettings {
            timeout_seconds: 30,
            max_retries: 3,
            backoff_initial_seconds: 1,
            backoff_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOsSettings {
    pub retrieval: RetrievalSettings,
    pub extractors: ExtractorSettings,
    pub writeback: WritebackSettings,
    pub llm: LlmCallSettings,
}

impl AgentOsSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let settings: AgentOsSettings = toml::from_str(s)?;
        settings.retrieval.validate()?;
        Ok(settings)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(AgentOsSettings::default());
        }
        let content = std::fs::read_to_string(path).map_err(SettingsError::Read)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_satisfy_weight_invariant() {
        assert!(AgentOsSettings::default().retrieval.validate().is_ok());
    }

    #[test]
    fn mismatched_weights_rejected() {
        let mut r = RetrievalSettings::default();
        r.vector_weight = 0.5;
        r.graph_weight = 0.6;
        assert!(matches!(
            r.validate(),
            Err(SettingsError::WeightsDontSumToOne(_))
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let loaded = AgentOsSettings::load_from_file(Path::new("/nonexistent/path.toml")).unwrap();
        assert_eq!(loaded.retrieval.default_limit, 10);
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let toml = r#"
[retrieval]
max_graph_depth = 0
"#;
        let settings = AgentOsSettings::from_toml_str(toml).unwrap();
        assert_eq!(settings.retrieval.max_graph_depth, 0);
        assert_eq!(settings.retrieval.vector_weight, 0.6);
    }
}
