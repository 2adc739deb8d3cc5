//! Consumed-interface traits: the store
//! and pipeline modules are generic over these rather than depending on a
//! concrete embedder or LLM provider.

use async_trait::async_trait;

use agentos_types::{AgentDefinition, SkillDefinition, ToolDefinition};

use crate::error::StoreError;

/// Produces a fixed-dimension float vector from text.
/// A given database instance fixes its dimension once the first embedding is
/// written; changing embedders requires a full reindex.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    /// Name recorded in `system_meta.embedding_model`; a mismatch against the
    /// stored value is the signal that a reindex is required.
    fn model_name(&self) -> &str;
}

/// Calls an LLM with a prompt and returns its text response. `call_json` is optional; when a provider can't guarantee
/// structured output the LLM extractor strips code fences and parses itself.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call(&self, prompt: &str) -> Result<String, StoreError>;

    async fn call_json(&self, prompt: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let _ = prompt;
        Ok(None)
    }
}

/// Produces registry entities from YAML/Markdown sources; the core never parses those formats directly, only consumes
/// the typed result.
pub trait AgentLoader: Send + Sync {
    fn load_all(&self) -> Result<Vec<AgentDefinition>, StoreError>;
}

pub trait SkillLoader: Send + Sync {
    fn load_all(&self) -> Result<Vec<SkillDefinition>, StoreError>;
}

pub trait ToolLoader: Send + Sync {
    fn load_all(&self) -> Result<Vec<ToolDefinition>, StoreError>;
}
