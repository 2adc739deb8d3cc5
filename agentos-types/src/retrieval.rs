//! Ephemeral retrieval/assembly types.

use serde::{Deserialize, Serialize};

/// How a non-initial candidate was reached during graph expansion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTrace {
    pub source_id: String,
    pub edge_type: String,
    pub hop_count: u32,
}

/// One memory's scored retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub memory_id: String,
    pub vector_score: f64,
    pub graph_score: f64,
    pub combined_score: f64,
    pub connections: Vec<ConnectionTrace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextFormat {
    Markdown,
    Json,
    PlainText,
}

/// A contradiction pair surfaced to the reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionWarning {
    pub m1_id: String,
    pub m2_id: String,
    pub description: String,
}

/// The final assembled context pack handed to the agent prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub baseline_ids: Vec<String>,
    pub results: Vec<RetrievalResult>,
    pub warnings: Vec<ContradictionWarning>,
    pub format: ContextFormat,
    pub rendered: String,
    pub truncated: bool,
    pub estimated_tokens: u32,
}
