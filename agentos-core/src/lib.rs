//! # agentos-core
//!
//! Runtime and storage engine for AgentOS: a knowledge graph of memories and
//! agent-facing entities, a hybrid (vector + graph) retrieval pipeline, a
//! conflict detection and resolution engine, a write-back review pipeline,
//! and the agent runtime (message bus, task tracker, self-modification
//! proposals, session persistence).
//!
//! ## Main modules
//!
//! - [`graph`]: [`GraphStore`] — the durable knowledge graph (nodes/edges,
//!   BFS expansion, shortest path, supersession chains); [`graph::migration`]
//!   rebuilds it from [`memory_store::MemoryStore`] contents.
//! - [`memory_store`]: [`memory_store::MemoryStore`] — SQLite-backed CRUD for
//!   `Memory` rows, plus Rust-side [`memory_store::cosine_similarity`].
//! - [`retrieval`]: the hybrid retrieval pipeline — tag/temporal/semantic
//!   (and optional LLM) extractors, graph-aware context assembly, scoring.
//! - [`conflict`]: conflict analyzers, the merger, the detector orchestrator,
//!   and the resolver (deprecate/merge/clarify/dismiss/defer).
//! - [`writeback`]: [`writeback::ReviewQueue`], [`writeback::Reviewer`],
//!   [`writeback::Committer`] — the proposal-queue write-back pipeline.
//! - [`runtime`]: [`runtime::MessageBus`], [`runtime::TaskTracker`], the
//!   self-modification proposal manager, and [`runtime::AgentOsStore`].
//! - [`registry`]: agent/skill/tool registries, graph sync, agent matching.
//! - [`usage`]: query logging and memory health reporting.
//! - [`error`]: subsystem leaf errors ([`error::StoreError`],
//!   [`error::GraphError`]) composing into [`agentos_types::AgentOsError`].

pub mod collaborators;
pub mod conflict;
pub mod error;
pub mod graph;
pub mod hash;
pub mod memory_store;
pub mod registry;
pub mod retrieval;
pub mod runtime;
pub mod usage;
pub mod writeback;

pub use error::{GraphError, StoreError};
pub use graph::{GraphStats, GraphStore};
pub use memory_store::{cosine_similarity, MemoryFilter, MemoryStore};

#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
