//! # agentos-types
//!
//! Shared domain model for AgentOS: the data types every other
//! crate in this workspace builds on. No I/O lives here — stores, the
//! retriever, the conflict pipeline, and the runtime all live in
//! `agentos-core` and consume these types.
//!
//! ## Main modules
//!
//! - [`memory`]: [`Memory`], [`Scope`], [`Confidence`], [`MemoryStatus`].
//! - [`edge`]: [`Edge`], [`EdgeType`], [`NodeKind`], [`pair_hash`].
//! - [`conflict`]: [`Conflict`], [`ConflictCandidate`], [`ResolutionRequest`].
//! - [`proposal`]: [`WriteProposal`], [`ProposalStatus`].
//! - [`task`]: [`Task`], [`TaskEvent`], [`AggregateStatus`].
//! - [`message`]: [`Message`], [`MessagePriority`], [`DeliveryStatus`].
//! - [`selfmod`]: [`ModificationProposal`], [`CodeChange`], [`RiskLevel`].
//! - [`session`]: [`Session`], [`AgentState`].
//! - [`registry`]: [`AgentDefinition`], [`SkillDefinition`], [`ToolDefinition`].
//! - [`retrieval`]: [`RetrievalResult`], [`AssembledContext`].
//! - [`error`]: [`AgentOsError`], the shared error taxonomy.

pub mod conflict;
pub mod edge;
pub mod error;
pub mod memory;
pub mod message;
pub mod proposal;
pub mod registry;
pub mod retrieval;
pub mod selfmod;
pub mod session;
pub mod task;

pub use conflict::{
    Conflict, ConflictCandidate, ConflictScan, ConflictStatus, ConflictType, DetectionMethod,
    MemoryRole, ResolutionAction, ResolutionLogEntry, ResolutionRequest,
};
pub use edge::{pair_hash, sorted_pair, Edge, EdgeType, NodeKind};
pub use error::{AgentOsError, ErrorEnvelope, ErrorKind};
pub use memory::{next_memory_id, Confidence, Embedding, Memory, MemoryStatus, Scope, MAX_MEMORY_TOKENS};
pub use message::{DeliveryStatus, Message, MessagePriority, MessageType, Recipient};
pub use proposal::{
    ProposalStatus, ProposalType, ReviewLogEntry, WriteProposal, DEFAULT_MAX_RETRIES,
};
pub use registry::{
    AgentConstraints, AgentDefinition, Availability, BehaviorConfig, MemoryConfig, SearchHit,
    SkillDefinition, SkillsConfig, Tone, ToolDefinition, ToolKind, ToolsConfig,
};
pub use retrieval::{
    AssembledContext, ConnectionTrace, ContextFormat, ContradictionWarning, RetrievalResult,
};
pub use selfmod::{
    assess_risk, touches_core_module, ChangeType, CodeChange, ModProposalStatus,
    ModificationProposal, ReviewResult, ReviewVerdict, RiskLevel,
};
pub use session::{AgentRuntimeStatus, AgentState, Session};
pub use task::{
    event_for_transition, AggregateStatus, Task, TaskConstraints, TaskEvent, TaskEventType,
    TaskKind, TaskPriority, TaskStatus,
};
