pub mod agents;
pub mod conflicts;
pub mod graph;
pub mod proposals;
pub mod selfmod;
pub mod tasks;
pub mod usage;

use agentos_types::AgentOsError;

/// Every command handler returns this so `main` has one place to map to an exit code.
pub type CmdResult<T> = Result<T, AgentOsError>;
