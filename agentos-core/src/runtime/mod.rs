//! Agent runtime: in-process messaging and task tracking,
//! a self-modification proposal lifecycle, and durable runtime state.

pub mod message_bus;
pub mod self_mod;
pub mod store;
pub mod task_store;
pub mod task_tracker;

pub use message_bus::{BusStats, MessageBus};
pub use self_mod::{ApplyError, ProposalManager};
pub use store::{AgentOsStore, MessageFilter};
pub use task_store::TaskStore;
pub use task_tracker::{Subscriber, TaskTracker};
