//! Parse orchestration and background processing
//!
//! Synchronous parses go straight through [`ParseService`]. Queued parses go
//! through [`JobQueue`], whose worker hands each file to the
//! [`ExecutionBridge`] and stores the outcome via the [`ParsingJobManager`].

mod bridge;
mod job_queue;
mod manager;
mod orchestrator;

pub use bridge::{BridgeReply, BridgeRequest, ExecutionBridge};
pub use job_queue::JobQueue;
pub use manager::ParsingJobManager;
pub use orchestrator::ParseService;
