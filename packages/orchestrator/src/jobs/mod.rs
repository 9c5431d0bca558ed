//! Job queue and worker infrastructure.
//!
//! - `job`: the job model, priorities, strategies, and phase labels
//! - `node`: per-node execution records
//! - `events`: progress log rows and broadcast lifecycle events
//! - `store`: the in-memory job/node/event store behind a single lock
//! - `queue`: lifecycle transitions, job-level retry, cancellation tokens
//! - `worker`: the polling worker pool

pub mod events;
pub mod job;
pub mod node;
pub mod queue;
pub mod store;
pub mod worker;

pub use events::{JobEvent, ProgressEvent, ProgressEventType};
pub use job::{phases, ExecutionStrategy, Job, JobPriority, JobStatus};
pub use node::{NodeExecution, NodeStatus};
pub use queue::JobQueue;
pub use store::{MemoryStore, QueueStats};
pub use worker::WorkerPool;
