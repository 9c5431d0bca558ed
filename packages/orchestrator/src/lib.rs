//! Job orchestration for listing onboarding.
//!
//! This crate schedules the four extraction nodes for each submitted
//! listing URL, retries transient failures, fans tenancy extraction out per
//! room configuration, merges the results into one record, and tracks
//! progress throughout. The extraction semantics themselves live in the
//! `extraction` crate; this one owns jobs, queues, workers, and the engine.
//!
//! Typical usage:
//!
//! ```ignore
//! let service = Onboarding::start(extractor, OrchestratorConfig::default());
//! let job_id = service.submit(SubmitRequest::new("https://example.com/p"))?;
//! let progress = service.progress(job_id);
//! ```

pub mod config;
pub mod engine;
pub mod jobs;
pub mod progress;
pub mod submit;

pub use config::OrchestratorConfig;
pub use engine::{collect_configurations, Engine, EngineOutcome, FanoutTarget};
pub use jobs::{
    phases, ExecutionStrategy, Job, JobEvent, JobPriority, JobQueue, JobStatus, MemoryStore,
    NodeExecution, NodeStatus, ProgressEvent, ProgressEventType, QueueStats, WorkerPool,
};
pub use progress::{JobProgress, NodeProgress};
pub use submit::{Onboarding, SubmitError, SubmitRequest};
