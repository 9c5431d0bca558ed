//! Orchestrator configuration.

use std::time::Duration;

/// Tuning knobs for the queue, workers, and engine.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Number of worker tasks pulling jobs from the queue
    pub max_concurrent_jobs: usize,

    /// Concurrent node extractions per job (parallel strategy)
    pub max_concurrent_nodes: usize,

    /// Concurrent fanned-out tenancy extractions per job
    pub max_concurrent_fanout: usize,

    /// Time budget for a single node extraction attempt
    pub node_timeout: Duration,

    /// Node-level retry attempts beyond the first
    pub node_max_retries: u32,

    /// Base delay for node-level linear backoff (`delay * attempt`)
    pub node_retry_delay: Duration,

    /// Base delay for job-level exponential backoff
    pub job_retry_base: Duration,

    /// Cap on the job-level backoff delay
    pub job_retry_cap: Duration,

    /// Maximum queued jobs before enqueue is refused
    pub queue_capacity: usize,

    /// How often idle workers poll the queue
    pub poll_interval: Duration,

    /// Progress events kept per job
    pub event_retention: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_concurrent_nodes: 4,
            max_concurrent_fanout: 3,
            node_timeout: Duration::from_secs(300),
            node_max_retries: 3,
            node_retry_delay: Duration::from_secs(2),
            job_retry_base: Duration::from_secs(60),
            job_retry_cap: Duration::from_secs(3600),
            queue_capacity: 100,
            poll_interval: Duration::from_millis(100),
            event_retention: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Fast timings for tests: millisecond backoffs and polls.
    pub fn for_tests() -> Self {
        Self {
            node_timeout: Duration::from_secs(5),
            node_retry_delay: Duration::from_millis(5),
            job_retry_base: Duration::from_millis(10),
            job_retry_cap: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }
}
