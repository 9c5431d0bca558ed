//! Submission facade wiring the store, queue, engine, and workers together.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

use extraction::Extractor;

use crate::config::OrchestratorConfig;
use crate::engine::Engine;
use crate::jobs::events::JobEvent;
use crate::jobs::job::{ExecutionStrategy, Job, JobPriority};
use crate::jobs::queue::JobQueue;
use crate::jobs::store::{MemoryStore, QueueStats};
use crate::jobs::worker::WorkerPool;
use crate::progress::JobProgress;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid listing URL: {0}")]
    InvalidUrl(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("queue is at capacity")]
    QueueFull,
}

/// A request to onboard one listing URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    pub url: String,

    /// Priority name (`urgent`, `high`, `normal`, `low`)
    #[serde(default)]
    pub priority: Option<String>,

    /// Strategy name (`sequential`, `parallel`, `hybrid`)
    #[serde(default)]
    pub strategy: Option<String>,

    /// Defer execution until this time
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl SubmitRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// The onboarding service: accepts listing URLs and runs them through
/// extraction, fan-out, and merge on a background worker pool.
pub struct Onboarding<E: Extractor + 'static> {
    store: Arc<MemoryStore>,
    queue: Arc<JobQueue>,
    pool: Option<WorkerPool<E>>,
}

impl<E: Extractor + 'static> Onboarding<E> {
    /// Build the service and start its workers.
    pub fn start(extractor: Arc<E>, config: OrchestratorConfig) -> Self {
        let store = Arc::new(MemoryStore::with_limits(
            config.queue_capacity,
            config.event_retention,
        ));
        let queue = Arc::new(JobQueue::new(store.clone(), config.clone()));
        let engine = Arc::new(Engine::new(extractor, store.clone(), config.clone()));
        let mut pool = WorkerPool::new(queue.clone(), engine, &config);
        pool.start();

        Self {
            store,
            queue,
            pool: Some(pool),
        }
    }

    /// Validate a request and queue the job. Returns the job id.
    pub fn submit(&self, request: SubmitRequest) -> Result<Uuid, SubmitError> {
        let url = validate_url(&request.url)?;

        let priority = match &request.priority {
            Some(raw) => raw
                .parse::<JobPriority>()
                .map_err(SubmitError::InvalidPriority)?,
            None => JobPriority::default(),
        };
        let strategy = match &request.strategy {
            Some(raw) => raw
                .parse::<ExecutionStrategy>()
                .map_err(SubmitError::InvalidStrategy)?,
            None => ExecutionStrategy::default(),
        };

        let mut job = Job::builder()
            .url(url)
            .priority(priority)
            .strategy(strategy)
            .max_retries(request.max_retries.unwrap_or(3))
            .build();
        job.scheduled_at = request.scheduled_at;

        let job_id = job.id;
        if !self.queue.enqueue(job) {
            return Err(SubmitError::QueueFull);
        }
        Ok(job_id)
    }

    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.store.job(job_id)
    }

    pub fn progress(&self, job_id: Uuid) -> Option<JobProgress> {
        JobProgress::snapshot(&self.store, job_id, 20)
    }

    pub fn cancel(&self, job_id: Uuid) -> bool {
        self.queue.cancel(job_id)
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.queue.subscribe()
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Stop the workers, letting in-flight jobs finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await?;
        }
        Ok(())
    }
}

fn validate_url(raw: &str) -> Result<String, SubmitError> {
    let parsed = Url::parse(raw).map_err(|_| SubmitError::InvalidUrl(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SubmitError::InvalidUrl(raw.to_string()));
    }
    let host_ok = parsed
        .host_str()
        .map(|host| host.contains('.'))
        .unwrap_or(false);
    if !host_ok {
        return Err(SubmitError::InvalidUrl(raw.to_string()));
    }
    Ok(raw.to_string())
}
