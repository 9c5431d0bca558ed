//! Priority queue operations over the store.
//!
//! The queue owns job lifecycle transitions (queued, claimed, completed,
//! failed, cancelled), job-level retry with exponential backoff, and the
//! cancellation tokens handed to running jobs. Lifecycle changes are
//! broadcast to subscribers as [`JobEvent`]s.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;

use super::events::{JobEvent, ProgressEvent, ProgressEventType};
use super::job::{phases, Job, JobStatus};
use super::store::{MemoryStore, QueueStats};

pub struct JobQueue {
    store: Arc<MemoryStore>,
    config: OrchestratorConfig,
    events: broadcast::Sender<JobEvent>,
    tokens: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl JobQueue {
    pub fn new(store: Arc<MemoryStore>, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            config,
            events,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn stats(&self) -> QueueStats {
        self.store.stats()
    }

    /// Insert and queue a new job. Returns false when the job id already
    /// exists or the queue refuses it (at capacity).
    pub fn enqueue(&self, job: Job) -> bool {
        let job_id = job.id;
        let priority = job.priority;

        if !self.store.insert_job(job) {
            return false;
        }
        if !self.store.enqueue(job_id) {
            // do not leave a pending record that can never run
            self.store.remove_job(job_id);
            warn!(job_id = %job_id, "queue refused job");
            return false;
        }

        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::JobQueued,
            format!("Job queued with {priority} priority"),
            0.0,
        ));
        let _ = self.events.send(JobEvent::Queued { job_id, priority });
        info!(job_id = %job_id, priority = %priority, "job queued");
        true
    }

    /// Claim the next due job for a worker. The returned token cancels the
    /// run.
    pub fn claim(&self, worker_id: &str) -> Option<(Job, CancellationToken)> {
        let job = self.store.claim_next(worker_id)?;
        let token = CancellationToken::new();
        self.tokens.write().unwrap().insert(job.id, token.clone());
        let _ = self.events.send(JobEvent::Started {
            job_id: job.id,
            worker_id: worker_id.to_string(),
        });
        Some((job, token))
    }

    /// Record a successful run.
    pub fn mark_completed(&self, job_id: Uuid, merged_data: Option<Value>, quality_score: f64) {
        let now = Utc::now();
        self.store.update_job(job_id, |job| {
            job.status = JobStatus::Completed;
            job.completed_at = Some(now);
            job.execution_time = job
                .started_at
                .map(|s| (now - s).num_milliseconds() as f64 / 1000.0);
            job.merged_data = merged_data;
            job.quality_score = Some(quality_score);
        });
        self.store
            .update_progress(job_id, 100.0, Some(phases::COMPLETED));
        self.release(job_id);

        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::JobCompleted,
            "Job completed",
            100.0,
        ));
        let duration_ms = self
            .store
            .job(job_id)
            .and_then(|j| j.execution_time)
            .map(|s| (s * 1000.0) as u64)
            .unwrap_or(0);
        let _ = self.events.send(JobEvent::Completed {
            job_id,
            quality_score: Some(quality_score),
            duration_ms,
        });
        info!(job_id = %job_id, quality = quality_score, "job completed");
    }

    /// Record a failed run. Retries with exponential backoff while attempts
    /// remain; otherwise the job fails permanently. Returns whether a retry
    /// was scheduled.
    pub fn mark_failed(&self, job_id: Uuid, error: &str) -> bool {
        let Some(job) = self.store.job(job_id) else {
            return false;
        };
        self.release(job_id);

        let attempt = job.retry_count + 1;
        if job.retry_count < job.max_retries {
            // delay = base * 2^(n-1), capped
            let exponent = job.retry_count.min(16);
            let delay = self
                .config
                .job_retry_base
                .saturating_mul(1u32 << exponent)
                .min(self.config.job_retry_cap);
            let run_at = Utc::now()
                + chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(3600));

            self.store.update_job(job_id, |j| {
                j.prepare_retry(run_at);
                j.error_message = Some(error.to_string());
            });
            let requeued = self.store.enqueue(job_id);

            self.store.append_event(ProgressEvent::new(
                job_id,
                ProgressEventType::JobRetrying,
                format!("Job failed, scheduling retry {attempt} of {}", job.max_retries),
                job.progress_percentage,
            ));
            let _ = self.events.send(JobEvent::Failed {
                job_id,
                error: error.to_string(),
                attempt,
                will_retry: true,
            });
            warn!(
                job_id = %job_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error,
                "job failed, retry scheduled"
            );
            requeued
        } else {
            let now = Utc::now();
            self.store.update_job(job_id, |j| {
                j.status = JobStatus::Failed;
                j.current_phase = phases::FAILED.to_string();
                j.error_message = Some(error.to_string());
                j.quality_score = Some(0.0);
                j.completed_at = Some(now);
                j.execution_time = j
                    .started_at
                    .map(|s| (now - s).num_milliseconds() as f64 / 1000.0);
            });

            self.store.append_event(ProgressEvent::new(
                job_id,
                ProgressEventType::JobFailed,
                format!("Job failed permanently: {error}"),
                job.progress_percentage,
            ));
            let _ = self.events.send(JobEvent::Failed {
                job_id,
                error: error.to_string(),
                attempt,
                will_retry: false,
            });
            warn!(job_id = %job_id, error, "job failed permanently");
            false
        }
    }

    /// Record a cancelled run (called by the worker once the engine has
    /// observed the token).
    pub fn mark_cancelled(&self, job_id: Uuid) {
        self.release(job_id);
        let now = Utc::now();
        self.store.update_job(job_id, |j| {
            j.status = JobStatus::Cancelled;
            j.completed_at = Some(now);
        });
        self.store.append_event(ProgressEvent::new(
            job_id,
            ProgressEventType::JobCancelled,
            "Job cancelled",
            0.0,
        ));
        let _ = self.events.send(JobEvent::Cancelled { job_id });
        info!(job_id = %job_id, "job cancelled");
    }

    /// Cancel a job. Pending jobs leave the queue immediately; running jobs
    /// have their token fired and are marked cancelled by their worker.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        if self.store.remove_pending(job_id) {
            let now = Utc::now();
            self.store.update_job(job_id, |j| {
                j.status = JobStatus::Cancelled;
                j.completed_at = Some(now);
            });
            self.store.append_event(ProgressEvent::new(
                job_id,
                ProgressEventType::JobCancelled,
                "Job cancelled",
                0.0,
            ));
            let _ = self.events.send(JobEvent::Cancelled { job_id });
            info!(job_id = %job_id, "pending job cancelled");
            return true;
        }

        let token = self.tokens.read().unwrap().get(&job_id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                info!(job_id = %job_id, "running job cancellation requested");
                true
            }
            None => false,
        }
    }

    fn release(&self, job_id: Uuid) {
        self.store.finish(job_id);
        self.tokens.write().unwrap().remove(&job_id);
    }
}
