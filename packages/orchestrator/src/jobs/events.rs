//! Progress events and queue lifecycle events.
//!
//! `ProgressEvent` rows form the append-only per-job log served by the
//! progress view. `JobEvent` is the broadcast type queue subscribers receive
//! for lifecycle changes (completion, failure, cancellation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::job::JobPriority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    JobQueued,
    JobStarted,
    NodeStarted,
    NodeCompleted,
    NodeFailed,
    NodeRetrying,
    FanoutStarted,
    FanoutCompleted,
    MergeStarted,
    MergeCompleted,
    PhaseChanged,
    JobCompleted,
    JobFailed,
    JobRetrying,
    JobCancelled,
}

/// One row in a job's append-only progress log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: Uuid,
    pub job_id: Uuid,
    pub event_type: ProgressEventType,
    pub message: String,
    pub progress_percentage: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl ProgressEvent {
    pub fn new(
        job_id: Uuid,
        event_type: ProgressEventType,
        message: impl Into<String>,
        progress_percentage: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            event_type,
            message: message.into(),
            progress_percentage,
            timestamp: Utc::now(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Job lifecycle events broadcast to queue subscribers.
///
/// These represent facts about the job lifecycle, not commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// A job entered the queue.
    Queued { job_id: Uuid, priority: JobPriority },

    /// A worker claimed the job and started execution.
    Started { job_id: Uuid, worker_id: String },

    /// Job completed with a merged record.
    Completed {
        job_id: Uuid,
        quality_score: Option<f64>,
        duration_ms: u64,
    },

    /// Job execution failed.
    Failed {
        job_id: Uuid,
        error: String,
        attempt: u32,
        will_retry: bool,
    },

    /// Job was cancelled.
    Cancelled { job_id: Uuid },
}
