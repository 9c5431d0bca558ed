//! Read-side progress view assembled from the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use extraction::{ErrorCategory, NodeType};

use crate::jobs::events::ProgressEvent;
use crate::jobs::job::JobStatus;
use crate::jobs::node::{NodeExecution, NodeStatus};
use crate::jobs::store::MemoryStore;

/// Progress of a single node run, as exposed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct NodeProgress {
    pub node_type: NodeType,
    pub config_key: Option<String>,
    pub status: NodeStatus,
    pub execution_time: Option<f64>,
    pub confidence_score: Option<f64>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
}

impl From<NodeExecution> for NodeProgress {
    fn from(exec: NodeExecution) -> Self {
        Self {
            node_type: exec.node_type,
            config_key: exec.config_key,
            status: exec.status,
            execution_time: exec.execution_time,
            confidence_score: exec.confidence_score,
            retry_count: exec.retry_count,
            error_message: exec.error_message,
            error_category: exec.error_category,
        }
    }
}

/// A point-in-time snapshot of one job's progress.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub current_phase: String,
    pub overall_progress: f64,
    pub nodes_total: usize,
    pub nodes_completed: usize,
    pub nodes_failed: usize,
    pub retry_count: u32,
    pub quality_score: Option<f64>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub nodes: Vec<NodeProgress>,
    pub recent_events: Vec<ProgressEvent>,
}

impl JobProgress {
    /// Assemble a snapshot under a single store read.
    pub fn snapshot(store: &MemoryStore, job_id: Uuid, event_limit: usize) -> Option<Self> {
        let (job, nodes, events) = store.job_snapshot(job_id, event_limit)?;

        let nodes_completed = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Completed)
            .count();
        let nodes_failed = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Failed)
            .count();

        Some(Self {
            job_id: job.id,
            status: job.status,
            current_phase: job.current_phase,
            overall_progress: job.progress_percentage,
            nodes_total: nodes.len(),
            nodes_completed,
            nodes_failed,
            retry_count: job.retry_count,
            quality_score: job.quality_score,
            error_message: job.error_message,
            started_at: job.started_at,
            completed_at: job.completed_at,
            nodes: nodes.into_iter().map(NodeProgress::from).collect(),
            recent_events: events,
        })
    }
}
