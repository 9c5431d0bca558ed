//! Per-node execution records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use extraction::{ErrorCategory, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

/// State of one node run within a job.
///
/// Fanned-out tenancy tasks get their own record with `config_key` set to
/// the normalized configuration name. Terminal records are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub node_type: NodeType,

    /// Normalized configuration key for fan-out tasks
    pub config_key: Option<String>,

    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_time: Option<f64>,

    pub extracted_data: Option<Value>,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub retry_count: u32,

    /// Validation completeness for the extracted payload
    pub confidence_score: Option<f64>,
    pub validation_errors: u32,
    pub validation_warnings: u32,
}

impl NodeExecution {
    pub fn new(job_id: Uuid, node_type: NodeType) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            node_type,
            config_key: None,
            status: NodeStatus::Pending,
            started_at: None,
            completed_at: None,
            execution_time: None,
            extracted_data: None,
            error_message: None,
            error_category: None,
            retry_count: 0,
            confidence_score: None,
            validation_errors: 0,
            validation_warnings: 0,
        }
    }

    /// Create a record for a fanned-out tenancy task.
    pub fn fanout(job_id: Uuid, config_key: impl Into<String>) -> Self {
        Self {
            config_key: Some(config_key.into()),
            ..Self::new(job_id, NodeType::TenancyInfo)
        }
    }

    pub fn is_fanout(&self) -> bool {
        self.config_key.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
