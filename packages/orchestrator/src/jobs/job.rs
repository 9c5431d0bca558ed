//! Job model for listing onboarding runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use extraction::NodeType;

/// Canonical phase labels recorded on jobs and progress events.
pub mod phases {
    pub const INITIALIZING: &str = "initializing";
    pub const EXTRACTING_DATA: &str = "extracting_data";
    pub const TENANCY_EXTRACTION: &str = "tenancy_extraction";
    pub const MERGING_DATA: &str = "merging_data";
    pub const COMPETITOR_ANALYSIS: &str = "competitor_analysis";
    pub const FINALIZING: &str = "finalizing";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Convert to integer for queue ordering (lower = higher priority)
    pub fn as_i16(&self) -> i16 {
        match self {
            JobPriority::Urgent => 0,
            JobPriority::High => 1,
            JobPriority::Normal => 2,
            JobPriority::Low => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Urgent => "urgent",
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }
}

impl fmt::Display for JobPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "urgent" => Ok(JobPriority::Urgent),
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// How the engine schedules the four extraction nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One node at a time, in dependency order
    Sequential,
    /// All nodes at once, bounded by the node semaphore
    Parallel,
    /// Independent nodes first, then dependent ones
    #[default]
    Hybrid,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel => "parallel",
            ExecutionStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            "hybrid" => Ok(ExecutionStrategy::Hybrid),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// Listing URL being onboarded
    pub url: String,

    // Policies
    #[builder(default)]
    pub priority: JobPriority,
    #[builder(default)]
    pub strategy: ExecutionStrategy,

    // Execution settings
    #[builder(default = 3)]
    pub max_retries: u32,
    #[builder(default = 0)]
    pub retry_count: u32,

    // State
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = 0.0)]
    pub progress_percentage: f64,
    #[builder(default = phases::INITIALIZING.to_string())]
    pub current_phase: String,

    // Results
    #[builder(default)]
    pub extracted_data: BTreeMap<NodeType, Value>,
    #[builder(default, setter(strip_option))]
    pub merged_data: Option<Value>,
    #[builder(default, setter(strip_option))]
    pub quality_score: Option<f64>,

    // Error tracking
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    // Worker assignment
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub execution_time: Option<f64>,
}

impl Job {
    /// Create an immediate job for a URL (convenience constructor)
    pub fn for_url(url: impl Into<String>) -> Self {
        Self::builder().url(url.into()).build()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this job is due, given its schedule.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.scheduled_at {
            None => true,
            Some(at) => at <= now,
        }
    }

    /// Reset this job for a retry attempt scheduled at `run_at`.
    pub fn prepare_retry(&mut self, run_at: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.retry_count += 1;
        self.scheduled_at = Some(run_at);
        self.started_at = None;
        self.completed_at = None;
        self.worker_id = None;
    }
}
