//! Core types for the extraction pipeline: the node taxonomy, error
//! categories, and the context handed to extractors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ExtractorError;

/// The four extraction nodes that make up a listing job.
///
/// `TenancyInfo` depends on `BasicInfo` and `RoomConfigs`; the other three
/// are independent of each other.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    BasicInfo,
    Description,
    RoomConfigs,
    TenancyInfo,
}

impl NodeType {
    /// All nodes in scheduling priority order.
    pub const ALL: [NodeType; 4] = [
        NodeType::BasicInfo,
        NodeType::Description,
        NodeType::RoomConfigs,
        NodeType::TenancyInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::BasicInfo => "basic_info",
            NodeType::Description => "description",
            NodeType::RoomConfigs => "room_configs",
            NodeType::TenancyInfo => "tenancy_info",
        }
    }

    /// Human-readable label used in progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::BasicInfo => "Basic Info & Location",
            NodeType::Description => "Property Description",
            NodeType::RoomConfigs => "Room Configurations",
            NodeType::TenancyInfo => "Tenancy Information",
        }
    }

    /// Nodes whose output this node consumes.
    pub fn dependencies(&self) -> &'static [NodeType] {
        match self {
            NodeType::TenancyInfo => &[NodeType::BasicInfo, NodeType::RoomConfigs],
            _ => &[],
        }
    }

    /// Contribution of this node to overall job progress.
    pub fn weight(&self) -> f64 {
        0.25
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ExtractorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic_info" => Ok(NodeType::BasicInfo),
            "description" => Ok(NodeType::Description),
            "room_configs" => Ok(NodeType::RoomConfigs),
            "tenancy_info" => Ok(NodeType::TenancyInfo),
            other => Err(ExtractorError::UnknownNode(other.to_string())),
        }
    }
}

/// Retry category assigned to a node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    RateLimit,
    JsonParse,
    Network,
    Unknown,
}

impl ErrorCategory {
    /// Classify a free-text error message by keyword.
    ///
    /// Order matters: timeouts are checked before rate limits so that a
    /// "request timed out waiting for rate limiter" counts as a timeout.
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();

        if message.contains("timeout") || message.contains("timed out") {
            return ErrorCategory::Timeout;
        }

        if message.contains("rate limit") || message.contains("429") {
            return ErrorCategory::RateLimit;
        }

        if message.contains("json")
            && (message.contains("parse")
                || message.contains("unterminated")
                || message.contains("invalid"))
        {
            return ErrorCategory::JsonParse;
        }

        if message.contains("connection") || message.contains("network") {
            return ErrorCategory::Network;
        }

        ErrorCategory::Unknown
    }

    /// Whether a failure in this category should be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::JsonParse => "json_parse",
            ErrorCategory::Network => "network",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context passed to an extractor for a single node run.
///
/// For fanned-out tenancy extraction, `target_configuration` narrows the
/// request to one room configuration.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    /// Owning job, when run inside the orchestrator
    pub job_id: Option<Uuid>,

    /// Outputs of already-completed dependency nodes
    pub dependencies: BTreeMap<NodeType, Value>,

    /// The single configuration a fanned-out tenancy task targets
    pub target_configuration: Option<Value>,

    /// Display name of the target configuration
    pub configuration_name: Option<String>,

    /// Position of the target configuration in the fan-out batch
    pub configuration_index: Option<usize>,
}

impl ExtractionContext {
    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            job_id: Some(job_id),
            ..Default::default()
        }
    }

    pub fn is_fanout(&self) -> bool {
        self.target_configuration.is_some()
    }
}

/// The terminal result of running one node, as recorded by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node_type: NodeType,
    pub data: Option<Value>,
    pub confidence_score: Option<f64>,
    pub execution_time: Option<f64>,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub retry_count: u32,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}
