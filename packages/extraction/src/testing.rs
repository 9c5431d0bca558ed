//! Testing utilities including mock implementations.
//!
//! `MockExtractor` lets orchestration tests script per-node responses and
//! failure sequences without making real LLM calls.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{ExtractorError, Result};
use crate::extractor::Extractor;
use crate::merge::normalize_config_key;
use crate::types::{ExtractionContext, NodeType};

/// A scripted failure mode for the mock extractor.
#[derive(Debug, Clone)]
pub enum ScriptedFailure {
    Timeout,
    RateLimited,
    Network,
    JsonParse,
    Provider(String),
}

impl ScriptedFailure {
    fn to_error(&self) -> ExtractorError {
        match self {
            ScriptedFailure::Timeout => ExtractorError::Timeout { seconds: 30 },
            ScriptedFailure::RateLimited => {
                ExtractorError::RateLimited("429 too many requests".to_string())
            }
            ScriptedFailure::Network => {
                ExtractorError::Network("connection refused".to_string())
            }
            ScriptedFailure::JsonParse => {
                ExtractorError::JsonParse("unterminated string".to_string())
            }
            ScriptedFailure::Provider(message) => ExtractorError::Provider(message.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct FailurePlan {
    failure: ScriptedFailure,
    /// Remaining failures before the node starts succeeding.
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// Record of a call made to the mock extractor.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub node: NodeType,
    pub configuration_name: Option<String>,
    pub dependency_count: usize,
}

/// A mock extractor with deterministic, configurable responses.
#[derive(Default)]
pub struct MockExtractor {
    responses: RwLock<HashMap<NodeType, Value>>,
    fanout_responses: RwLock<HashMap<String, Value>>,
    failures: RwLock<HashMap<NodeType, FailurePlan>>,
    latency: Option<Duration>,
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for a node type.
    pub fn with_response(self, node: NodeType, response: Value) -> Self {
        self.responses.write().unwrap().insert(node, response);
        self
    }

    /// Script a response for a fanned-out tenancy extraction, keyed by
    /// configuration name (normalized internally).
    pub fn with_fanout_response(self, config_name: impl AsRef<str>, response: Value) -> Self {
        self.fanout_responses
            .write()
            .unwrap()
            .insert(normalize_config_key(config_name.as_ref()), response);
        self
    }

    /// Make a node fail on every call.
    pub fn with_failure(self, node: NodeType, failure: ScriptedFailure) -> Self {
        self.failures.write().unwrap().insert(
            node,
            FailurePlan {
                failure,
                remaining: None,
            },
        );
        self
    }

    /// Make a node fail `count` times, then succeed with its scripted
    /// response.
    pub fn with_failures_then_success(
        self,
        node: NodeType,
        failure: ScriptedFailure,
        count: u32,
    ) -> Self {
        self.failures.write().unwrap().insert(
            node,
            FailurePlan {
                failure,
                remaining: Some(count),
            },
        );
        self
    }

    /// Add artificial latency to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of calls made for a node type.
    pub fn call_count(&self, node: NodeType) -> usize {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.node == node)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn take_failure(&self, node: NodeType) -> Option<ExtractorError> {
        let mut failures = self.failures.write().unwrap();
        let plan = failures.get_mut(&node)?;
        match &mut plan.remaining {
            None => Some(plan.failure.to_error()),
            Some(0) => None,
            Some(remaining) => {
                *remaining -= 1;
                Some(plan.failure.to_error())
            }
        }
    }

    fn default_response(node: NodeType) -> Value {
        match node {
            NodeType::BasicInfo => json!({
                "basic_info": {"name": "Mock Property"},
                "location": {"city": "Mockton"}
            }),
            NodeType::Description => json!({
                "description": {"summary": "A mock property."}
            }),
            NodeType::RoomConfigs => json!({ "configurations": [] }),
            NodeType::TenancyInfo => json!({
                "property_level": {"name": "Mock Property"}
            }),
        }
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, url: &str, node: NodeType, ctx: &ExtractionContext) -> Result<Value> {
        self.calls.write().unwrap().push(MockCall {
            url: url.to_string(),
            node,
            configuration_name: ctx.configuration_name.clone(),
            dependency_count: ctx.dependencies.len(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.take_failure(node) {
            return Err(error);
        }

        if ctx.is_fanout() {
            if let Some(name) = &ctx.configuration_name {
                let key = normalize_config_key(name);
                if let Some(response) = self.fanout_responses.read().unwrap().get(&key) {
                    return Ok(response.clone());
                }
            }
        }

        let scripted = self.responses.read().unwrap().get(&node).cloned();
        Ok(scripted.unwrap_or_else(|| Self::default_response(node)))
    }
}
