//! Extractor trait for LLM-backed node extraction.
//!
//! Implementations wrap specific LLM providers and handle the specifics of
//! prompting and response parsing. The orchestrator only sees this seam, so
//! crawling, prompt templates, and provider SDKs stay out of the core.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{ExtractionContext, NodeType};

/// Extraction seam between the orchestrator and an LLM provider.
///
/// One call extracts one node from one listing URL. For fanned-out tenancy
/// extraction the context carries the target room configuration; providers
/// should scope the extraction to that configuration.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract structured data for `node` from the listing at `url`.
    ///
    /// The returned value is opaque JSON in the node's schema. Dependency
    /// outputs (for `tenancy_info`) arrive via `ctx.dependencies`.
    async fn extract(&self, url: &str, node: NodeType, ctx: &ExtractionContext) -> Result<Value>;
}
