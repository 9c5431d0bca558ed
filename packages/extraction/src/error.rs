//! Typed errors for the extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on failure modes and map them to retry categories.

use thiserror::Error;

use crate::types::ErrorCategory;

/// Errors that can occur while extracting a node from a listing.
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// Extraction exceeded its time budget
    #[error("extraction timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Provider rate limit hit
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    /// Network-level failure reaching the provider
    #[error("network error: {0}")]
    Network(String),

    /// Provider returned malformed JSON
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Free-text provider error, classified by keyword as a fallback
    #[error("provider error: {0}")]
    Provider(String),

    /// Unknown node type name
    #[error("unknown node type: {0}")]
    UnknownNode(String),
}

impl ExtractorError {
    /// Map this error to its retry category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::JsonParse(_) => ErrorCategory::JsonParse,
            Self::Provider(message) => ErrorCategory::classify(message),
            Self::UnknownNode(_) => ErrorCategory::Unknown,
        }
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractorError>;
