//! Property Listing Extraction Library
//!
//! The pure data layer of the onboarding pipeline: the node taxonomy, the
//! extractor seam for LLM providers, per-node validation, and the
//! deterministic merger that folds node outputs into one listing record.
//!
//! No I/O happens here. Providers implement [`Extractor`]; the orchestrator
//! crate owns scheduling, retries, and state.
//!
//! # Usage
//!
//! ```rust,ignore
//! use extraction::{merge_nodes, validate_node, NodeType};
//! use extraction::testing::MockExtractor;
//!
//! let report = validate_node(NodeType::BasicInfo, &payload);
//! let outcome = merge_nodes(&outputs, &fanout);
//! ```
//!
//! # Modules
//!
//! - [`types`] - Node taxonomy, error categories, extraction context
//! - [`extractor`] - The `Extractor` trait seam
//! - [`validation`] - Per-node shape checks and completeness scoring
//! - [`merge`] - Deterministic merging and quality scoring
//! - [`testing`] - Mock implementations for tests

pub mod error;
pub mod extractor;
pub mod merge;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export core types at crate root
pub use error::{ExtractorError, Result};
pub use extractor::Extractor;
pub use merge::{config_name, merge_nodes, normalize_config_key, MergeOutcome, CONFLICT_FIELDS};
pub use types::{ErrorCategory, ExtractionContext, NodeOutcome, NodeType};
pub use validation::{completeness, validate_node, ValidationReport};

// Re-export testing utilities
pub use testing::{MockCall, MockExtractor, ScriptedFailure};
