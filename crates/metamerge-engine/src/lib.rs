//! Structural merge engine for metadata fragments.
//!
//! Independent pipelines each describe part of the same acquisition session.
//! The engine folds their documents into one, walking both trees field by
//! field and applying domain rules (timestamp windows, list union,
//! total/unit pairing, null-coalescing). Disagreements no rule can settle go
//! to a pluggable [`ConflictResolver`]. Every non-trivial choice is recorded
//! as a [`MergeDecision`] so the result can be audited.
//!
//! # Quick Start
//!
//! ```rust
//! use metamerge_engine::{DecisionReason, MergeEngine};
//! use metamerge_types::MetadataDocument;
//!
//! let fib = MetadataDocument::from_json_str(
//!     r#"{"session_start_time": "2024-01-01T10:05:00Z", "data_streams": ["fib"]}"#,
//! ).unwrap();
//! let behavior = MetadataDocument::from_json_str(
//!     r#"{"session_start_time": "2024-01-01T10:00:00Z", "data_streams": ["behavior"]}"#,
//! ).unwrap();
//!
//! let result = MergeEngine::default()
//!     .merge(&fib, &behavior, "fib.json", "behavior.json")
//!     .unwrap();
//! let start = result.decision_for("session_start_time").unwrap();
//! assert_eq!(start.reason, DecisionReason::TimestampEarlier);
//! ```

pub mod config;
pub mod context;
pub mod decision;
pub mod engine;
pub mod error;
mod field;
pub mod list;
pub mod resolver;
pub mod timestamp;
mod unit;

// Re-exports for convenience.
pub use config::{MergeConfig, ResolverKind, StreamRuleConfig};
pub use context::{MergeContext, StreamRule, UnitQuantityPair};
pub use decision::{DecisionReason, MergeDecision, MergeResult};
pub use engine::MergeEngine;
pub use error::MergeError;
pub use list::ListMerger;
pub use resolver::{
    Conflict, ConflictKind, ConflictResolver, InteractiveResolver, JoinResolver, PreferResolver,
    Side, StrictResolver,
};
pub use timestamp::{format_time_difference, parse_timestamp, time_difference, TimestampMerger};
