//! Error types for the merge engine.

use std::time::Duration;

use metamerge_types::{DocumentValue, TypeError};

use crate::timestamp::format_time_difference;

/// Errors that abort a merge.
///
/// Conflict variants carry the dotted field path, both source names and both
/// raw values so callers can report exactly what disagreed.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum MergeError {
    /// An input value has no document representation.
    #[error(transparent)]
    UnsupportedValue(#[from] TypeError),

    /// Two values of incompatible kinds with no applicable merge rule.
    #[error(
        "type mismatch at '{path}': {source1} has {} {value1}, {source2} has {} {value2}",
        .value1.kind(),
        .value2.kind()
    )]
    TypeMismatchConflict {
        path: String,
        source1: String,
        value1: DocumentValue,
        source2: String,
        value2: DocumentValue,
    },

    /// Two timestamps for the same field diverge beyond the tolerance window.
    #[error(
        "timestamps at '{path}' differ by {} (tolerance {}): {source1} has {value1}, {source2} has {value2}",
        human(.diff),
        human(.tolerance)
    )]
    ToleranceExceeded {
        path: String,
        source1: String,
        value1: String,
        source2: String,
        value2: String,
        diff: Duration,
        tolerance: Duration,
    },

    /// The conflict resolver declined or failed to produce a value.
    #[error("unresolved conflict at '{path}' ({reason}): {source1} has {value1}, {source2} has {value2}")]
    UnresolvedConflict {
        path: String,
        source1: String,
        value1: DocumentValue,
        source2: String,
        value2: DocumentValue,
        reason: String,
    },

    /// The caller passed inputs the engine cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MergeError {
    /// The dotted field path of a conflict, if this error is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::TypeMismatchConflict { path, .. }
            | Self::ToleranceExceeded { path, .. }
            | Self::UnresolvedConflict { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Returns `true` for errors caused by disagreeing field values.
    pub fn is_conflict(&self) -> bool {
        self.path().is_some()
    }
}

fn human(duration: &Duration) -> String {
    format_time_difference(*duration)
}
