//! The audit trail produced by a merge.

use std::fmt;

use serde::{Deserialize, Serialize};

use metamerge_types::{DocumentValue, MetadataDocument};

/// Why a field ended up with the value it has in the merged document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Both documents carried the same value.
    Identical,
    /// One side was null; the other side's value was kept.
    NullCoalesced,
    /// Start-like timestamp field: the earlier instant was kept.
    TimestampEarlier,
    /// End-like timestamp field: the later instant was kept.
    TimestampLater,
    /// Scalar lists were concatenated and deduplicated.
    ListDedup,
    /// Lists with composite elements were concatenated as-is.
    ListConcat,
    /// Stream maps with matching start/end times were merged pairwise.
    StreamsCoalesced,
    /// A unit field followed the side with a real quantity.
    UnitFollowsTotal,
    /// A fallback rule or the conflict resolver picked the value.
    ResolverChoice,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Identical => "identical",
            Self::NullCoalesced => "null coalesced",
            Self::TimestampEarlier => "earlier timestamp",
            Self::TimestampLater => "later timestamp",
            Self::ListDedup => "list dedup",
            Self::ListConcat => "list concat",
            Self::StreamsCoalesced => "streams coalesced",
            Self::UnitFollowsTotal => "unit follows total",
            Self::ResolverChoice => "resolver choice",
        };
        f.write_str(name)
    }
}

/// One entry in the merge audit log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeDecision {
    /// Dotted path of the field inside the merged document.
    pub field_path: String,
    /// The value written to the merged document.
    pub chosen_value: DocumentValue,
    pub reason: DecisionReason,
    /// Source names of the two documents that were reconciled.
    pub sources: (String, String),
    /// Free-form detail, e.g. which resolver answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl fmt::Display for MergeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} = {}", self.field_path, self.reason, self.chosen_value)?;
        if let Some(note) = &self.note {
            write!(f, " ({note})")?;
        }
        Ok(())
    }
}

/// A leaf rule's verdict before it is tied to a path and sources.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Resolution {
    pub value: DocumentValue,
    pub reason: DecisionReason,
    pub note: Option<String>,
}

impl Resolution {
    pub fn new(value: DocumentValue, reason: DecisionReason) -> Self {
        Self {
            value,
            reason,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn into_decision(self, field_path: &str, source1: &str, source2: &str) -> MergeDecision {
        MergeDecision {
            field_path: field_path.to_owned(),
            chosen_value: self.value,
            reason: self.reason,
            sources: (source1.to_owned(), source2.to_owned()),
            note: self.note,
        }
    }
}

/// The merged document together with every decision that shaped it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeResult {
    pub document: MetadataDocument,
    pub decisions: Vec<MergeDecision>,
}

impl MergeResult {
    /// Wrap a document that needed no reconciliation.
    pub fn unchanged(document: MetadataDocument) -> Self {
        Self {
            document,
            decisions: Vec::new(),
        }
    }

    /// The decision recorded for a dotted field path, if any.
    pub fn decision_for(&self, field_path: &str) -> Option<&MergeDecision> {
        self.decisions.iter().find(|d| d.field_path == field_path)
    }

    /// All decisions with the given reason, in the order they were made.
    pub fn decisions_with(&self, reason: DecisionReason) -> impl Iterator<Item = &MergeDecision> {
        self.decisions.iter().filter(move |d| d.reason == reason)
    }

    /// Decisions the resolver or a fallback rule had to make.
    pub fn resolver_choices(&self) -> impl Iterator<Item = &MergeDecision> {
        self.decisions_with(DecisionReason::ResolverChoice)
    }
}
