use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolver::{ConflictResolver, StrictResolver};

/// Default window within which two timestamps are considered the same event.
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(60 * 60);

/// Default window for coalescing stream entries.
pub const DEFAULT_STREAM_TOLERANCE: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// UnitQuantityPair
// ---------------------------------------------------------------------------

/// A quantity field and the sibling field holding its unit.
///
/// The unit is meaningless without a measured total, so when only one side
/// reports a total the unit follows that side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitQuantityPair {
    pub total: String,
    pub unit: String,
}

impl UnitQuantityPair {
    pub fn new(total: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            total: total.into(),
            unit: unit.into(),
        }
    }

    /// The reward volume pair recorded by behavior rigs.
    pub fn reward_consumed() -> Self {
        Self::new("reward_consumed_total", "reward_consumed_unit")
    }
}

// ---------------------------------------------------------------------------
// StreamRule
// ---------------------------------------------------------------------------

/// A list field whose map entries describe time-bounded data streams.
///
/// Entries whose start and end timestamps both agree within `tolerance` are
/// the same physical stream seen by two pipelines and get merged into one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRule {
    pub field: String,
    pub start_field: String,
    pub end_field: String,
    pub tolerance: Duration,
}

impl StreamRule {
    /// `data_streams` entries keyed by `stream_start_time` / `stream_end_time`.
    pub fn data_streams() -> Self {
        Self {
            field: "data_streams".into(),
            start_field: "stream_start_time".into(),
            end_field: "stream_end_time".into(),
            tolerance: DEFAULT_STREAM_TOLERANCE,
        }
    }
}

// ---------------------------------------------------------------------------
// MergeContext
// ---------------------------------------------------------------------------

/// Read-only settings shared by every field merge in a call.
///
/// The context holds no per-call state, so one context can drive any number
/// of merges, concurrently if its resolver allows it.
#[derive(Clone)]
pub struct MergeContext {
    /// Maximum divergence between two timestamps for the same field.
    pub timestamp_tolerance: Duration,
    /// Case-insensitive substring marking a field as a timestamp.
    pub timestamp_hint: String,
    /// When `true`, tolerance violations go to the resolver instead of failing.
    pub escalate_tolerance: bool,
    pub unit_pairs: Vec<UnitQuantityPair>,
    pub stream_rules: Vec<StreamRule>,
    pub resolver: Arc<dyn ConflictResolver>,
}

impl Default for MergeContext {
    fn default() -> Self {
        Self {
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            timestamp_hint: "time".into(),
            escalate_tolerance: false,
            unit_pairs: vec![UnitQuantityPair::reward_consumed()],
            stream_rules: Vec::new(),
            resolver: Arc::new(StrictResolver),
        }
    }
}

impl fmt::Debug for MergeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeContext")
            .field("timestamp_tolerance", &self.timestamp_tolerance)
            .field("timestamp_hint", &self.timestamp_hint)
            .field("escalate_tolerance", &self.escalate_tolerance)
            .field("unit_pairs", &self.unit_pairs)
            .field("stream_rules", &self.stream_rules)
            .field("resolver", &self.resolver.name())
            .finish()
    }
}

impl MergeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: impl ConflictResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_shared_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.timestamp_tolerance = tolerance;
        self
    }

    pub fn with_timestamp_hint(mut self, hint: impl Into<String>) -> Self {
        self.timestamp_hint = hint.into();
        self
    }

    /// Hand tolerance violations to the resolver for a manual override.
    pub fn escalating_tolerance(mut self) -> Self {
        self.escalate_tolerance = true;
        self
    }

    /// Register another total/unit pair. Duplicates are ignored.
    pub fn with_unit_pair(mut self, pair: UnitQuantityPair) -> Self {
        if !self.unit_pairs.contains(&pair) {
            self.unit_pairs.push(pair);
        }
        self
    }

    pub fn with_stream_rule(mut self, rule: StreamRule) -> Self {
        self.stream_rules.retain(|r| r.field != rule.field);
        self.stream_rules.push(rule);
        self
    }

    /// Returns `true` if `key` names a timestamp field.
    pub fn is_timestamp_field(&self, key: &str) -> bool {
        key.to_lowercase()
            .contains(&self.timestamp_hint.to_lowercase())
    }

    pub fn unit_pair_for_unit(&self, key: &str) -> Option<&UnitQuantityPair> {
        self.unit_pairs.iter().find(|p| p.unit == key)
    }

    pub fn unit_pair_for_total(&self, key: &str) -> Option<&UnitQuantityPair> {
        self.unit_pairs.iter().find(|p| p.total == key)
    }

    pub fn stream_rule_for(&self, key: &str) -> Option<&StreamRule> {
        self.stream_rules.iter().find(|r| r.field == key)
    }
}
