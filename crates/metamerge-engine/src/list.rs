//! List reconciliation.
//!
//! Lists are concatenated with the first document's elements first. Scalar
//! lists are then deduplicated by first occurrence; lists holding maps are
//! left as-is because object equality across pipelines is not trusted.
//! Configured stream lists additionally coalesce entries that describe the
//! same time-bounded stream.

use tracing::info;

use metamerge_types::DocumentValue;

use crate::context::StreamRule;
use crate::decision::{DecisionReason, MergeDecision};
use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::timestamp::{parse_timestamp, time_difference};

/// Merges two lists with scalar-dedup or composite-concat semantics.
#[derive(Clone, Copy, Debug, Default)]
pub struct ListMerger;

impl ListMerger {
    /// Concatenate `list1` and `list2`, deduplicating when every element is
    /// a leaf or a nested list.
    pub fn merge(
        &self,
        list1: &[DocumentValue],
        list2: &[DocumentValue],
    ) -> (Vec<DocumentValue>, DecisionReason) {
        let combined = list1.iter().chain(list2);

        if list1.iter().chain(list2).any(|v| matches!(v, DocumentValue::Map(_))) {
            return (combined.cloned().collect(), DecisionReason::ListConcat);
        }

        let mut deduped: Vec<DocumentValue> = Vec::with_capacity(list1.len() + list2.len());
        for item in combined {
            if !deduped.contains(item) {
                deduped.push(item.clone());
            }
        }
        (deduped, DecisionReason::ListDedup)
    }
}

/// Result of coalescing a stream list.
pub(crate) struct Coalesced {
    pub streams: Vec<DocumentValue>,
    pub decisions: Vec<MergeDecision>,
    pub merges: usize,
}

/// Repeatedly merge the first pair of streams whose windows agree.
///
/// The merged stream is appended at the end and the search restarts, so
/// three overlapping fragments collapse into a single entry.
pub(crate) fn coalesce_streams(
    engine: &MergeEngine,
    rule: &StreamRule,
    path: &str,
    mut streams: Vec<DocumentValue>,
    source1: &str,
    source2: &str,
) -> Result<Coalesced, MergeError> {
    let mut decisions = Vec::new();
    let mut merges = 0;

    while let Some((i, j)) = find_mergeable_pair(rule, &streams) {
        let merged = match (streams[i].as_map(), streams[j].as_map()) {
            (Some(a), Some(b)) => {
                engine.merge_at(&format!("{path}[{i}+{j}]"), a, b, source1, source2)?
            }
            _ => break,
        };

        info!(
            field = %path,
            first = i,
            second = j,
            "merged two data streams with similar timing"
        );

        streams.remove(j);
        streams.remove(i);
        streams.push(DocumentValue::Map(merged.document));
        decisions.extend(merged.decisions);
        merges += 1;
    }

    Ok(Coalesced {
        streams,
        decisions,
        merges,
    })
}

fn find_mergeable_pair(rule: &StreamRule, streams: &[DocumentValue]) -> Option<(usize, usize)> {
    for i in 0..streams.len() {
        for j in (i + 1)..streams.len() {
            if should_coalesce(rule, &streams[i], &streams[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

fn should_coalesce(rule: &StreamRule, a: &DocumentValue, b: &DocumentValue) -> bool {
    let window = |stream: &DocumentValue| {
        let map = stream.as_map()?;
        let start = parse_timestamp(map.get(&rule.start_field)?.as_str()?)?;
        let end = parse_timestamp(map.get(&rule.end_field)?.as_str()?)?;
        Some((start, end))
    };

    match (window(a), window(b)) {
        (Some((start1, end1)), Some((start2, end2))) => {
            time_difference(&start1, &start2) <= rule.tolerance
                && time_difference(&end1, &end2) <= rule.tolerance
        }
        _ => false,
    }
}
