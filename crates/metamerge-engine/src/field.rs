//! Single-field dispatch.
//!
//! Rules are tried in a fixed order: equality, null-coalescing, unit pairs,
//! timestamps, lists, nested maps, the empty-string fallback, and finally the
//! conflict resolver. The first rule that applies decides the field.

use tracing::{debug, warn};

use metamerge_types::{DocumentValue, MetadataDocument};

use crate::decision::{DecisionReason, MergeDecision, Resolution};
use crate::engine::MergeEngine;
use crate::error::MergeError;
use crate::list::{coalesce_streams, ListMerger};
use crate::resolver::{Conflict, ConflictKind};
use crate::timestamp::TimestampMerger;
use crate::unit;

/// The merged value of one field plus every decision made on the way.
pub(crate) struct FieldOutcome {
    pub value: DocumentValue,
    pub decisions: Vec<MergeDecision>,
}

/// Merges fields that appear in both maps of one nesting level.
pub(crate) struct FieldMerger<'a> {
    engine: &'a MergeEngine,
    source1: &'a str,
    source2: &'a str,
    parent1: &'a MetadataDocument,
    parent2: &'a MetadataDocument,
}

impl<'a> FieldMerger<'a> {
    pub fn new(
        engine: &'a MergeEngine,
        (parent1, source1): (&'a MetadataDocument, &'a str),
        (parent2, source2): (&'a MetadataDocument, &'a str),
    ) -> Self {
        Self {
            engine,
            source1,
            source2,
            parent1,
            parent2,
        }
    }

    pub fn merge(
        &self,
        path: &str,
        key: &str,
        v1: &DocumentValue,
        v2: &DocumentValue,
    ) -> Result<FieldOutcome, MergeError> {
        if v1 == v2 {
            return Ok(self.leaf(path, Resolution::new(v1.clone(), DecisionReason::Identical)));
        }
        if v1.is_null() {
            return Ok(self.leaf(path, Resolution::new(v2.clone(), DecisionReason::NullCoalesced)));
        }
        if v2.is_null() {
            return Ok(self.leaf(path, Resolution::new(v1.clone(), DecisionReason::NullCoalesced)));
        }

        let context = self.engine.context();
        if let Some(pair) = context.unit_pair_for_unit(key) {
            if let Some(resolution) = unit::follow_total(pair, self.parent1, self.parent2) {
                return Ok(self.leaf(path, resolution));
            }
        }

        match (v1, v2) {
            (DocumentValue::String(a), DocumentValue::String(b))
                if context.is_timestamp_field(key) && TimestampMerger::parse_pair(a, b).is_some() =>
            {
                self.merge_timestamps(path, key, (v1, a.as_str()), (v2, b.as_str()))
            }
            (DocumentValue::List(a), DocumentValue::List(b)) => self.merge_lists(path, key, a, b),
            (DocumentValue::Map(a), DocumentValue::Map(b)) => {
                let nested = self
                    .engine
                    .merge_at(path, a, b, self.source1, self.source2)?;
                Ok(FieldOutcome {
                    value: DocumentValue::Map(nested.document),
                    decisions: nested.decisions,
                })
            }
            (DocumentValue::String(a), DocumentValue::String(b)) if a.is_empty() != b.is_empty() => {
                let kept = if a.is_empty() { v2 } else { v1 };
                let resolution = Resolution::new(kept.clone(), DecisionReason::ResolverChoice)
                    .with_note("empty-string fallback");
                Ok(self.leaf(path, resolution))
            }
            _ => self.resolve(path, v1, v2, self.conflict_kind(key, v1, v2)),
        }
    }

    fn merge_timestamps(
        &self,
        path: &str,
        key: &str,
        (v1, a): (&DocumentValue, &str),
        (v2, b): (&DocumentValue, &str),
    ) -> Result<FieldOutcome, MergeError> {
        match self
            .engine
            .timestamps()
            .merge(path, key, (a, self.source1), (b, self.source2))
        {
            Ok(resolution) => Ok(self.leaf(path, resolution)),
            Err(err @ MergeError::ToleranceExceeded { .. })
                if self.engine.context().escalate_tolerance =>
            {
                warn!(%err, "escalating timestamp conflict to the resolver");
                self.resolve(path, v1, v2, ConflictKind::ToleranceExceeded)
            }
            Err(err) => Err(err),
        }
    }

    fn merge_lists(
        &self,
        path: &str,
        key: &str,
        a: &[DocumentValue],
        b: &[DocumentValue],
    ) -> Result<FieldOutcome, MergeError> {
        let (combined, reason) = ListMerger.merge(a, b);

        let rule = match self.engine.context().stream_rule_for(key) {
            Some(rule) if reason == DecisionReason::ListConcat => rule,
            _ => return Ok(self.leaf(path, Resolution::new(DocumentValue::List(combined), reason))),
        };

        let coalesced = coalesce_streams(self.engine, rule, path, combined, self.source1, self.source2)?;
        let value = DocumentValue::List(coalesced.streams);
        if coalesced.merges == 0 {
            return Ok(self.leaf(path, Resolution::new(value, DecisionReason::ListConcat)));
        }

        let note = format!("{} stream pair(s) merged", coalesced.merges);
        let mut outcome = self.leaf(
            path,
            Resolution::new(value, DecisionReason::StreamsCoalesced).with_note(note),
        );
        let mut decisions = coalesced.decisions;
        decisions.append(&mut outcome.decisions);
        outcome.decisions = decisions;
        Ok(outcome)
    }

    fn resolve(
        &self,
        path: &str,
        v1: &DocumentValue,
        v2: &DocumentValue,
        kind: ConflictKind,
    ) -> Result<FieldOutcome, MergeError> {
        let resolver = &self.engine.context().resolver;
        let conflict = Conflict {
            field_path: path,
            value1: v1,
            source1: self.source1,
            value2: v2,
            source2: self.source2,
            kind,
        };

        let value = resolver.resolve(&conflict)?;
        let note = format!("{} resolver settled {kind}", resolver.name());
        Ok(self.leaf(path, Resolution::new(value, DecisionReason::ResolverChoice).with_note(note)))
    }

    fn conflict_kind(&self, key: &str, v1: &DocumentValue, v2: &DocumentValue) -> ConflictKind {
        let context = self.engine.context();
        if v1.kind() != v2.kind() {
            ConflictKind::TypeMismatch
        } else if context.unit_pair_for_total(key).is_some() || context.unit_pair_for_unit(key).is_some() {
            ConflictKind::QuantityDisagreement
        } else {
            ConflictKind::ScalarDisagreement
        }
    }

    fn leaf(&self, path: &str, resolution: Resolution) -> FieldOutcome {
        let value = resolution.value.clone();
        let decision = resolution.into_decision(path, self.source1, self.source2);
        debug!(field = %path, reason = %decision.reason, "field merged");
        FieldOutcome {
            value,
            decisions: vec![decision],
        }
    }
}
