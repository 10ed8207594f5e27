use tracing::info;

use metamerge_types::MetadataDocument;

use crate::context::MergeContext;
use crate::decision::MergeResult;
use crate::error::MergeError;
use crate::field::FieldMerger;
use crate::timestamp::TimestampMerger;

// ---------------------------------------------------------------------------
// MergeEngine
// ---------------------------------------------------------------------------

/// Combines metadata fragments into one document.
///
/// The engine is pure: it never mutates its inputs, performs no I/O of its
/// own, and a failed merge returns no partial document. Any interaction
/// happens inside the configured resolver.
#[derive(Debug)]
pub struct MergeEngine {
    context: MergeContext,
    timestamps: TimestampMerger,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new(MergeContext::default())
    }
}

impl MergeEngine {
    pub fn new(context: MergeContext) -> Self {
        let timestamps = TimestampMerger::new(context.timestamp_tolerance);
        Self {
            context,
            timestamps,
        }
    }

    /// The active configuration.
    pub fn context(&self) -> &MergeContext {
        &self.context
    }

    pub(crate) fn timestamps(&self) -> &TimestampMerger {
        &self.timestamps
    }

    /// Merge two documents.
    ///
    /// Output keys are `doc1`'s keys in order followed by the keys only
    /// `doc2` has. Fields present on one side are copied without a decision;
    /// shared fields go through the field rules and record at least one.
    pub fn merge(
        &self,
        doc1: &MetadataDocument,
        doc2: &MetadataDocument,
        source1: &str,
        source2: &str,
    ) -> Result<MergeResult, MergeError> {
        let result = self.merge_at("", doc1, doc2, source1, source2)?;
        info!(
            source1,
            source2,
            fields = result.document.len(),
            decisions = result.decisions.len(),
            "merged documents"
        );
        Ok(result)
    }

    /// Merge any number of fragments by folding them pairwise, left to right.
    ///
    /// The accumulated side is named after every source merged so far,
    /// joined with `+`. A single document comes back unchanged.
    pub fn merge_many<S: AsRef<str>>(
        &self,
        docs: &[MetadataDocument],
        sources: &[S],
    ) -> Result<MergeResult, MergeError> {
        if docs.len() != sources.len() {
            return Err(MergeError::InvalidInput(format!(
                "{} documents but {} source names",
                docs.len(),
                sources.len()
            )));
        }
        let Some((first, rest)) = docs.split_first() else {
            return Err(MergeError::InvalidInput("no documents to merge".into()));
        };

        let mut merged = MergeResult::unchanged(first.clone());
        let mut merged_source = sources[0].as_ref().to_owned();

        for (doc, source) in rest.iter().zip(&sources[1..]) {
            let source = source.as_ref();
            let step = self.merge(&merged.document, doc, &merged_source, source)?;
            merged.document = step.document;
            merged.decisions.extend(step.decisions);
            merged_source = format!("{merged_source}+{source}");
        }

        Ok(merged)
    }

    /// Merge two maps that live at `prefix` inside the final document.
    pub(crate) fn merge_at(
        &self,
        prefix: &str,
        doc1: &MetadataDocument,
        doc2: &MetadataDocument,
        source1: &str,
        source2: &str,
    ) -> Result<MergeResult, MergeError> {
        let fields = FieldMerger::new(self, (doc1, source1), (doc2, source2));
        let mut document = MetadataDocument::with_capacity(doc1.len() + doc2.len());
        let mut decisions = Vec::new();

        for (key, v1) in doc1.iter() {
            let Some(v2) = doc2.get(key) else {
                document.insert(key, v1.clone());
                continue;
            };
            let outcome = fields.merge(&child_path(prefix, key), key, v1, v2)?;
            document.insert(key, outcome.value);
            decisions.extend(outcome.decisions);
        }

        for (key, v2) in doc2.iter() {
            if !doc1.contains_key(key) {
                document.insert(key, v2.clone());
            }
        }

        Ok(MergeResult {
            document,
            decisions,
        })
    }
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use metamerge_types::DocumentValue;
    use serde_json::json;

    use crate::context::{StreamRule, UnitQuantityPair};
    use crate::decision::DecisionReason;
    use crate::resolver::{JoinResolver, PreferResolver};

    fn doc(value: serde_json::Value) -> MetadataDocument {
        MetadataDocument::try_from(value).unwrap()
    }

    fn merge(a: serde_json::Value, b: serde_json::Value) -> Result<MergeResult, MergeError> {
        MergeEngine::default().merge(&doc(a), &doc(b), "a.json", "b.json")
    }

    fn keys(d: &MetadataDocument) -> Vec<&str> {
        d.keys().collect()
    }

    #[test]
    fn key_order_is_first_then_second_only() {
        let result = merge(json!({"b": 1, "a": 2}), json!({"c": 3, "a": 2, "d": 4})).unwrap();
        assert_eq!(keys(&result.document), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn one_sided_fields_pass_through_without_decisions() {
        let result = merge(json!({"subject_id": "123"}), json!({"rig_id": "fib-1"})).unwrap();
        assert_eq!(result.document, doc(json!({"subject_id": "123", "rig_id": "fib-1"})));
        assert!(result.decisions.is_empty());
    }

    #[test]
    fn merging_a_document_with_itself_is_identity() {
        let d = doc(json!({
            "session_start_time": "2024-01-01T10:00:00Z",
            "data_streams": [{"id": 1}],
            "reward_consumed_total": null,
            "mouse_platform": {"name": "wheel"}
        }));
        let engine = MergeEngine::default();
        let result = engine.merge(&d, &d, "a", "a").unwrap();
        assert_eq!(result.document, d);
        assert_eq!(result.decisions.len(), 4);
        assert!(result.decisions.iter().all(|x| x.reason == DecisionReason::Identical));
    }

    #[test]
    fn null_in_either_document_is_filled() {
        let result = merge(json!({"notes": null, "iacuc": "2115"}), json!({"notes": "ok", "iacuc": null})).unwrap();
        assert_eq!(result.document, doc(json!({"notes": "ok", "iacuc": "2115"})));
        assert_eq!(result.decisions_with(DecisionReason::NullCoalesced).count(), 2);
    }

    #[test]
    fn start_and_end_times_widen_the_window() {
        let result = merge(
            json!({"stream_start_time": "2024-01-01T10:00:00Z", "stream_end_time": "2024-01-01T11:00:00Z"}),
            json!({"stream_start_time": "2024-01-01T10:05:00Z", "stream_end_time": "2024-01-01T11:05:00Z"}),
        )
        .unwrap();
        assert_eq!(result.document.get("stream_start_time"), Some(&DocumentValue::from("2024-01-01T10:00:00Z")));
        assert_eq!(result.document.get("stream_end_time"), Some(&DocumentValue::from("2024-01-01T11:05:00Z")));
        assert_eq!(result.decision_for("stream_start_time").unwrap().reason, DecisionReason::TimestampEarlier);
        assert_eq!(result.decision_for("stream_end_time").unwrap().reason, DecisionReason::TimestampLater);
    }

    #[test]
    fn tolerance_violation_aborts_the_merge() {
        let err = merge(
            json!({"session_start_time": "2024-01-01T10:00:00Z"}),
            json!({"session_start_time": "2024-01-01T12:00:00Z"}),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::ToleranceExceeded { .. }));
        assert_eq!(err.path(), Some("session_start_time"));
    }

    #[test]
    fn tolerance_violation_can_be_escalated() {
        let context = MergeContext::default()
            .escalating_tolerance()
            .with_resolver(PreferResolver::second());
        let result = MergeEngine::new(context)
            .merge(
                &doc(json!({"session_start_time": "2024-01-01T10:00:00Z"})),
                &doc(json!({"session_start_time": "2024-01-01T12:00:00Z"})),
                "a",
                "b",
            )
            .unwrap();
        let decision = result.decision_for("session_start_time").unwrap();
        assert_eq!(decision.chosen_value, DocumentValue::from("2024-01-01T12:00:00Z"));
        assert_eq!(decision.reason, DecisionReason::ResolverChoice);
        assert!(decision.note.as_deref().unwrap().contains("tolerance exceeded"));
    }

    #[test]
    fn wider_tolerance_accepts_larger_gaps() {
        let context = MergeContext::default().with_timestamp_tolerance(Duration::from_secs(3 * 3600));
        let result = MergeEngine::new(context)
            .merge(
                &doc(json!({"session_end_time": "2024-01-01T10:00:00Z"})),
                &doc(json!({"session_end_time": "2024-01-01T12:00:00Z"})),
                "a",
                "b",
            )
            .unwrap();
        assert_eq!(result.document.get("session_end_time"), Some(&DocumentValue::from("2024-01-01T12:00:00Z")));
    }

    #[test]
    fn unparseable_time_strings_use_the_string_rules() {
        let err = merge(json!({"session_time": "morning"}), json!({"session_time": "evening"})).unwrap_err();
        assert!(matches!(err, MergeError::UnresolvedConflict { .. }));

        let result = merge(json!({"session_time": ""}), json!({"session_time": "evening"})).unwrap();
        assert_eq!(result.document.get("session_time"), Some(&DocumentValue::from("evening")));
    }

    #[test]
    fn timestamps_outside_time_fields_are_plain_strings() {
        let err = merge(
            json!({"created": "2024-01-01T10:00:00Z"}),
            json!({"created": "2024-01-01T10:05:00Z"}),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::UnresolvedConflict { .. }));
    }

    #[test]
    fn empty_string_falls_back_to_the_other_side() {
        let result = merge(json!({"notes": "lights on"}), json!({"notes": ""})).unwrap();
        let decision = result.decision_for("notes").unwrap();
        assert_eq!(decision.chosen_value, DocumentValue::from("lights on"));
        assert_eq!(decision.reason, DecisionReason::ResolverChoice);
        assert_eq!(decision.note.as_deref(), Some("empty-string fallback"));
    }

    #[test]
    fn differing_strings_go_to_the_resolver() {
        let engine = MergeEngine::new(MergeContext::default().with_resolver(JoinResolver));
        let result = engine
            .merge(
                &doc(json!({"session_type": "FIB"})),
                &doc(json!({"session_type": "Pavlovian"})),
                "fib.json",
                "pav.json",
            )
            .unwrap();
        let decision = result.decision_for("session_type").unwrap();
        assert_eq!(decision.chosen_value, DocumentValue::from("FIB + Pavlovian"));
        assert_eq!(decision.sources, ("fib.json".to_owned(), "pav.json".to_owned()));
        assert_eq!(decision.note.as_deref(), Some("join resolver settled scalar disagreement"));
    }

    #[test]
    fn differing_numbers_and_bools_go_to_the_resolver() {
        let err = merge(json!({"animal_weight_prior": 21.3}), json!({"animal_weight_prior": 21.9})).unwrap_err();
        assert!(matches!(err, MergeError::UnresolvedConflict { .. }));

        let err = merge(json!({"active": true}), json!({"active": false})).unwrap_err();
        assert!(matches!(err, MergeError::UnresolvedConflict { .. }));
    }

    #[test]
    fn mismatched_kinds_are_type_conflicts() {
        let err = merge(json!({"rig_id": 7}), json!({"rig_id": "7"})).unwrap_err();
        assert!(matches!(err, MergeError::TypeMismatchConflict { .. }));

        let err = merge(json!({"streams": ["fib"]}), json!({"streams": {"fib": true}})).unwrap_err();
        assert!(matches!(err, MergeError::TypeMismatchConflict { .. }));
    }

    #[test]
    fn unit_follows_total() {
        let result = merge(
            json!({"reward_consumed_total": null, "reward_consumed_unit": "ml"}),
            json!({"reward_consumed_total": 5, "reward_consumed_unit": "ul"}),
        )
        .unwrap();
        assert_eq!(result.document, doc(json!({"reward_consumed_total": 5, "reward_consumed_unit": "ul"})));
        assert_eq!(
            result.decision_for("reward_consumed_unit").unwrap().reason,
            DecisionReason::UnitFollowsTotal
        );
    }

    #[test]
    fn integer_and_float_spellings_are_identical() {
        let result = merge(
            json!({"reward_consumed_total": 5, "tags": [5]}),
            json!({"reward_consumed_total": 5.0, "tags": [5.0]}),
        )
        .unwrap();
        let total = result.decision_for("reward_consumed_total").unwrap();
        assert_eq!(total.reason, DecisionReason::Identical);
        assert_eq!(total.chosen_value.to_string(), "5");
        assert_eq!(result.document.get("tags").unwrap().to_string(), "[5]");
    }

    #[test]
    fn null_unit_is_filled_even_from_the_side_without_a_total() {
        let result = merge(
            json!({"reward_consumed_total": 5, "reward_consumed_unit": null}),
            json!({"reward_consumed_total": null, "reward_consumed_unit": "ul"}),
        )
        .unwrap();
        assert_eq!(
            result.document,
            doc(json!({"reward_consumed_total": 5, "reward_consumed_unit": "ul"}))
        );
        assert_eq!(
            result.decision_for("reward_consumed_unit").unwrap().reason,
            DecisionReason::NullCoalesced
        );
    }

    #[test]
    fn two_real_quantities_are_a_conflict() {
        let err = merge(
            json!({"reward_consumed_total": 1, "reward_consumed_unit": "ml"}),
            json!({"reward_consumed_total": 2, "reward_consumed_unit": "ul"}),
        )
        .unwrap_err();
        assert_eq!(err.path(), Some("reward_consumed_total"));
    }

    #[test]
    fn custom_unit_pairs_apply_at_any_depth() {
        let context = MergeContext::default().with_unit_pair(UnitQuantityPair::new("weight", "weight_unit"));
        let result = MergeEngine::new(context)
            .merge(
                &doc(json!({"subject": {"weight": 21.5, "weight_unit": "gram"}})),
                &doc(json!({"subject": {"weight": null, "weight_unit": "kilogram"}})),
                "a",
                "b",
            )
            .unwrap();
        assert_eq!(
            result.document,
            doc(json!({"subject": {"weight": 21.5, "weight_unit": "gram"}}))
        );
        assert_eq!(
            result.decision_for("subject.weight_unit").unwrap().reason,
            DecisionReason::UnitFollowsTotal
        );
    }

    #[test]
    fn nested_maps_recurse_with_prefixed_paths() {
        let result = merge(
            json!({"rig": {"name": "fib", "light": {"power": null}}}),
            json!({"rig": {"serial": "X1", "light": {"power": 20}}}),
        )
        .unwrap();
        assert_eq!(
            result.document,
            doc(json!({"rig": {"name": "fib", "light": {"power": 20}, "serial": "X1"}}))
        );
        assert_eq!(
            keys(result.document.get("rig").unwrap().as_map().unwrap()),
            vec!["name", "light", "serial"]
        );
        let decision = result.decision_for("rig.light.power").unwrap();
        assert_eq!(decision.reason, DecisionReason::NullCoalesced);
        assert!(result.decision_for("rig").is_none());
    }

    #[test]
    fn conflicts_deep_in_the_tree_report_dotted_paths() {
        let err = merge(
            json!({"rig": {"light": {"wavelength": 470}}}),
            json!({"rig": {"light": {"wavelength": 560}}}),
        )
        .unwrap_err();
        assert_eq!(err.path(), Some("rig.light.wavelength"));
    }

    #[test]
    fn lists_use_dedup_and_concat() {
        let result = merge(
            json!({"tags": ["a", "b"], "stimulus_epochs": [{"id": 1}]}),
            json!({"tags": ["b", "c"], "stimulus_epochs": [{"id": 2}]}),
        )
        .unwrap();
        assert_eq!(
            result.document,
            doc(json!({"tags": ["a", "b", "c"], "stimulus_epochs": [{"id": 1}, {"id": 2}]}))
        );
        assert_eq!(result.decision_for("tags").unwrap().reason, DecisionReason::ListDedup);
        assert_eq!(result.decision_for("stimulus_epochs").unwrap().reason, DecisionReason::ListConcat);
    }

    #[test]
    fn empty_list_merge_keeps_the_other_list() {
        let result = merge(json!({"tags": []}), json!({"tags": ["b", "b"]})).unwrap();
        assert_eq!(result.document.get("tags"), Some(&DocumentValue::from(json!(["b"]))));
    }

    #[test]
    fn merge_is_not_commutative() {
        let a = doc(json!({"tags": ["x"], "rig_id": "one", "epochs": [{"id": 1}]}));
        let b = doc(json!({"tags": ["y"], "rig_id": "two", "epochs": [{"id": 2}]}));
        let engine = MergeEngine::new(MergeContext::default().with_resolver(PreferResolver::first()));

        let ab = engine.merge(&a, &b, "a", "b").unwrap().document;
        let ba = engine.merge(&b, &a, "b", "a").unwrap().document;

        assert_eq!(ab.get("tags"), Some(&DocumentValue::from(json!(["x", "y"]))));
        assert_eq!(ba.get("tags"), Some(&DocumentValue::from(json!(["y", "x"]))));
        assert_eq!(ab.get("rig_id"), Some(&DocumentValue::from("one")));
        assert_eq!(ba.get("rig_id"), Some(&DocumentValue::from("two")));
        assert_eq!(ab.get("epochs"), Some(&DocumentValue::from(json!([{"id": 1}, {"id": 2}]))));
        assert_eq!(ba.get("epochs"), Some(&DocumentValue::from(json!([{"id": 2}, {"id": 1}]))));
        assert_ne!(ab, ba);
    }

    #[test]
    fn inputs_are_not_modified() {
        let a = doc(json!({"rig": {"name": null}, "tags": ["a"]}));
        let b = doc(json!({"rig": {"name": "fib"}, "tags": ["b"]}));
        let (a_before, b_before) = (a.clone(), b.clone());
        MergeEngine::default().merge(&a, &b, "a", "b").unwrap();
        assert_eq!(a, a_before);
        assert_eq!(b, b_before);
    }

    #[test]
    fn data_streams_with_matching_windows_coalesce() {
        let engine = MergeEngine::new(MergeContext::default().with_stream_rule(StreamRule::data_streams()));
        let result = engine
            .merge(
                &doc(json!({"data_streams": [{
                    "stream_start_time": "2024-01-01T10:00:00Z",
                    "stream_end_time": "2024-01-01T11:00:00Z",
                    "stream_modalities": ["FIB"]
                }]})),
                &doc(json!({"data_streams": [{
                    "stream_start_time": "2024-01-01T10:02:00Z",
                    "stream_end_time": "2024-01-01T11:03:00Z",
                    "stream_modalities": ["BEHAVIOR"]
                }]})),
                "fib.json",
                "behavior.json",
            )
            .unwrap();

        assert_eq!(
            result.document,
            doc(json!({"data_streams": [{
                "stream_start_time": "2024-01-01T10:00:00Z",
                "stream_end_time": "2024-01-01T11:03:00Z",
                "stream_modalities": ["FIB", "BEHAVIOR"]
            }]}))
        );
        let decision = result.decision_for("data_streams").unwrap();
        assert_eq!(decision.reason, DecisionReason::StreamsCoalesced);
        assert!(result.decision_for("data_streams[0+1].stream_start_time").is_some());
    }

    #[test]
    fn data_streams_far_apart_stay_separate() {
        let engine = MergeEngine::new(MergeContext::default().with_stream_rule(StreamRule::data_streams()));
        let result = engine
            .merge(
                &doc(json!({"data_streams": [{
                    "stream_start_time": "2024-01-01T10:00:00Z",
                    "stream_end_time": "2024-01-01T11:00:00Z"
                }]})),
                &doc(json!({"data_streams": [{
                    "stream_start_time": "2024-01-01T13:00:00Z",
                    "stream_end_time": "2024-01-01T14:00:00Z"
                }]})),
                "a",
                "b",
            )
            .unwrap();
        assert_eq!(result.document.get("data_streams").unwrap().as_list().unwrap().len(), 2);
        assert_eq!(result.decision_for("data_streams").unwrap().reason, DecisionReason::ListConcat);
    }

    #[test]
    fn merge_many_folds_left_to_right() {
        let docs = vec![
            doc(json!({"data_streams": ["fib"], "session_start_time": "2024-01-01T10:03:00Z"})),
            doc(json!({"data_streams": ["behavior"], "session_start_time": "2024-01-01T10:00:00Z"})),
            doc(json!({"data_streams": ["video"], "rig_id": "fib-1"})),
        ];
        let result = MergeEngine::default()
            .merge_many(&docs, &["fib.json", "behavior.json", "video.json"])
            .unwrap();
        assert_eq!(
            result.document,
            doc(json!({
                "data_streams": ["fib", "behavior", "video"],
                "session_start_time": "2024-01-01T10:00:00Z",
                "rig_id": "fib-1"
            }))
        );
        let last = result.decisions.last().unwrap();
        assert_eq!(last.sources, ("fib.json+behavior.json".to_owned(), "video.json".to_owned()));
    }

    #[test]
    fn merge_many_single_and_invalid_inputs() {
        let engine = MergeEngine::default();
        let only = doc(json!({"a": 1}));
        let result = engine.merge_many(std::slice::from_ref(&only), &["a.json"]).unwrap();
        assert_eq!(result.document, only);
        assert!(result.decisions.is_empty());

        let empty: [&str; 0] = [];
        assert!(matches!(engine.merge_many(&[], &empty), Err(MergeError::InvalidInput(_))));
        assert!(matches!(engine.merge_many(&[only], &["a", "b"]), Err(MergeError::InvalidInput(_))));
    }

    #[test]
    fn merge_many_fails_atomically() {
        let docs = vec![
            doc(json!({"rig_id": "a"})),
            doc(json!({"rig_id": null})),
            doc(json!({"rig_id": "b"})),
        ];
        let err = MergeEngine::default().merge_many(&docs, &["1", "2", "3"]).unwrap_err();
        match err {
            MergeError::UnresolvedConflict { source1, source2, .. } => {
                assert_eq!(source1, "1+2");
                assert_eq!(source2, "3");
            }
            other => panic!("expected UnresolvedConflict, got {other:?}"),
        }
    }
}
