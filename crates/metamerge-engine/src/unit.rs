use metamerge_types::{DocumentValue, MetadataDocument};

use crate::context::UnitQuantityPair;
use crate::decision::{DecisionReason, Resolution};

/// Resolves a unit field from its sibling totals.
///
/// Returns `None` when both totals carry real quantities: that is a genuine
/// disagreement and belongs to the generic scalar path.
pub(crate) fn follow_total(
    pair: &UnitQuantityPair,
    parent1: &MetadataDocument,
    parent2: &MetadataDocument,
) -> Option<Resolution> {
    let lacks_total = |parent: &MetadataDocument| {
        parent
            .get(&pair.total)
            .map_or(true, DocumentValue::is_null)
    };
    let unit = |parent: &MetadataDocument| parent.get(&pair.unit).cloned().unwrap_or_default();

    let (missing1, missing2) = (lacks_total(parent1), lacks_total(parent2));
    let (value, note) = match (missing1, missing2) {
        (true, false) => (unit(parent2), "only the second document has a total"),
        (false, true) => (unit(parent1), "only the first document has a total"),
        (true, true) => {
            let first = unit(parent1);
            let chosen = if first.is_null() { unit(parent2) } else { first };
            (chosen, "neither document has a total")
        }
        (false, false) => return None,
    };

    Some(Resolution::new(value, DecisionReason::UnitFollowsTotal).with_note(note))
}
