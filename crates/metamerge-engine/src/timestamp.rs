//! Start/end-aware reconciliation of ISO-8601 timestamps.
//!
//! Two acquisition pipelines rarely stamp a session with the exact same
//! instant. Within the tolerance window, start-like fields keep the earlier
//! instant and end-like fields keep the later one, so the merged window covers
//! both recordings. The chosen input string is returned verbatim.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::info;

use metamerge_types::DocumentValue;

use crate::decision::{DecisionReason, Resolution};
use crate::error::MergeError;

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%:z"];
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-8601 timestamp with or without a `Z`/offset suffix.
///
/// Timestamps without an offset are taken as UTC.
pub fn parse_timestamp(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed);
    }
    if let Some(parsed) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(input, fmt).ok())
    {
        return Some(parsed);
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Absolute distance between two instants.
pub fn time_difference(t1: &DateTime<FixedOffset>, t2: &DateTime<FixedOffset>) -> Duration {
    let delta = if t1 >= t2 { *t1 - *t2 } else { *t2 - *t1 };
    delta.to_std().unwrap_or_default()
}

/// Describe a duration the way a person would say it ("1 hour, 5 minutes").
pub fn format_time_difference(diff: Duration) -> String {
    let seconds = diff.as_secs_f64();
    let plural = |n: u64| if n == 1 { "" } else { "s" };

    if seconds >= 3600.0 {
        let hours = diff.as_secs() / 3600;
        let minutes = (diff.as_secs() % 3600) / 60;
        let mut out = format!("{hours} hour{}", plural(hours));
        if minutes > 0 {
            out.push_str(&format!(", {minutes} minute{}", plural(minutes)));
        }
        out
    } else if seconds >= 60.0 {
        let minutes = diff.as_secs() / 60;
        let rest = seconds - (minutes * 60) as f64;
        let mut out = format!("{minutes} minute{}", plural(minutes));
        if rest > 0.0 {
            if rest.fract() == 0.0 {
                let rest = rest as u64;
                out.push_str(&format!(", {rest} second{}", plural(rest)));
            } else {
                out.push_str(&format!(", {rest:.3} seconds"));
            }
        }
        out
    } else if seconds >= 1.0 {
        if seconds.fract() == 0.0 {
            let whole = diff.as_secs();
            format!("{whole} second{}", plural(whole))
        } else {
            format!("{seconds:.3} seconds")
        }
    } else {
        format!("{:.3} milliseconds", seconds * 1000.0)
    }
}

/// Merges timestamp fields using the field name and a tolerance window.
#[derive(Clone, Copy, Debug)]
pub struct TimestampMerger {
    tolerance: Duration,
}

impl TimestampMerger {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    /// Returns both parsed instants if both strings are timestamps.
    pub fn parse_pair(
        value1: &str,
        value2: &str,
    ) -> Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        Some((parse_timestamp(value1)?, parse_timestamp(value2)?))
    }

    /// Choose between two timestamp strings for the field `key`.
    ///
    /// Fails with [`MergeError::ToleranceExceeded`] when the instants are
    /// further apart than the tolerance. Ties keep the first value.
    pub(crate) fn merge(
        &self,
        path: &str,
        key: &str,
        (value1, source1): (&str, &str),
        (value2, source2): (&str, &str),
    ) -> Result<Resolution, MergeError> {
        let (t1, t2) = Self::parse_pair(value1, value2).ok_or_else(|| {
            MergeError::InvalidInput(format!("'{path}' does not hold two timestamps"))
        })?;

        let diff = time_difference(&t1, &t2);
        if diff > self.tolerance {
            return Err(MergeError::ToleranceExceeded {
                path: path.to_owned(),
                source1: source1.to_owned(),
                value1: value1.to_owned(),
                source2: source2.to_owned(),
                value2: value2.to_owned(),
                diff,
                tolerance: self.tolerance,
            });
        }

        let name = key.to_lowercase();
        let (chosen, reason) = if name.contains("start") {
            let pick = if t1 <= t2 { value1 } else { value2 };
            (pick, DecisionReason::TimestampEarlier)
        } else if name.contains("end") {
            let pick = if t1 >= t2 { value1 } else { value2 };
            (pick, DecisionReason::TimestampLater)
        } else {
            (value1, DecisionReason::ResolverChoice)
        };
        let chosen_source = if chosen == value1 { source1 } else { source2 };

        info!(
            field = %path,
            diff = %format_time_difference(diff),
            chosen = %chosen,
            source = %chosen_source,
            "reconciled timestamps ({reason})"
        );

        let resolution = Resolution::new(DocumentValue::from(chosen), reason);
        Ok(match reason {
            DecisionReason::ResolverChoice => resolution
                .with_note("no start/end hint in field name, kept first timestamp"),
            _ => resolution,
        })
    }
}
