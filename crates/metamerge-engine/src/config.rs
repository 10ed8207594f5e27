use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::{MergeContext, StreamRule, UnitQuantityPair, DEFAULT_STREAM_TOLERANCE};
use crate::error::MergeError;
use crate::resolver::{ConflictResolver, InteractiveResolver, JoinResolver, PreferResolver, StrictResolver};

/// Which built-in resolver settles conflicts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    #[default]
    Strict,
    Interactive,
    PreferFirst,
    PreferSecond,
    Join,
}

impl ResolverKind {
    pub fn build(self) -> Arc<dyn ConflictResolver> {
        match self {
            Self::Strict => Arc::new(StrictResolver),
            Self::Interactive => Arc::new(InteractiveResolver::stdio()),
            Self::PreferFirst => Arc::new(PreferResolver::first()),
            Self::PreferSecond => Arc::new(PreferResolver::second()),
            Self::Join => Arc::new(JoinResolver),
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Strict => "strict",
            Self::Interactive => "interactive",
            Self::PreferFirst => "prefer-first",
            Self::PreferSecond => "prefer-second",
            Self::Join => "join",
        };
        f.write_str(name)
    }
}

/// A stream list as written in a config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRuleConfig {
    pub field: String,
    pub start_field: String,
    pub end_field: String,
    #[serde(default = "default_stream_tolerance_secs")]
    pub tolerance_secs: u64,
}

fn default_stream_tolerance_secs() -> u64 {
    DEFAULT_STREAM_TOLERANCE.as_secs()
}

impl From<&StreamRule> for StreamRuleConfig {
    fn from(rule: &StreamRule) -> Self {
        Self {
            field: rule.field.clone(),
            start_field: rule.start_field.clone(),
            end_field: rule.end_field.clone(),
            tolerance_secs: rule.tolerance.as_secs(),
        }
    }
}

/// On-disk merge settings.
///
/// Every field is optional in TOML; missing ones take the defaults of
/// [`MergeContext`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Maximum divergence between two timestamps for the same field.
    pub timestamp_tolerance_secs: u64,
    /// Case-insensitive substring that marks timestamp fields.
    pub timestamp_hint: String,
    /// Send tolerance violations to the resolver instead of failing.
    pub escalate_tolerance: bool,
    pub resolver: ResolverKind,
    pub unit_pairs: Vec<UnitQuantityPair>,
    pub streams: Vec<StreamRuleConfig>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        let context = MergeContext::default();
        Self {
            timestamp_tolerance_secs: context.timestamp_tolerance.as_secs(),
            timestamp_hint: context.timestamp_hint,
            escalate_tolerance: context.escalate_tolerance,
            resolver: ResolverKind::default(),
            unit_pairs: context.unit_pairs,
            streams: context.stream_rules.iter().map(StreamRuleConfig::from).collect(),
        }
    }
}

impl MergeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, MergeError> {
        toml::from_str(input).map_err(|e| MergeError::Config(format!("invalid merge config: {e}")))
    }

    pub fn to_toml_string(&self) -> Result<String, MergeError> {
        toml::to_string_pretty(self)
            .map_err(|e| MergeError::Config(format!("failed to render merge config: {e}")))
    }

    /// Validate the settings and build the context the engine runs with.
    pub fn into_context(self) -> Result<MergeContext, MergeError> {
        if self.timestamp_hint.trim().is_empty() {
            return Err(MergeError::Config("timestamp_hint must not be empty".into()));
        }
        for pair in &self.unit_pairs {
            if pair.total.is_empty() || pair.unit.is_empty() {
                return Err(MergeError::Config("unit pair fields must not be empty".into()));
            }
            if pair.total == pair.unit {
                return Err(MergeError::Config(format!(
                    "unit pair uses '{}' as both total and unit",
                    pair.total
                )));
            }
        }

        let mut context = MergeContext::default()
            .with_timestamp_tolerance(Duration::from_secs(self.timestamp_tolerance_secs))
            .with_timestamp_hint(self.timestamp_hint)
            .with_shared_resolver(self.resolver.build());
        context.escalate_tolerance = self.escalate_tolerance;
        context.unit_pairs.clear();
        for pair in self.unit_pairs {
            context = context.with_unit_pair(pair);
        }

        for stream in self.streams {
            if stream.field.is_empty() || stream.start_field.is_empty() || stream.end_field.is_empty() {
                return Err(MergeError::Config("stream rule fields must not be empty".into()));
            }
            context = context.with_stream_rule(StreamRule {
                field: stream.field,
                start_field: stream.start_field,
                end_field: stream.end_field,
                tolerance: Duration::from_secs(stream.tolerance_secs),
            });
        }

        Ok(context)
    }
}
