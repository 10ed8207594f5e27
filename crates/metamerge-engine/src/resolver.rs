//! Pluggable policies for conflicts the structural rules cannot settle.
//!
//! The engine hands a [`Conflict`] to the configured [`ConflictResolver`]
//! whenever two values disagree and no timestamp, list, unit or map rule
//! applies. Resolvers either produce the value to keep or decline with an
//! error, which aborts the whole merge.

use std::fmt;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::Mutex;

use metamerge_types::DocumentValue;

use crate::error::MergeError;

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// What kind of disagreement reached the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Same kind of value on both sides, different contents.
    ScalarDisagreement,
    /// Values of incompatible kinds (e.g. number vs. string).
    TypeMismatch,
    /// Both sides report a real quantity for a paired total/unit field.
    QuantityDisagreement,
    /// Timestamps beyond the tolerance window, escalated by configuration.
    ToleranceExceeded,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ScalarDisagreement => "scalar disagreement",
            Self::TypeMismatch => "type mismatch",
            Self::QuantityDisagreement => "quantity disagreement",
            Self::ToleranceExceeded => "tolerance exceeded",
        };
        f.write_str(name)
    }
}

/// A single field conflict handed to a [`ConflictResolver`].
#[derive(Clone, Copy, Debug)]
pub struct Conflict<'a> {
    pub field_path: &'a str,
    pub value1: &'a DocumentValue,
    pub source1: &'a str,
    pub value2: &'a DocumentValue,
    pub source2: &'a str,
    pub kind: ConflictKind,
}

impl Conflict<'_> {
    /// The value offered when the user just presses enter.
    ///
    /// Only string conflicts have one: both strings joined with `" + "`.
    pub fn default_value(&self) -> Option<DocumentValue> {
        match (self.value1, self.value2) {
            (DocumentValue::String(a), DocumentValue::String(b)) => {
                Some(DocumentValue::String(format!("{a} + {b}")))
            }
            _ => None,
        }
    }

    /// The error a resolver returns when it will not pick a value.
    pub fn declined(&self, reason: impl Into<String>) -> MergeError {
        match self.kind {
            ConflictKind::TypeMismatch => MergeError::TypeMismatchConflict {
                path: self.field_path.to_owned(),
                source1: self.source1.to_owned(),
                value1: self.value1.clone(),
                source2: self.source2.to_owned(),
                value2: self.value2.clone(),
            },
            _ => MergeError::UnresolvedConflict {
                path: self.field_path.to_owned(),
                source1: self.source1.to_owned(),
                value1: self.value1.clone(),
                source2: self.source2.to_owned(),
                value2: self.value2.clone(),
                reason: reason.into(),
            },
        }
    }
}

impl fmt::Display for Conflict<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in '{}': {} has {}, {} has {}",
            self.kind, self.field_path, self.source1, self.value1, self.source2, self.value2
        )
    }
}

// ---------------------------------------------------------------------------
// ConflictResolver trait
// ---------------------------------------------------------------------------

/// A policy that settles one field conflict.
///
/// The trait is object-safe and `Send + Sync` so a resolver can live behind
/// an `Arc<dyn ConflictResolver>` in a shared merge context.
pub trait ConflictResolver: Send + Sync {
    /// Short name recorded in decision notes (e.g., "strict", "interactive").
    fn name(&self) -> &str;

    /// Produce the value to keep, or decline with an error.
    fn resolve(&self, conflict: &Conflict<'_>) -> Result<DocumentValue, MergeError>;
}

// ---------------------------------------------------------------------------
// StrictResolver
// ---------------------------------------------------------------------------

/// Never guesses: every conflict becomes an error.
///
/// This is the default for pipelines. Mismatched kinds surface as
/// `TypeMismatchConflict`, everything else as `UnresolvedConflict`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrictResolver;

impl ConflictResolver for StrictResolver {
    fn name(&self) -> &str {
        "strict"
    }

    fn resolve(&self, conflict: &Conflict<'_>) -> Result<DocumentValue, MergeError> {
        Err(conflict.declined("strict resolver never picks a side"))
    }
}

// ---------------------------------------------------------------------------
// PreferResolver
// ---------------------------------------------------------------------------

/// Which input wins under [`PreferResolver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

/// Deterministic policy that always keeps one side's value.
#[derive(Clone, Copy, Debug)]
pub struct PreferResolver {
    side: Side,
}

impl PreferResolver {
    pub fn first() -> Self {
        Self { side: Side::First }
    }

    pub fn second() -> Self {
        Self { side: Side::Second }
    }

    pub fn side(&self) -> Side {
        self.side
    }
}

impl ConflictResolver for PreferResolver {
    fn name(&self) -> &str {
        match self.side {
            Side::First => "prefer-first",
            Side::Second => "prefer-second",
        }
    }

    fn resolve(&self, conflict: &Conflict<'_>) -> Result<DocumentValue, MergeError> {
        Ok(match self.side {
            Side::First => conflict.value1.clone(),
            Side::Second => conflict.value2.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// JoinResolver
// ---------------------------------------------------------------------------

/// Accepts the interactive default without asking: differing strings are
/// joined as `"a + b"`, anything else is declined.
#[derive(Clone, Copy, Debug, Default)]
pub struct JoinResolver;

impl ConflictResolver for JoinResolver {
    fn name(&self) -> &str {
        "join"
    }

    fn resolve(&self, conflict: &Conflict<'_>) -> Result<DocumentValue, MergeError> {
        conflict
            .default_value()
            .ok_or_else(|| conflict.declined("only string conflicts can be joined"))
    }
}

// ---------------------------------------------------------------------------
// InteractiveResolver
// ---------------------------------------------------------------------------

/// Asks a human on the console.
///
/// Prints both values with their sources and the default, then blocks on one
/// line of input. An empty line or `y` accepts the default, `n` rejects it,
/// anything else becomes the new value. Console I/O is serialized behind a
/// mutex, but the resolver must still not be shared by concurrent merges.
pub struct InteractiveResolver<R, W> {
    io: Mutex<(R, W)>,
}

impl InteractiveResolver<BufReader<Stdin>, Stdout> {
    /// Bind to the process's standard input and output.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> InteractiveResolver<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    /// Recover the reader and writer, e.g. to inspect a transcript.
    pub fn into_inner(self) -> (R, W) {
        match self.io.into_inner() {
            Ok(io) => io,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn prompt(
        reader: &mut R,
        writer: &mut W,
        conflict: &Conflict<'_>,
        default: Option<&DocumentValue>,
    ) -> io::Result<Option<String>> {
        writeln!(writer, "Conflict in '{}' ({}):", conflict.field_path, conflict.kind)?;
        writeln!(writer, "  {}: {}", conflict.source1, conflict.value1)?;
        writeln!(writer, "  {}: {}", conflict.source2, conflict.value2)?;
        match default {
            Some(value) => writeln!(writer, "Default merged value: {value}")?,
            None => writeln!(writer, "Default merged value: no default")?,
        }
        write!(writer, "Accept default? [Y/n] or type new value: ")?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }
}

impl<R, W> ConflictResolver for InteractiveResolver<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn name(&self) -> &str {
        "interactive"
    }

    fn resolve(&self, conflict: &Conflict<'_>) -> Result<DocumentValue, MergeError> {
        let default = conflict.default_value();

        let mut guard = self
            .io
            .lock()
            .map_err(|_| conflict.declined("console lock poisoned"))?;
        let (reader, writer) = &mut *guard;

        let answer = Self::prompt(reader, writer, conflict, default.as_ref())
            .map_err(|e| conflict.declined(format!("console error: {e}")))?;

        let Some(answer) = answer else {
            return Err(conflict.declined("end of input"));
        };

        if answer.is_empty() || answer.eq_ignore_ascii_case("y") {
            return default.ok_or_else(|| conflict.declined("no default available"));
        }
        if answer.eq_ignore_ascii_case("n") {
            return Err(conflict.declined("default rejected"));
        }

        let both_strings = conflict.value1.as_str().is_some() && conflict.value2.as_str().is_some();
        if both_strings {
            return Ok(DocumentValue::String(answer));
        }
        Ok(serde_json::from_str::<DocumentValue>(&answer)
            .unwrap_or(DocumentValue::String(answer)))
    }
}
