//! Failure records.
//!
//! A [`Failure`] describes one failed check: what kind of assertion failed,
//! how severe it is, the values involved, and at least one underlying cause.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Underlying cause of a failure.
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// Closed set of assertion kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionKind {
    /// An operation (sending a request, reading a body) failed.
    Operation,
    /// The API was misused (bad argument, invalid state).
    Usage,
    /// Value has an unexpected type.
    Type,
    Valid,
    NotValid,
    IsEmpty,
    NotEmpty,
    IsEqual,
    NotEqual,
    Lt,
    Le,
    Gt,
    Ge,
    InRange,
    NotInRange,
    ContainsKey,
    NotContainsKey,
    ContainsElement,
    NotContainsElement,
    ContainsSubset,
    NotContainsSubset,
    MatchSchema,
    MatchPath,
}

impl AssertionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssertionKind::Operation => "operation",
            AssertionKind::Usage => "usage",
            AssertionKind::Type => "type",
            AssertionKind::Valid => "valid",
            AssertionKind::NotValid => "not_valid",
            AssertionKind::IsEmpty => "is_empty",
            AssertionKind::NotEmpty => "not_empty",
            AssertionKind::IsEqual => "is_equal",
            AssertionKind::NotEqual => "not_equal",
            AssertionKind::Lt => "lt",
            AssertionKind::Le => "le",
            AssertionKind::Gt => "gt",
            AssertionKind::Ge => "ge",
            AssertionKind::InRange => "in_range",
            AssertionKind::NotInRange => "not_in_range",
            AssertionKind::ContainsKey => "contains_key",
            AssertionKind::NotContainsKey => "not_contains_key",
            AssertionKind::ContainsElement => "contains_element",
            AssertionKind::NotContainsElement => "not_contains_element",
            AssertionKind::ContainsSubset => "contains_subset",
            AssertionKind::NotContainsSubset => "not_contains_subset",
            AssertionKind::MatchSchema => "match_schema",
            AssertionKind::MatchPath => "match_path",
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a failure is treated by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Stops the test (panics under [`PanicReporter`](crate::chain::PanicReporter)).
    #[default]
    Fatal,
    /// Logged, the test keeps running.
    NonFatal,
}

/// Plain-text cause, for failures that do not originate from an error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(pub String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for Message {}

/// One failed check.
#[derive(Debug, Clone)]
pub struct Failure {
    /// What was being asserted.
    pub kind: AssertionKind,

    /// Stamped by the chain when the failure is reported.
    pub severity: Severity,

    /// Value under test.
    pub actual: Option<Value>,

    /// Value the assertion expected.
    pub expected: Option<Value>,

    /// Value the assertion compared against (e.g., a range bound).
    pub reference: Option<Value>,

    /// Allowed delta for approximate comparisons.
    pub delta: Option<Value>,

    causes: Vec<Cause>,
}

impl Failure {
    /// Create a failure with its first cause.
    pub fn new<E>(kind: AssertionKind, cause: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            severity: Severity::default(),
            actual: None,
            expected: None,
            reference: None,
            delta: None,
            causes: vec![Arc::from(cause.into())],
        }
    }

    /// Create a failure whose cause is a plain message.
    pub fn message(kind: AssertionKind, message: impl Into<String>) -> Self {
        Self::new(kind, Message(message.into()))
    }

    /// Add another underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync + 'static>>,
    {
        self.causes.push(Arc::from(cause.into()));
        self
    }

    pub fn with_actual(mut self, actual: impl Into<Value>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<Value>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_delta(mut self, delta: impl Into<Value>) -> Self {
        self.delta = Some(delta.into());
        self
    }

    /// Underlying causes. Never empty.
    pub fn causes(&self) -> &[Cause] {
        &self.causes
    }

    /// First cause rendered as text.
    pub fn summary(&self) -> String {
        self.causes
            .first()
            .map(|c| c.to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} assertion failed: ", self.kind)?;
        for (i, cause) in self.causes.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", cause)?;
        }
        Ok(())
    }
}
