//! Structured relationship context.
//!
//! Free-text relationship context is analyzed by an external extractor (a
//! pure function over the text); this crate consumes and stores its output
//! shape, [`ContextStructure`], as JSON alongside the relationship.
//! [`ContextFilter`] queries over those stored structures: filters combine
//! with AND, multiple values within one filter combine with OR, and all
//! string matching is case-insensitive substring matching.
//!
//! The filter predicate lives here, in plain Rust, so the relational and
//! graph-query backends cannot drift apart on matching semantics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How broadly a relationship's claim applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextScope {
    /// The claim holds partially.
    Partial,
    /// The claim holds fully.
    Full,
    /// The claim holds under stated conditions.
    Conditional,
}

impl ContextScope {
    /// Returns the scope as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Partial => "partial",
            Self::Full => "full",
            Self::Conditional => "conditional",
        }
    }

    /// Parses a scope from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "partial" => Some(Self::Partial),
            "full" => Some(Self::Full),
            "conditional" => Some(Self::Conditional),
            _ => None,
        }
    }
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured information extracted from free-text relationship context.
///
/// Produced externally; the original text is always preserved in `text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStructure {
    /// The original free-text context.
    pub text: String,
    /// Detected scope of the claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<ContextScope>,
    /// Components or modules mentioned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    /// Conditions under which the claim holds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    /// Verification or testing mentions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    /// Version, date, or time qualifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<String>,
    /// Exclusions and limitations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<String>,
}

impl ContextStructure {
    /// Creates a structure holding only the original text.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets the scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: ContextScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    /// Adds an evidence mention.
    #[must_use]
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    /// Adds a component mention.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.components.push(component.into());
        self
    }

    /// Sets the temporal qualifier.
    #[must_use]
    pub fn with_temporal(mut self, temporal: impl Into<String>) -> Self {
        self.temporal = Some(temporal.into());
        self
    }
}

/// Filter over stored context structures.
///
/// Empty filters match everything; each populated filter narrows the result
/// (AND), while the values inside one filter are alternatives (OR).
#[derive(Debug, Clone, Default)]
pub struct ContextFilter {
    /// Require this scope.
    pub scope: Option<ContextScope>,
    /// Require at least one of these conditions (substring match).
    pub conditions: Vec<String>,
    /// Require at least one of these evidence mentions (substring match).
    pub evidence: Vec<String>,
    /// Require at least one of these components (substring match).
    pub components: Vec<String>,
    /// Require evidence to be present (`true`) or absent (`false`).
    pub has_evidence: Option<bool>,
    /// Require the temporal qualifier to contain this value.
    pub temporal: Option<String>,
    /// Maximum results to return.
    pub limit: Option<usize>,
}

impl ContextFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the given scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: ContextScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Requires at least one of the given conditions.
    #[must_use]
    pub fn with_conditions(mut self, conditions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.conditions.extend(conditions.into_iter().map(Into::into));
        self
    }

    /// Requires at least one of the given evidence mentions.
    #[must_use]
    pub fn with_evidence(mut self, evidence: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.evidence.extend(evidence.into_iter().map(Into::into));
        self
    }

    /// Requires at least one of the given components.
    #[must_use]
    pub fn with_components(mut self, components: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.components.extend(components.into_iter().map(Into::into));
        self
    }

    /// Requires evidence to be present or absent.
    #[must_use]
    pub const fn with_has_evidence(mut self, has_evidence: bool) -> Self {
        self.has_evidence = Some(has_evidence);
        self
    }

    /// Requires the temporal qualifier to contain the given value.
    #[must_use]
    pub fn with_temporal(mut self, temporal: impl Into<String>) -> Self {
        self.temporal = Some(temporal.into());
        self
    }

    /// Sets the maximum number of results.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if no filter field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.scope.is_none()
            && self.conditions.is_empty()
            && self.evidence.is_empty()
            && self.components.is_empty()
            && self.has_evidence.is_none()
            && self.temporal.is_none()
    }

    /// Evaluates this filter against one stored context structure.
    #[must_use]
    pub fn matches(&self, context: &ContextStructure) -> bool {
        if let Some(scope) = self.scope
            && context.scope != Some(scope)
        {
            return false;
        }

        if !self.conditions.is_empty() && !any_contains(&context.conditions, &self.conditions) {
            return false;
        }

        if !self.evidence.is_empty() && !any_contains(&context.evidence, &self.evidence) {
            return false;
        }

        if !self.components.is_empty() && !any_contains(&context.components, &self.components) {
            return false;
        }

        if let Some(has_evidence) = self.has_evidence
            && context.evidence.is_empty() == has_evidence
        {
            return false;
        }

        if let Some(ref temporal) = self.temporal {
            let Some(ref stored) = context.temporal else {
                return false;
            };
            if !stored.to_lowercase().contains(&temporal.to_lowercase()) {
                return false;
            }
        }

        true
    }
}

/// True if any stored value contains any wanted value, case-insensitively.
fn any_contains(stored: &[String], wanted: &[String]) -> bool {
    wanted.iter().any(|w| {
        let w = w.to_lowercase();
        stored.iter().any(|s| s.to_lowercase().contains(&w))
    })
}
