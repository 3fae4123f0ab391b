//! Literal substitution for Cypher query text.
//!
//! The graph-query dialects this backend targets have no native parameter
//! binding: every value must be rendered into the query text itself. That
//! makes this module the crate's injection boundary, and the rules are
//! strict:
//!
//! - strings are single-quoted with backslash escaping of the quote, the
//!   backslash, and control characters
//! - booleans render as lowercase literals
//! - integers and finite floats render verbatim; non-finite floats are
//!   rejected
//! - `None`/null renders as the `null` literal
//! - lists render element-wise; maps render with validated (or backtick
//!   quoted) keys
//! - a `$placeholder` with no supplied value is an error, never a silent
//!   pass-through
//!
//! Nothing outside this module splices a value into Cypher text.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A value destined for a Cypher literal.
#[derive(Debug, Clone, PartialEq)]
pub enum CypherValue {
    /// The `null` literal.
    Null,
    /// A boolean literal, rendered lowercase.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A float literal; must be finite.
    Float(f64),
    /// A string literal, quote-escaped.
    Str(String),
    /// A composite value rendered as a list or map literal.
    Json(serde_json::Value),
}

impl CypherValue {
    /// Convenience constructor for optional strings.
    #[must_use]
    pub fn opt_str(value: Option<impl Into<String>>) -> Self {
        value.map_or(Self::Null, |s| Self::Str(s.into()))
    }

    /// Renders a timestamp as a fixed-width RFC 3339 string literal.
    ///
    /// The fixed `%.6f` fractional width makes lexicographic string order
    /// equal chronological order, which the temporal comparisons in
    /// generated queries rely on.
    #[must_use]
    pub fn timestamp(dt: DateTime<Utc>) -> Self {
        Self::Str(dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
    }

    /// Renders an optional timestamp.
    #[must_use]
    pub fn opt_timestamp(dt: Option<DateTime<Utc>>) -> Self {
        dt.map_or(Self::Null, Self::timestamp)
    }

    /// Renders this value as Cypher literal text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for non-finite floats.
    pub fn render(&self) -> Result<String> {
        match self {
            Self::Null => Ok("null".to_string()),
            Self::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            Self::Int(i) => Ok(i.to_string()),
            Self::Float(f) => {
                if !f.is_finite() {
                    return Err(Error::Validation(format!(
                        "non-finite float cannot be rendered into a query: {f}"
                    )));
                }
                Ok(format!("{f:?}"))
            },
            Self::Str(s) => Ok(quote_string(s)),
            Self::Json(value) => render_json(value),
        }
    }
}

impl From<bool> for CypherValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for CypherValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for CypherValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for CypherValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for CypherValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Quotes and escapes a string for use as a Cypher string literal.
fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            },
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Renders a JSON value as a Cypher list/map literal.
fn render_json(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::Null => Ok("null".to_string()),
        serde_json::Value::Bool(b) => CypherValue::Bool(*b).render(),
        serde_json::Value::Number(n) => n.as_i64().map_or_else(
            || {
                CypherValue::Float(n.as_f64().ok_or_else(|| {
                    Error::Validation(format!("unrepresentable number: {n}"))
                })?)
                .render()
            },
            |i| CypherValue::Int(i).render(),
        ),
        serde_json::Value::String(s) => Ok(quote_string(s)),
        serde_json::Value::Array(items) => {
            let rendered: Result<Vec<String>> = items.iter().map(render_json).collect();
            Ok(format!("[{}]", rendered?.join(", ")))
        },
        serde_json::Value::Object(entries) => {
            let mut parts = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                parts.push(format!("{}: {}", quote_identifier(key)?, render_json(value)?));
            }
            Ok(format!("{{{}}}", parts.join(", ")))
        },
    }
}

/// Returns true for names that can be spliced into query structure as-is.
#[must_use]
pub fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quotes a map key or label, backtick-escaping anything unusual.
fn quote_identifier(s: &str) -> Result<String> {
    if is_safe_identifier(s) {
        return Ok(s.to_string());
    }
    if s.is_empty() {
        return Err(Error::Validation("empty identifier in map key".to_string()));
    }
    Ok(format!("`{}`", s.replace('`', "``")))
}

/// Substitutes `$name` placeholders in a query with rendered literals.
///
/// Placeholders are matched as whole identifiers, so `$id` never clobbers
/// the prefix of `$id2`. Every placeholder in the query must have a value.
///
/// # Errors
///
/// Returns [`Error::Validation`] for a placeholder with no value or a value
/// that cannot be rendered.
pub fn substitute(query: &str, params: &BTreeMap<&str, CypherValue>) -> Result<String> {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if name.is_empty() {
            out.push('$');
            continue;
        }

        let value = params.get(name.as_str()).ok_or_else(|| {
            Error::Validation(format!("no value supplied for placeholder ${name}"))
        })?;
        out.push_str(&value.render()?);
    }

    Ok(out)
}
