//! Search query descriptors and paginated results.
//!
//! These types are ephemeral: they describe one query and one page of its
//! results, and are never persisted.

use crate::models::{MemoryType, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default page size when a query does not set one.
pub const DEFAULT_LIMIT: usize = 50;
/// Largest allowed page size.
pub const MAX_LIMIT: usize = 1000;

/// How multiple search terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every term must match (AND).
    #[default]
    All,
    /// Any term may match (OR).
    Any,
}

impl MatchMode {
    /// Parses a match mode from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" | "and" => Some(Self::All),
            "any" | "or" => Some(Self::Any),
            _ => None,
        }
    }
}

/// How strictly query words are matched against stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTolerance {
    /// Exact substring match only.
    Strict,
    /// Exact plus stemmed variants.
    #[default]
    Normal,
    /// Exact, stemmed, and inflected variants.
    Fuzzy,
}

impl SearchTolerance {
    /// Parses a tolerance level from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" | "exact" => Some(Self::Strict),
            "normal" => Some(Self::Normal),
            "fuzzy" => Some(Self::Fuzzy),
            _ => None,
        }
    }
}

impl fmt::Display for SearchTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Normal => write!(f, "normal"),
            Self::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// A memory search: free text or terms, a tolerance, and structural filters.
///
/// Text matching and structural filters compose with AND. Use
/// [`crate::validation::validate_search_query`] before handing a query to a
/// backend; backends assume `limit` and `offset` are already in range.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Free-text query; split on whitespace into words.
    pub query: Option<String>,
    /// Explicit term list; combined per `match_mode`.
    pub terms: Vec<String>,
    /// How multiple terms combine.
    pub match_mode: MatchMode,
    /// Matching strictness.
    pub tolerance: SearchTolerance,
    /// Only memories of this type.
    pub memory_type: Option<MemoryType>,
    /// Only memories carrying all of these tags.
    pub tags: Vec<String>,
    /// Only memories at or above this importance.
    pub min_importance: Option<f64>,
    /// Only memories at or above this confidence.
    pub min_confidence: Option<f64>,
    /// Only memories created at or after this instant.
    pub created_after: Option<DateTime<Utc>>,
    /// Only memories created before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Only memories captured under this project path.
    pub project_path: Option<String>,
    /// Only memories belonging to this tenant.
    pub tenant_id: Option<String>,
    /// Only memories at this visibility level.
    pub visibility: Option<Visibility>,
    /// Page size, `1..=1000`.
    pub limit: usize,
    /// Page start.
    pub offset: usize,
}

impl SearchQuery {
    /// Creates an empty query with default pagination.
    #[must_use]
    pub fn new() -> Self {
        Self {
            query: None,
            terms: Vec::new(),
            match_mode: MatchMode::default(),
            tolerance: SearchTolerance::default(),
            memory_type: None,
            tags: Vec::new(),
            min_importance: None,
            min_confidence: None,
            created_after: None,
            created_before: None,
            project_path: None,
            tenant_id: None,
            visibility: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// Sets the free-text query.
    #[must_use]
    pub fn with_text(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets explicit search terms.
    #[must_use]
    pub fn with_terms(mut self, terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.terms.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Sets the match mode.
    #[must_use]
    pub const fn with_match_mode(mut self, match_mode: MatchMode) -> Self {
        self.match_mode = match_mode;
        self
    }

    /// Sets the tolerance level.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: SearchTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Filters by memory type.
    #[must_use]
    pub const fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Requires all of the given tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the minimum importance threshold.
    #[must_use]
    pub fn with_min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = Some(min_importance.clamp(0.0, 1.0));
        self
    }

    /// Sets the minimum confidence threshold.
    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence.clamp(0.0, 1.0));
        self
    }

    /// Restricts to memories created at or after the given instant.
    #[must_use]
    pub const fn created_after(mut self, after: DateTime<Utc>) -> Self {
        self.created_after = Some(after);
        self
    }

    /// Restricts to memories created before the given instant.
    #[must_use]
    pub const fn created_before(mut self, before: DateTime<Utc>) -> Self {
        self.created_before = Some(before);
        self
    }

    /// Filters by project path.
    #[must_use]
    pub fn with_project_path(mut self, project_path: impl Into<String>) -> Self {
        self.project_path = Some(project_path.into());
        self
    }

    /// Filters by tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the page start.
    #[must_use]
    pub const fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// All words to match: the free-text query split on whitespace plus the
    /// explicit terms, lowercased.
    #[must_use]
    pub fn words(&self) -> Vec<String> {
        let mut words: Vec<String> = self
            .query
            .iter()
            .flat_map(|q| q.split_whitespace())
            .chain(self.terms.iter().map(String::as_str))
            .map(str::to_lowercase)
            .collect();
        words.dedup();
        words
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// One page of results with the metadata needed to fetch the next.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    /// The page of results.
    pub results: Vec<T>,
    /// Total matches for the query across all pages.
    pub total_count: usize,
    /// Page size requested.
    pub limit: usize,
    /// Page start requested.
    pub offset: usize,
    /// Whether more results exist past this page.
    pub has_more: bool,
    /// Offset of the next page, present iff `has_more`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

impl<T> PaginatedResult<T> {
    /// Builds a page, deriving `has_more` and `next_offset` from the counts.
    #[must_use]
    pub fn new(results: Vec<T>, total_count: usize, limit: usize, offset: usize) -> Self {
        let has_more = offset + results.len() < total_count;
        Self {
            results,
            total_count,
            limit,
            offset,
            has_more,
            next_offset: has_more.then_some(offset + limit),
        }
    }

    /// Returns true if the page holds no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
