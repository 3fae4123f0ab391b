// Allow non-const functions that use f64::clamp (not const-stable yet)
#![allow(clippy::missing_const_for_fn)]

//! Relationship types for the bi-temporal graph.
//!
//! A [`Relationship`] is a directed, typed edge between two memories. Edges
//! are versioned bi-temporally: `valid_from`/`valid_until` track when the
//! fact was true, `recorded_at` tracks when the system learned it. An edge
//! is never mutated once invalidated; superseding a fact means closing the
//! old edge and recording a new one, optionally linked via `invalidated_by`.
//!
//! # Relationship Types
//!
//! The 35 types are grouped into seven semantic families:
//!
//! | Family | Types |
//! |--------|-------|
//! | Causal | `Causes`, `CausedBy`, `LeadsTo`, `Triggers`, `Prevents` |
//! | Solution | `Solves`, `Addresses`, `Fixes`, `WorkaroundFor`, `AlternativeTo` |
//! | Context | `RelatedTo`, `PartOf`, `Contains`, `OccurredIn`, `AppliesTo` |
//! | Learning | `LearnedFrom`, `Teaches`, `DerivedFrom`, `Generalizes`, `Specializes` |
//! | Similarity | `SimilarTo`, `VariantOf`, `DuplicateOf`, `Replaces`, `Supersedes` |
//! | Workflow | `Follows`, `Precedes`, `DependsOn`, `Requires`, `Blocks` |
//! | Quality | `Improves`, `Degrades`, `Validates`, `Contradicts`, `Confirms` |

use crate::models::ContextStructure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(String);

impl RelationshipId {
    /// Creates a relationship ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique relationship ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("rel_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RelationshipId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RelationshipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RelationshipId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Semantic family a relationship type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipFamily {
    /// Cause-and-effect connections.
    Causal,
    /// Problem-solving connections.
    Solution,
    /// Containment and applicability.
    Context,
    /// Knowledge derivation and transfer.
    Learning,
    /// Resemblance and replacement.
    Similarity,
    /// Ordering and dependency.
    Workflow,
    /// Effect on quality and truth.
    Quality,
}

impl RelationshipFamily {
    /// Returns the family as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Causal => "causal",
            Self::Solution => "solution",
            Self::Context => "context",
            Self::Learning => "learning",
            Self::Similarity => "similarity",
            Self::Workflow => "workflow",
            Self::Quality => "quality",
        }
    }
}

impl fmt::Display for RelationshipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

macro_rules! relationship_types {
    ($( $family:ident => { $( $variant:ident = $name:literal ),+ $(,)? } ),+ $(,)?) => {
        /// Type of a directed edge between two memories.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum RelationshipType {
            $( $(
                #[doc = concat!("`", $name, "` (", stringify!($family), " family).")]
                $variant,
            )+ )+
        }

        impl RelationshipType {
            /// Returns all relationship type variants.
            #[must_use]
            pub const fn all() -> &'static [Self] {
                &[ $( $( Self::$variant, )+ )+ ]
            }

            /// Returns the relationship type as its wire string.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $( $( Self::$variant => $name, )+ )+
                }
            }

            /// Returns the semantic family of this type.
            #[must_use]
            pub const fn family(&self) -> RelationshipFamily {
                match self {
                    $( $( Self::$variant )|+ => RelationshipFamily::$family, )+
                }
            }

            /// Parses a relationship type from its wire string.
            #[must_use]
            pub fn parse(s: &str) -> Option<Self> {
                match s.to_uppercase().replace('-', "_").as_str() {
                    $( $( $name => Some(Self::$variant), )+ )+
                    _ => None,
                }
            }
        }
    };
}

relationship_types! {
    Causal => {
        Causes = "CAUSES",
        CausedBy = "CAUSED_BY",
        LeadsTo = "LEADS_TO",
        Triggers = "TRIGGERS",
        Prevents = "PREVENTS",
    },
    Solution => {
        Solves = "SOLVES",
        Addresses = "ADDRESSES",
        Fixes = "FIXES",
        WorkaroundFor = "WORKAROUND_FOR",
        AlternativeTo = "ALTERNATIVE_TO",
    },
    Context => {
        RelatedTo = "RELATED_TO",
        PartOf = "PART_OF",
        Contains = "CONTAINS",
        OccurredIn = "OCCURRED_IN",
        AppliesTo = "APPLIES_TO",
    },
    Learning => {
        LearnedFrom = "LEARNED_FROM",
        Teaches = "TEACHES",
        DerivedFrom = "DERIVED_FROM",
        Generalizes = "GENERALIZES",
        Specializes = "SPECIALIZES",
    },
    Similarity => {
        SimilarTo = "SIMILAR_TO",
        VariantOf = "VARIANT_OF",
        DuplicateOf = "DUPLICATE_OF",
        Replaces = "REPLACES",
        Supersedes = "SUPERSEDES",
    },
    Workflow => {
        Follows = "FOLLOWS",
        Precedes = "PRECEDES",
        DependsOn = "DEPENDS_ON",
        Requires = "REQUIRES",
        Blocks = "BLOCKS",
    },
    Quality => {
        Improves = "IMPROVES",
        Degrades = "DEGRADES",
        Validates = "VALIDATES",
        Contradicts = "CONTRADICTS",
        Confirms = "CONFIRMS",
    },
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relationship type: {s}"))
    }
}

/// Scoring and bi-temporal metadata carried by a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipProperties {
    /// Strength of the connection in `[0.0, 1.0]`.
    pub strength: f64,
    /// Confidence in the connection in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Structured context produced by the external extractor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextStructure>,
    /// When the fact became true.
    pub valid_from: DateTime<Utc>,
    /// When the fact stopped being true; `None` means currently valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// When the system learned the fact. Immutable after creation.
    pub recorded_at: DateTime<Utc>,
    /// Relationship that superseded this one, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidated_by: Option<RelationshipId>,
}

impl RelationshipProperties {
    /// Creates properties valid from now, with default scores.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            strength: 0.5,
            confidence: 0.8,
            context: None,
            valid_from: now,
            valid_until: None,
            recorded_at: now,
            invalidated_by: None,
        }
    }

    /// Sets the strength score, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    /// Sets the confidence score, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the structured context.
    #[must_use]
    pub fn with_context(mut self, context: ContextStructure) -> Self {
        self.context = Some(context);
        self
    }

    /// Sets the start of validity.
    #[must_use]
    pub const fn with_valid_from(mut self, valid_from: DateTime<Utc>) -> Self {
        self.valid_from = valid_from;
        self
    }
}

impl Default for RelationshipProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// A directed, typed, bi-temporally versioned edge between two memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier.
    pub id: RelationshipId,
    /// Source memory.
    pub from_memory_id: super::MemoryId,
    /// Target memory.
    pub to_memory_id: super::MemoryId,
    /// Edge type.
    pub relationship_type: RelationshipType,
    /// Scoring and temporal metadata.
    pub properties: RelationshipProperties,
}

impl Relationship {
    /// Creates a new relationship with generated id and default properties.
    #[must_use]
    pub fn new(
        from_memory_id: super::MemoryId,
        to_memory_id: super::MemoryId,
        relationship_type: RelationshipType,
    ) -> Self {
        Self {
            id: RelationshipId::generate(),
            from_memory_id,
            to_memory_id,
            relationship_type,
            properties: RelationshipProperties::new(),
        }
    }

    /// Replaces the properties.
    #[must_use]
    pub fn with_properties(mut self, properties: RelationshipProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Returns true if this edge is currently valid (`valid_until` unset).
    #[must_use]
    pub const fn is_current(&self) -> bool {
        self.properties.valid_until.is_none()
    }

    /// Returns true if this edge was valid at the given instant.
    ///
    /// An edge qualifies iff `valid_from <= as_of` and `valid_until` is
    /// either unset or strictly after `as_of` (half-open interval).
    #[must_use]
    pub fn is_valid_at(&self, as_of: DateTime<Utc>) -> bool {
        self.properties.valid_from <= as_of
            && self.properties.valid_until.is_none_or(|until| until > as_of)
    }
}

/// Caller-supplied inputs for creating a relationship.
///
/// `valid_from` is an ISO 8601 string because it typically arrives from an
/// external caller; parsing happens inside the relationship service so a
/// malformed timestamp fails validation before any I/O.
#[derive(Debug, Clone, Default)]
pub struct RelationshipDraft {
    /// Strength of the connection (defaults to 0.5).
    pub strength: Option<f64>,
    /// Confidence in the connection (defaults to 0.8).
    pub confidence: Option<f64>,
    /// Structured context from the external extractor.
    pub context: Option<ContextStructure>,
    /// Explicit start of validity; defaults to now when unset.
    pub valid_from: Option<String>,
}

impl RelationshipDraft {
    /// Creates an empty draft.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strength score.
    #[must_use]
    pub const fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Sets the confidence score.
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Sets the structured context.
    #[must_use]
    pub fn with_context(mut self, context: ContextStructure) -> Self {
        self.context = Some(context);
        self
    }

    /// Sets an explicit start of validity as an ISO 8601 timestamp.
    #[must_use]
    pub fn with_valid_from(mut self, valid_from: impl Into<String>) -> Self {
        self.valid_from = Some(valid_from.into());
        self
    }
}

/// Relationship changes since a given instant.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Edges recorded after the instant.
    pub new: Vec<Relationship>,
    /// Edges invalidated after the instant.
    pub invalidated: Vec<Relationship>,
}

impl ChangeSet {
    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.invalidated.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::models::MemoryId;
    use chrono::TimeZone;

    #[test]
    fn test_relationship_id_generate() {
        let id = RelationshipId::generate();
        assert!(id.as_str().starts_with("rel_"));
    }

    #[test]
    fn test_type_count_and_families() {
        assert_eq!(RelationshipType::all().len(), 35);
        for family in [
            RelationshipFamily::Causal,
            RelationshipFamily::Solution,
            RelationshipFamily::Context,
            RelationshipFamily::Learning,
            RelationshipFamily::Similarity,
            RelationshipFamily::Workflow,
            RelationshipFamily::Quality,
        ] {
            let count = RelationshipType::all()
                .iter()
                .filter(|t| t.family() == family)
                .count();
            assert_eq!(count, 5, "family {family} should have 5 types");
        }
    }

    #[test]
    fn test_type_parse_roundtrip() {
        for t in RelationshipType::all() {
            assert_eq!(RelationshipType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(RelationshipType::parse("solves"), Some(RelationshipType::Solves));
        assert_eq!(
            RelationshipType::parse("depends-on"),
            Some(RelationshipType::DependsOn)
        );
        assert_eq!(RelationshipType::parse("UNKNOWN_EDGE"), None);
    }

    #[test]
    fn test_family_assignment() {
        assert_eq!(RelationshipType::Causes.family(), RelationshipFamily::Causal);
        assert_eq!(RelationshipType::Solves.family(), RelationshipFamily::Solution);
        assert_eq!(RelationshipType::Blocks.family(), RelationshipFamily::Workflow);
        assert_eq!(RelationshipType::Confirms.family(), RelationshipFamily::Quality);
    }

    #[test]
    fn test_properties_defaults_and_clamping() {
        let props = RelationshipProperties::new();
        assert_eq!(props.strength, 0.5);
        assert_eq!(props.confidence, 0.8);
        assert!(props.valid_until.is_none());
        assert!(props.invalidated_by.is_none());

        let props = RelationshipProperties::new().with_strength(2.0).with_confidence(-1.0);
        assert_eq!(props.strength, 1.0);
        assert_eq!(props.confidence, 0.0);
    }

    #[test]
    fn test_point_in_time_qualification() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().unwrap();

        let mut rel = Relationship::new(
            MemoryId::new("mem_a"),
            MemoryId::new("mem_b"),
            RelationshipType::Solves,
        );
        rel.properties.valid_from = t0;
        rel.properties.valid_until = Some(t1);

        assert!(rel.is_valid_at(t0)); // start is inclusive
        assert!(rel.is_valid_at(t0 + chrono::Duration::days(30)));
        assert!(!rel.is_valid_at(t1)); // end is exclusive
        assert!(!rel.is_valid_at(t0 - chrono::Duration::seconds(1)));
        assert!(!rel.is_current());

        rel.properties.valid_until = None;
        assert!(rel.is_current());
        assert!(rel.is_valid_at(t1 + chrono::Duration::days(365)));
    }
}
