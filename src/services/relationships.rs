//! The temporal relationship engine.
//!
//! Owns the lifecycle of bi-temporal edges. Each logical edge slot
//! (from, to, type) moves through a one-way state machine:
//!
//! ```text
//! Valid (valid_until = null) --invalidate--> Invalidated (valid_until set)
//! ```
//!
//! Invalidated is terminal; superseding a fact means recording a *new*
//! Valid edge for the slot, optionally linked from the old one via
//! `invalidated_by`. Nothing here mutates history.

use crate::models::{
    ChangeSet, ContextFilter, MAX_LIMIT, Memory, MemoryId, PaginatedResult, Relationship,
    RelationshipDraft, RelationshipId, RelationshipProperties, RelationshipType,
};
use crate::services::CycleDetector;
use crate::storage::MemoryBackend;
use crate::validation::{parse_timestamp, validate_relationship_context};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Temporal relationship operations over a backend.
pub struct RelationshipService<B: MemoryBackend + ?Sized> {
    backend: Arc<B>,
    cycle_check: bool,
}

impl<B: MemoryBackend + ?Sized> RelationshipService<B> {
    /// Creates a service with cycle checking disabled (the default: the
    /// detector is advisory and call sites opt in).
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            cycle_check: false,
        }
    }

    /// Enables or disables cycle checking on creation.
    ///
    /// When enabled, `create_relationship` refuses an edge that would close
    /// a cycle of its own type with [`Error::Relationship`].
    #[must_use]
    pub const fn with_cycle_check(mut self, cycle_check: bool) -> Self {
        self.cycle_check = cycle_check;
        self
    }

    /// Returns a reference to the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a relationship between two existing memories.
    ///
    /// Validation runs first and fails with no side effects: the context
    /// length limit, then the `valid_from` timestamp parse. A `valid_from`
    /// in the future is accepted but logged. `recorded_at` is always the
    /// moment of this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a malformed timestamp or oversized
    /// context, and [`Error::Relationship`] for a missing endpoint, an
    /// occupied slot, or (with cycle checking on) a cycle-closing edge.
    pub fn create_relationship(
        &self,
        from: &MemoryId,
        to: &MemoryId,
        relationship_type: RelationshipType,
        draft: RelationshipDraft,
    ) -> Result<RelationshipId> {
        if let Some(ref context) = draft.context {
            validate_relationship_context(&context.text)?;
        }

        let now = Utc::now();
        let valid_from = match draft.valid_from {
            Some(ref raw) => parse_timestamp(raw)?,
            None => now,
        };
        if valid_from > now {
            tracing::warn!(
                from = %from,
                to = %to,
                relationship_type = %relationship_type,
                valid_from = %valid_from,
                "relationship valid_from is in the future"
            );
        }

        if self.cycle_check
            && CycleDetector::new(Arc::clone(&self.backend)).has_cycle(
                from,
                to,
                relationship_type,
            )?
        {
            return Err(Error::Relationship(format!(
                "creating {relationship_type} from {from} to {to} would close a cycle"
            )));
        }

        let mut properties = RelationshipProperties::new()
            .with_strength(draft.strength.unwrap_or(0.5))
            .with_confidence(draft.confidence.unwrap_or(0.8))
            .with_valid_from(valid_from);
        properties.recorded_at = now;
        properties.context = draft.context;

        let relationship = Relationship::new(from.clone(), to.clone(), relationship_type)
            .with_properties(properties);
        self.backend.create_relationship(&relationship)
    }

    /// Retrieves a relationship by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>> {
        self.backend.get_relationship(id)
    }

    /// Invalidates a currently-valid relationship as of now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Relationship`] if the relationship does not exist
    /// or is already invalidated.
    pub fn invalidate_relationship(
        &self,
        id: &RelationshipId,
        invalidated_by: Option<&RelationshipId>,
    ) -> Result<()> {
        self.invalidate_relationship_at(id, invalidated_by, Utc::now())
    }

    /// Invalidates a currently-valid relationship at an explicit instant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Relationship`] if the relationship does not exist
    /// or is already invalidated, and [`Error::Validation`] if the instant
    /// precedes the relationship's `valid_from`.
    pub fn invalidate_relationship_at(
        &self,
        id: &RelationshipId,
        invalidated_by: Option<&RelationshipId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.backend.invalidate_relationship(id, invalidated_by, at)
    }

    /// Returns memories related to a memory within `max_depth` hops.
    ///
    /// Without `as_of`, only currently-valid edges qualify. With `as_of`,
    /// an edge qualifies iff `valid_from <= as_of` and `valid_until` is
    /// unset or strictly after `as_of`, reconstructing the graph as it was
    /// at that instant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the starting memory does not exist.
    pub fn get_related_memories(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        max_depth: u32,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Memory, Relationship)>> {
        self.backend
            .get_related_memories(memory_id, types, max_depth, as_of)
    }

    /// Returns every version of a memory's relationships, Valid and
    /// Invalidated, ordered by `valid_from` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an out-of-range limit.
    pub fn get_relationship_history(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        limit: usize,
        offset: usize,
    ) -> Result<PaginatedResult<Relationship>> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT} (got {limit})"
            )));
        }
        self.backend
            .get_relationship_history(memory_id, types, limit, offset)
    }

    /// Returns relationships recorded or invalidated since an instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn what_changed(&self, since: DateTime<Utc>) -> Result<ChangeSet> {
        self.backend.what_changed(since)
    }

    /// Returns relationships whose stored context matches the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_relationships_by_context(
        &self,
        filter: &ContextFilter,
    ) -> Result<Vec<Relationship>> {
        self.backend.search_relationships_by_context(filter)
    }
}
