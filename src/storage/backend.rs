//! The storage backend contract.
//!
//! Every engine implements [`MemoryBackend`] and must produce identical
//! semantics for every operation, whatever its query paradigm. The
//! temporal qualification rule, the pagination contract, and the traversal
//! order are part of the contract, not backend discretion.
//!
//! # Implementor Notes
//!
//! - Methods use `&self` to enable sharing via `Arc<dyn MemoryBackend>`;
//!   use interior mutability (e.g. `Mutex<Connection>`) for mutable state.
//! - The trait does not guarantee internal parallelism: one connection per
//!   process, concurrent callers serialize through the backend's own lock
//!   or bring a pool.
//! - `initialize_schema` must be idempotent and tolerate concurrent
//!   invocation at process startup (create-if-absent DDL only).
//! - Ordering contracts: search pages are ordered importance descending,
//!   then `created_at` ascending, then id ascending; relationship history
//!   is ordered `valid_from` ascending, then id ascending.
//! - `total_count` must be computed against exactly the predicate that
//!   produced the page.

use crate::models::{
    ChangeSet, ContextFilter, Memory, MemoryId, MemoryUpdate, PaginatedResult, Relationship,
    RelationshipId, RelationshipType, SearchQuery,
};
use crate::storage::{
    BackendCapabilities, HealthReport, MigrationMode, MigrationReport, MigrationStep, StorageStats,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Trait for storage engines holding the memory graph.
pub trait MemoryBackend: Send + Sync {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Establishes the backend's connection.
    ///
    /// Calling `connect` on an already-connected backend is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the transport is unreachable.
    fn connect(&self) -> Result<()>;

    /// Releases the backend's connection.
    ///
    /// # Errors
    ///
    /// Returns an error if teardown fails.
    fn disconnect(&self) -> Result<()>;

    /// Creates tables/labels, constraints, and indexes if absent.
    ///
    /// Safe to call any number of times, including concurrently at startup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if DDL fails.
    fn initialize_schema(&self) -> Result<()>;

    // ========================================================================
    // Memory CRUD
    // ========================================================================

    /// Stores a memory and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn store_memory(&self, memory: &Memory) -> Result<MemoryId>;

    /// Retrieves a memory by id, refreshing its `last_accessed` timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>>;

    /// Applies a partial update to a memory, bumping `updated_at` and
    /// `version`.
    ///
    /// Returns `true` if the memory existed, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn update_memory(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<bool>;

    /// Deletes a memory and every relationship touching it.
    ///
    /// This is the only operation that hard-deletes relationships.
    /// Returns `true` if the memory existed, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete_memory(&self, id: &MemoryId) -> Result<bool>;

    // ========================================================================
    // Search
    // ========================================================================

    /// Searches memories, returning one page of results.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search_memories(&self, query: &SearchQuery) -> Result<Vec<Memory>> {
        Ok(self.search_memories_paginated(query)?.results)
    }

    /// Searches memories with full pagination metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search_memories_paginated(&self, query: &SearchQuery) -> Result<PaginatedResult<Memory>>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Stores a relationship and returns its id.
    ///
    /// Both endpoints must exist, and the (from, to, type) slot must not
    /// already hold a current edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Relationship`] for a missing endpoint or an
    /// occupied slot.
    fn create_relationship(&self, relationship: &Relationship) -> Result<RelationshipId>;

    /// Retrieves a relationship by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>>;

    /// Closes a currently-valid relationship at the given instant.
    ///
    /// The target must be Valid; invalidating an already-invalidated
    /// relationship is an error, never a silent no-op. History is immutable
    /// after this transition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Relationship`] if the relationship does not exist
    /// or is already invalidated.
    fn invalidate_relationship(
        &self,
        id: &RelationshipId,
        invalidated_by: Option<&RelationshipId>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Returns the single-hop relationships touching a memory, in either
    /// direction.
    ///
    /// With `as_of` unset, only current edges (`valid_until` unset) are
    /// returned; with `as_of` set, an edge qualifies iff
    /// `valid_from <= as_of` and `valid_until` is unset or `> as_of`.
    /// Ordered by `valid_from` ascending, then id ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn relationships_for(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<Relationship>>;

    /// Returns the targets of current outgoing edges of one type.
    ///
    /// This is the primitive the cycle detector walks.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn outgoing_neighbors(
        &self,
        memory_id: &MemoryId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<MemoryId>>;

    /// Collects memories reachable from a starting memory within
    /// `max_depth` hops, with the edge that reached each one.
    ///
    /// Breadth-first over [`MemoryBackend::relationships_for`], so current
    /// and point-in-time edge qualification is the same code path for every
    /// backend. Each edge appears at most once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the starting memory does not exist.
    fn get_related_memories(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        max_depth: u32,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<(Memory, Relationship)>> {
        if self.get_memory(memory_id)?.is_none() {
            return Err(Error::memory_not_found(memory_id.as_str()));
        }

        let mut visited: HashSet<MemoryId> = HashSet::from([memory_id.clone()]);
        let mut seen_edges: HashSet<RelationshipId> = HashSet::new();
        let mut frontier = vec![memory_id.clone()];
        let mut results = Vec::new();

        for _ in 0..max_depth {
            let mut next = Vec::new();
            for node in &frontier {
                for relationship in self.relationships_for(node, types, as_of)? {
                    if !seen_edges.insert(relationship.id.clone()) {
                        continue;
                    }
                    let other = if relationship.from_memory_id == *node {
                        relationship.to_memory_id.clone()
                    } else {
                        relationship.from_memory_id.clone()
                    };
                    if visited.insert(other.clone()) {
                        next.push(other.clone());
                    }
                    if let Some(memory) = self.get_memory(&other)? {
                        results.push((memory, relationship));
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        Ok(results)
    }

    /// Returns every version of the relationships touching a memory,
    /// Valid and Invalidated, ordered by `valid_from` ascending, paginated.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_relationship_history(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        limit: usize,
        offset: usize,
    ) -> Result<PaginatedResult<Relationship>>;

    /// Returns relationships recorded or invalidated after the given
    /// instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn what_changed(&self, since: DateTime<Utc>) -> Result<ChangeSet>;

    /// Returns relationships whose stored context structure matches the
    /// filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn search_relationships_by_context(&self, filter: &ContextFilter) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Executes one data migration step in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if DDL fails, or [`Error::Backend`] for
    /// I/O failures.
    fn apply_migration(&self, step: MigrationStep, mode: MigrationMode) -> Result<MigrationReport>;

    /// Returns aggregate counts over the stored graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the counts cannot be computed.
    fn get_statistics(&self) -> Result<StorageStats>;

    /// Probes the backend within a bounded timeout.
    ///
    /// Never returns an error: failure becomes an unhealthy report.
    fn health_check(&self) -> HealthReport;

    /// Reports what this backend supports.
    fn capabilities(&self) -> BackendCapabilities;

    /// Short backend name for logs and health reports.
    fn name(&self) -> &'static str;
}
