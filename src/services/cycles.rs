//! Cycle detection over typed edges.

use crate::models::{MemoryId, RelationshipType};
use crate::storage::MemoryBackend;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Default traversal depth bound.
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Detects whether a proposed edge would close a cycle.
///
/// The check walks only *current* outgoing edges of the proposed edge's own
/// type: a `SOLVES` edge cannot close a cycle through `CAUSES` edges.
///
/// # Depth bound
///
/// Traversal is cut off at `max_depth` hops, and anything beyond the bound
/// is reported as "no cycle". The guarantee is therefore approximate: a
/// cycle whose back-path is longer than `max_depth` goes undetected. This
/// is deliberate; exhaustive detection on unbounded graphs is not a goal.
///
/// # Enforcement
///
/// The detector is advisory. Relationship creation does not invoke it
/// unless [`RelationshipService`](crate::services::RelationshipService) was
/// built with cycle checking enabled; call sites choose.
pub struct CycleDetector<B: MemoryBackend + ?Sized> {
    backend: Arc<B>,
    max_depth: u32,
}

impl<B: MemoryBackend + ?Sized> CycleDetector<B> {
    /// Creates a detector with the default depth bound.
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets the traversal depth bound.
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns true if creating `from -> to` of the given type would close
    /// a cycle.
    ///
    /// A self-loop (`from == to`) is always a cycle. Otherwise the detector
    /// runs a depth-first search from `to` and reports whether `from` is
    /// reachable over current edges of the same type.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge lookup fails.
    pub fn has_cycle(
        &self,
        from: &MemoryId,
        to: &MemoryId,
        relationship_type: RelationshipType,
    ) -> Result<bool> {
        if from == to {
            tracing::debug!(memory_id = %from, "cycle detected: self-loop");
            return Ok(true);
        }

        let mut visited: HashSet<MemoryId> = HashSet::new();
        let mut stack: Vec<(MemoryId, u32)> = vec![(to.clone(), 0)];

        while let Some((current, depth)) = stack.pop() {
            if current == *from {
                tracing::debug!(
                    from = %from,
                    to = %to,
                    relationship_type = %relationship_type,
                    "cycle detected: target is reachable"
                );
                return Ok(true);
            }
            if depth >= self.max_depth {
                tracing::warn!(max_depth = self.max_depth, "cycle detection depth limit reached");
                continue;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for neighbor in self.backend.outgoing_neighbors(&current, relationship_type)? {
                stack.push((neighbor, depth + 1));
            }
        }

        Ok(false)
    }
}
