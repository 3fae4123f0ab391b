//! # MemoryGraph
//!
//! A bi-temporal knowledge graph for persistent development memory.
//!
//! MemoryGraph stores typed memory records (problems, solutions, fixes,
//! patterns, ...) connected by typed relationships that track both when a
//! fact was true in the real world (`valid_from`/`valid_until`) and when the
//! system learned it (`recorded_at`). The graph is queryable through fuzzy
//! paginated search, point-in-time lookups, and bounded traversal, and is
//! portable across storage engines: an embedded `SQLite` store and
//! Cypher-speaking graph databases share one backend contract with
//! identical semantics.
//!
//! ## Features
//!
//! - Bi-temporal relationship versioning (invalidate, history, as-of queries)
//! - Fuzzy search with lightweight stemming and stable pagination
//! - Depth-bounded cycle detection over typed edges
//! - Pluggable backends (`SQLite` bind-parameter SQL, literal-substituted Cypher)
//! - Idempotent schema initialization and additive data migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use memorygraph::config::MemoryGraphConfig;
//! use memorygraph::services::RelationshipService;
//! use memorygraph::storage::open_backend;
//!
//! let backend = open_backend(&MemoryGraphConfig::default())?;
//! let relationships = RelationshipService::new(backend.clone());
//! let related = relationships.get_related_memories(&memory_id, None, 2, None)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod search;
pub mod services;
pub mod storage;
pub mod validation;

// Re-exports for convenience
pub use config::{BackendConfig, MemoryGraphConfig, TenancyMode};
pub use models::{
    ChangeSet, ContextFilter, ContextScope, ContextStructure, MatchMode, Memory, MemoryContext,
    MemoryId, MemoryType, MemoryUpdate, PaginatedResult, Relationship, RelationshipDraft,
    RelationshipId, RelationshipProperties, RelationshipType, SearchQuery, SearchTolerance,
    Visibility,
};
pub use services::{CycleDetector, MemoryService, MigrationRunner, RelationshipService};
pub use storage::{BackendCapabilities, HealthReport, MemoryBackend, StorageStats};

/// Error type for memorygraph operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Oversized or malformed input, caught before any I/O |
/// | `NotFound` | Memory or relationship id does not exist |
/// | `Relationship` | Missing endpoint, double invalidation, occupied edge slot |
/// | `Connection` | Transport unreachable or backend not connected |
/// | `Schema` | DDL or index creation failure |
/// | `Backend` | Generic I/O or timeout, wrapped with the failing operation |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Input failed validation before reaching storage.
    ///
    /// Raised when:
    /// - A size limit from [`validation`] is exceeded
    /// - A timestamp string is not valid ISO 8601
    /// - `limit`/`offset` fall outside their allowed ranges
    /// - An unknown memory or relationship type string is supplied
    #[error("validation failed: {0}")]
    Validation(String),

    /// A memory or relationship was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up ("memory" or "relationship").
        kind: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// A relationship operation violated the temporal model.
    ///
    /// Raised when:
    /// - An endpoint memory does not exist at creation time
    /// - A relationship is invalidated twice
    /// - A second current edge is created for an occupied (from, to, type) slot
    /// - A cycle-closing edge is rejected by an enforcing service
    #[error("relationship error: {0}")]
    Relationship(String),

    /// The storage transport is unreachable or not connected.
    #[error("connection error: {0}")]
    Connection(String),

    /// Schema initialization or migration DDL failed.
    #[error("schema error: {0}")]
    Schema(String),

    /// A backend operation failed.
    ///
    /// Wraps lower-level I/O and timeout errors with the name of the
    /// operation that failed so callers see context, never a raw backtrace.
    #[error("operation '{operation}' failed: {cause}")]
    Backend {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Wraps a lower-level error with the failing operation's name.
    pub fn backend(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Backend {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Shorthand for a memory lookup failure.
    pub fn memory_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "memory",
            id: id.into(),
        }
    }

    /// Shorthand for a relationship lookup failure.
    pub fn relationship_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "relationship",
            id: id.into(),
        }
    }
}

/// Result type alias for memorygraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("title too long".to_string());
        assert_eq!(err.to_string(), "validation failed: title too long");

        let err = Error::memory_not_found("mem_123");
        assert_eq!(err.to_string(), "memory not found: mem_123");

        let err = Error::backend("store_memory", "disk full");
        assert_eq!(err.to_string(), "operation 'store_memory' failed: disk full");
    }

    #[test]
    fn test_not_found_carries_identifier() {
        let err = Error::relationship_not_found("rel_abc");
        assert!(err.to_string().contains("rel_abc"));
    }
}
