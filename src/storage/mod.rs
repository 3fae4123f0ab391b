//! Storage backends.
//!
//! Every storage engine satisfies one contract, [`MemoryBackend`], so the
//! services above it are backend-agnostic. Two engines ship with the crate:
//!
//! | Backend | Query paradigm | Module |
//! |---------|----------------|--------|
//! | [`SqliteBackend`] | Bind-parameter SQL, embedded | [`sqlite`] |
//! | [`CypherBackend`] | Generated Cypher text, remote | [`cypher`] |
//!
//! Both speak the same logical queries; the Cypher engine renders every
//! value as a validated literal because its dialect has no parameter
//! binding (see [`cypher::params`]).

mod backend;
pub mod cypher;
pub mod sqlite;

pub use backend::MemoryBackend;
pub use cypher::{CypherBackend, CypherExecutor, HttpCypherExecutor};
pub use sqlite::SqliteBackend;

use crate::config::{BackendConfig, MemoryGraphConfig};
use crate::models::{MemoryType, RelationshipType};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Capability flags a backend reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Whether the backend executes a textual query language (e.g. Cypher).
    pub supports_query_language: bool,
    /// Whether the backend has native full-text indexing.
    pub supports_fulltext: bool,
    /// Whether the backend supports transactions.
    pub supports_transactions: bool,
}

/// Result of a health probe.
///
/// Health checks never return an error: failures are folded into the
/// report so monitoring paths cannot themselves fail.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Whether the backend answered its probe within the timeout.
    pub healthy: bool,
    /// Backend name.
    pub backend: &'static str,
    /// Whether a connection is currently established.
    pub connected: bool,
    /// Probe round-trip time, when the probe ran.
    pub latency: Option<Duration>,
    /// Failure description, when unhealthy.
    pub error: Option<String>,
}

/// Aggregate counts over the stored graph.
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// Total memories.
    pub memory_count: usize,
    /// Memories per type.
    pub memories_by_type: HashMap<MemoryType, usize>,
    /// Total relationships, current and historical.
    pub relationship_count: usize,
    /// Relationships with `valid_until` unset.
    pub current_relationship_count: usize,
    /// Relationships per type (current and historical).
    pub relationships_by_type: HashMap<RelationshipType, usize>,
}

/// A forward-only, additive data migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    /// Backfill `valid_from`/`recorded_at` from the legacy creation
    /// timestamp and create the three temporal indexes.
    BitemporalBackfill,
    /// Backfill tenant id and visibility defaults and create the tenant
    /// index.
    TenancyBackfill,
}

impl MigrationStep {
    /// Returns the step as a short name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BitemporalBackfill => "bitemporal_backfill",
            Self::TenancyBackfill => "tenancy_backfill",
        }
    }

    /// All steps, in application order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::BitemporalBackfill, Self::TenancyBackfill]
    }
}

/// How a migration step is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Apply the step.
    Apply,
    /// Count intended mutations without writing anything.
    DryRun,
    /// Clear the fields the step added and drop its indexes. Columns are
    /// never dropped; not every backend can do that cheaply.
    Rollback,
}

impl MigrationMode {
    /// Returns the mode as a short name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::DryRun => "dry_run",
            Self::Rollback => "rollback",
        }
    }
}

/// Outcome of one migration step, identical in shape for every backend and
/// mode.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// The step that ran.
    pub step: MigrationStep,
    /// The mode it ran in.
    pub mode: MigrationMode,
    /// Rows updated (or, in dry-run, the count that would be updated).
    pub rows_affected: usize,
    /// Indexes created or dropped.
    pub indexes_changed: usize,
    /// Non-fatal problems encountered along the way.
    pub errors: Vec<String>,
}

impl MigrationReport {
    /// Returns true if the step completed without recorded errors.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Constructs the backend selected by the configuration and connects it.
///
/// Dispatch happens exactly once, here; everything downstream works through
/// the [`MemoryBackend`] trait object.
///
/// # Errors
///
/// Returns [`crate::Error::Connection`] if the backend cannot be opened.
pub fn open_backend(config: &MemoryGraphConfig) -> Result<Arc<dyn MemoryBackend>> {
    let backend: Arc<dyn MemoryBackend> = match &config.backend {
        BackendConfig::Sqlite { path } => match path {
            Some(path) => Arc::new(SqliteBackend::open(path)?),
            None => Arc::new(SqliteBackend::in_memory()?),
        },
        BackendConfig::Cypher { endpoint } => Arc::new(CypherBackend::new(
            HttpCypherExecutor::new(endpoint, config.request_timeout)?,
        )),
    };
    backend.connect()?;
    backend.initialize_schema()?;
    Ok(backend)
}
