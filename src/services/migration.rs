//! Migration orchestration.
//!
//! Migrations are forward-only and additive: new columns/properties are
//! backfilled with defaults, never rewritten, and rollback clears the added
//! fields instead of dropping columns. Dry-run reports the intended
//! mutation counts without writing.

use crate::storage::{MemoryBackend, MigrationMode, MigrationReport, MigrationStep};
use crate::Result;
use std::sync::Arc;

/// Runs schema initialization and data migrations over a backend.
pub struct MigrationRunner<B: MemoryBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: MemoryBackend + ?Sized> MigrationRunner<B> {
    /// Creates a runner over a shared backend.
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Initializes the schema. Safe to call any number of times.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Schema`] if DDL fails.
    pub fn initialize(&self) -> Result<()> {
        self.backend.initialize_schema()
    }

    /// Runs a single migration step.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot be executed at all; partial
    /// problems (e.g. one index out of three) are recorded in the report's
    /// `errors` instead.
    pub fn run(&self, step: MigrationStep, mode: MigrationMode) -> Result<MigrationReport> {
        tracing::info!(step = step.as_str(), mode = mode.as_str(), "running migration step");
        let report = self.backend.apply_migration(step, mode)?;
        if !report.succeeded() {
            tracing::warn!(
                step = step.as_str(),
                errors = report.errors.len(),
                "migration step finished with errors"
            );
        }
        Ok(report)
    }

    /// Runs every known step in order, in the given mode.
    ///
    /// # Errors
    ///
    /// Returns the first hard failure; completed reports are lost in that
    /// case, so callers wanting partial results should run steps one by
    /// one.
    pub fn run_all(&self, mode: MigrationMode) -> Result<Vec<MigrationReport>> {
        MigrationStep::all()
            .iter()
            .map(|step| self.run(*step, mode))
            .collect()
    }

    /// Reports what `run_all(Apply)` would do, without writing.
    ///
    /// # Errors
    ///
    /// Returns an error if a count query fails.
    pub fn dry_run_all(&self) -> Result<Vec<MigrationReport>> {
        self.run_all(MigrationMode::DryRun)
    }
}
