//! Service layer over the storage backends.
//!
//! Services validate input before any I/O and add the policy the backends
//! deliberately do not own: defaulting, timestamp parsing, optional cycle
//! enforcement, and migration orchestration. All storage happens through
//! the [`MemoryBackend`](crate::storage::MemoryBackend) trait, so every
//! service works with either engine.

mod cycles;
mod memories;
mod migration;
mod relationships;

pub use cycles::{CycleDetector, DEFAULT_MAX_DEPTH};
pub use memories::MemoryService;
pub use migration::MigrationRunner;
pub use relationships::RelationshipService;
