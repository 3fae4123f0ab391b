//! Memory CRUD service.

use crate::models::{Memory, MemoryId, MemoryUpdate, PaginatedResult, SearchQuery};
use crate::storage::{MemoryBackend, StorageStats};
use crate::validation::{validate_memory, validate_memory_update, validate_search_query};
use crate::Result;
use std::sync::Arc;

/// Validated memory operations over a backend.
///
/// # Thread Safety
///
/// The service is thread-safe when the underlying backend is; both shipped
/// backends are.
pub struct MemoryService<B: MemoryBackend + ?Sized> {
    backend: Arc<B>,
}

impl<B: MemoryBackend + ?Sized> MemoryService<B> {
    /// Creates a service over a shared backend.
    #[must_use]
    pub const fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Returns a reference to the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Validates and stores a memory, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] before any I/O when the memory
    /// breaks a size limit.
    pub fn store_memory(&self, memory: &Memory) -> Result<MemoryId> {
        validate_memory(memory)?;
        self.backend.store_memory(memory)
    }

    /// Retrieves a memory by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        self.backend.get_memory(id)
    }

    /// Validates and applies a partial update.
    ///
    /// Returns `true` if the memory existed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for an empty or oversized
    /// update.
    pub fn update_memory(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<bool> {
        validate_memory_update(update)?;
        self.backend.update_memory(id, update)
    }

    /// Deletes a memory, cascading to its relationships.
    ///
    /// Returns `true` if the memory existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        self.backend.delete_memory(id)
    }

    /// Searches memories, returning one page.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for an out-of-range limit or an
    /// oversized query.
    pub fn search_memories(&self, query: &SearchQuery) -> Result<Vec<Memory>> {
        validate_search_query(query)?;
        self.backend.search_memories(query)
    }

    /// Searches memories with pagination metadata.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for an out-of-range limit or an
    /// oversized query.
    pub fn search_memories_paginated(&self, query: &SearchQuery) -> Result<PaginatedResult<Memory>> {
        validate_search_query(query)?;
        self.backend.search_memories_paginated(query)
    }

    /// Returns aggregate counts over the stored graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the counts cannot be computed.
    pub fn get_statistics(&self) -> Result<StorageStats> {
        self.backend.get_statistics()
    }
}
