//! Data model types.

mod context;
mod memory;
mod relationship;
mod search;

pub use context::{ContextFilter, ContextScope, ContextStructure};
pub use memory::{Memory, MemoryContext, MemoryId, MemoryType, MemoryUpdate, Visibility};
pub use relationship::{
    ChangeSet, Relationship, RelationshipDraft, RelationshipFamily, RelationshipId,
    RelationshipProperties, RelationshipType,
};
pub use search::{DEFAULT_LIMIT, MAX_LIMIT, MatchMode, PaginatedResult, SearchQuery, SearchTolerance};
