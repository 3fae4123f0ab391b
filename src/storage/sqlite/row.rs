//! Row conversion between `SQLite` rows and model types.

use crate::models::{
    ContextStructure, Memory, MemoryContext, MemoryId, MemoryType, Relationship, RelationshipId,
    RelationshipProperties, RelationshipType,
};
use chrono::{DateTime, Utc};
use rusqlite::Row;

/// Converts a `DateTime` to the epoch-microseconds representation stored in
/// the database.
#[must_use]
pub fn to_micros(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

/// Converts stored epoch microseconds back to a `DateTime`.
///
/// Out-of-range values collapse to the epoch rather than failing the whole
/// row.
#[must_use]
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parses a memory from a full row (see [`super::sql::MEMORY_COLUMNS`]).
pub fn parse_memory_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let id: String = row.get("id")?;
    let memory_type_str: String = row.get("memory_type")?;
    let title: String = row.get("title")?;
    let content: String = row.get("content")?;
    let summary: Option<String> = row.get("summary")?;
    let tags_json: Option<String> = row.get("tags")?;
    let importance: f64 = row.get("importance")?;
    let confidence: f64 = row.get("confidence")?;
    let context_json: Option<String> = row.get("context")?;
    let created_at: i64 = row.get("created_at")?;
    let updated_at: i64 = row.get("updated_at")?;
    let last_accessed: i64 = row.get("last_accessed")?;
    let version: i64 = row.get("version")?;

    let tags: Vec<String> = tags_json
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let context: Option<MemoryContext> =
        context_json.and_then(|s| serde_json::from_str(&s).ok());

    Ok(Memory {
        id: MemoryId::new(id),
        memory_type: MemoryType::parse(&memory_type_str).unwrap_or(MemoryType::General),
        title,
        content,
        summary,
        tags,
        importance,
        confidence,
        context,
        created_at: from_micros(created_at),
        updated_at: from_micros(updated_at),
        last_accessed: from_micros(last_accessed),
        version,
    })
}

/// Parses a relationship from a full row (see
/// [`super::sql::RELATIONSHIP_COLUMNS`]).
///
/// A null `valid_from`/`recorded_at` (legacy rows awaiting the bi-temporal
/// backfill) falls back to the other field, then to the epoch.
pub fn parse_relationship_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let id: String = row.get("id")?;
    let from_id: String = row.get("from_id")?;
    let to_id: String = row.get("to_id")?;
    let rel_type_str: String = row.get("rel_type")?;
    let strength: f64 = row.get("strength")?;
    let confidence: f64 = row.get("confidence")?;
    let context_json: Option<String> = row.get("context")?;
    let valid_from: Option<i64> = row.get("valid_from")?;
    let valid_until: Option<i64> = row.get("valid_until")?;
    let recorded_at: Option<i64> = row.get("recorded_at")?;
    let invalidated_by: Option<String> = row.get("invalidated_by")?;

    let context: Option<ContextStructure> =
        context_json.and_then(|s| serde_json::from_str(&s).ok());
    let valid_from = valid_from.or(recorded_at).map_or(DateTime::UNIX_EPOCH, from_micros);
    let recorded_at = recorded_at.map_or(valid_from, from_micros);

    Ok(Relationship {
        id: RelationshipId::new(id),
        from_memory_id: MemoryId::new(from_id),
        to_memory_id: MemoryId::new(to_id),
        relationship_type: RelationshipType::parse(&rel_type_str)
            .unwrap_or(RelationshipType::RelatedTo),
        properties: RelationshipProperties {
            strength,
            confidence,
            context,
            valid_from,
            valid_until: valid_until.map(from_micros),
            recorded_at,
            invalidated_by: invalidated_by.map(RelationshipId::new),
        },
    })
}

/// Serializes a memory's JSON columns and denormalized filter columns.
pub struct MemoryColumns {
    /// JSON-encoded tag list.
    pub tags: String,
    /// JSON-encoded context, when present.
    pub context: Option<String>,
    /// Denormalized project path.
    pub project_path: Option<String>,
    /// Denormalized tenant id.
    pub tenant_id: Option<String>,
    /// Denormalized visibility level.
    pub visibility: Option<&'static str>,
}

impl MemoryColumns {
    /// Extracts the storable column values from a memory.
    #[must_use]
    pub fn from_memory(memory: &Memory) -> Self {
        let context_fields = memory.context.as_ref();
        Self {
            tags: serde_json::to_string(&memory.tags).unwrap_or_else(|_| "[]".to_string()),
            context: context_fields
                .and_then(|c| serde_json::to_string(c).ok()),
            project_path: context_fields.and_then(|c| c.project_path.clone()),
            tenant_id: context_fields.and_then(|c| c.tenant_id.clone()),
            visibility: context_fields
                .and_then(|c| c.visibility)
                .map(|v| v.as_str()),
        }
    }
}
