//! Row conversion between executor rows and model types.

use super::executor::CypherRow;
use crate::models::{
    ContextStructure, Memory, MemoryContext, MemoryId, MemoryType, Relationship, RelationshipId,
    RelationshipProperties, RelationshipType,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Return clause reading a full memory node aliased `m`.
pub const MEMORY_RETURN: &str = "RETURN m.id AS id, m.memory_type AS memory_type, \
     m.title AS title, m.content AS content, m.summary AS summary, m.tags AS tags, \
     m.importance AS importance, m.confidence AS confidence, m.context AS context, \
     m.created_at AS created_at, m.updated_at AS updated_at, \
     m.last_accessed AS last_accessed, m.version AS version";

/// Return clause reading a full relationship aliased `r` between `a` and `b`.
pub const RELATIONSHIP_RETURN: &str = "RETURN r.id AS id, a.id AS from_id, b.id AS to_id, \
     type(r) AS rel_type, r.strength AS strength, r.confidence AS confidence, \
     r.context AS context, r.valid_from AS valid_from, r.valid_until AS valid_until, \
     r.recorded_at AS recorded_at, r.invalidated_by AS invalidated_by";

fn missing(key: &str) -> Error {
    Error::backend("parse_row", format!("missing or mistyped column: {key}"))
}

/// Reads a required string column.
pub fn get_str(row: &CypherRow, key: &str) -> Result<String> {
    row.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing(key))
}

/// Reads an optional string column (absent or null both count as unset).
#[must_use]
pub fn opt_str(row: &CypherRow, key: &str) -> Option<String> {
    row.get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// Reads a required float column.
pub fn get_f64(row: &CypherRow, key: &str) -> Result<f64> {
    row.get(key)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| missing(key))
}

/// Reads a required integer column.
pub fn get_i64(row: &CypherRow, key: &str) -> Result<i64> {
    row.get(key)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| missing(key))
}

/// Reads a required timestamp column (RFC 3339 string).
pub fn get_ts(row: &CypherRow, key: &str) -> Result<DateTime<Utc>> {
    let raw = get_str(row, key)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| missing(key))
}

/// Reads an optional timestamp column.
#[must_use]
pub fn opt_ts(row: &CypherRow, key: &str) -> Option<DateTime<Utc>> {
    opt_str(row, key)
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses a memory from a row shaped by [`MEMORY_RETURN`].
pub fn parse_memory(row: &CypherRow) -> Result<Memory> {
    let tags = row
        .get("tags")
        .and_then(serde_json::Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let context: Option<MemoryContext> =
        opt_str(row, "context").and_then(|s| serde_json::from_str(&s).ok());

    Ok(Memory {
        id: MemoryId::new(get_str(row, "id")?),
        memory_type: MemoryType::parse(&get_str(row, "memory_type")?)
            .unwrap_or(MemoryType::General),
        title: get_str(row, "title")?,
        content: get_str(row, "content")?,
        summary: opt_str(row, "summary"),
        tags,
        importance: get_f64(row, "importance")?,
        confidence: get_f64(row, "confidence")?,
        context,
        created_at: get_ts(row, "created_at")?,
        updated_at: get_ts(row, "updated_at")?,
        last_accessed: get_ts(row, "last_accessed")?,
        version: get_i64(row, "version")?,
    })
}

/// Parses a relationship from a row shaped by [`RELATIONSHIP_RETURN`].
///
/// A null `valid_from`/`recorded_at` (legacy edges awaiting the bi-temporal
/// backfill) falls back to the other field, then to the epoch.
pub fn parse_relationship(row: &CypherRow) -> Result<Relationship> {
    let context: Option<ContextStructure> =
        opt_str(row, "context").and_then(|s| serde_json::from_str(&s).ok());
    let valid_from = opt_ts(row, "valid_from");
    let recorded_at = opt_ts(row, "recorded_at");
    let valid_from = valid_from
        .or(recorded_at)
        .unwrap_or(DateTime::UNIX_EPOCH);

    Ok(Relationship {
        id: RelationshipId::new(get_str(row, "id")?),
        from_memory_id: MemoryId::new(get_str(row, "from_id")?),
        to_memory_id: MemoryId::new(get_str(row, "to_id")?),
        relationship_type: RelationshipType::parse(&get_str(row, "rel_type")?)
            .unwrap_or(RelationshipType::RelatedTo),
        properties: RelationshipProperties {
            strength: get_f64(row, "strength")?,
            confidence: get_f64(row, "confidence")?,
            context,
            valid_from,
            valid_until: opt_ts(row, "valid_until"),
            recorded_at: recorded_at.unwrap_or(valid_from),
            invalidated_by: opt_str(row, "invalidated_by").map(RelationshipId::new),
        },
    })
}
