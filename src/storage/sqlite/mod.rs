//! Embedded `SQLite` backend.
//!
//! The local relational engine: bind-parameter SQL over a single
//! `Mutex<Connection>`. WAL mode and `busy_timeout` keep concurrent readers
//! civil; `foreign_keys` enforces the relationship cascade on memory
//! deletion.
//!
//! # Concurrency Model
//!
//! One connection for the process lifetime, serialized through the mutex.
//! The single-current-edge check and the subsequent insert in
//! [`create_relationship`](crate::storage::MemoryBackend::create_relationship)
//! share one transaction, so the invariant holds under concurrent callers.

// Allow cast_possible_truncation and cast_sign_loss for SQLite i64 to usize conversions.
// SQLite returns i64, but row counts and offsets are inherently non-negative and small.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

mod row;
mod sql;

pub use sql::escape_like_wildcards;

use crate::models::{
    ChangeSet, ContextFilter, MatchMode, Memory, MemoryId, MemoryUpdate, PaginatedResult,
    Relationship, RelationshipId, RelationshipType, SearchQuery,
};
use crate::search::expand_query;
use crate::storage::{
    BackendCapabilities, HealthReport, MemoryBackend, MigrationMode, MigrationReport,
    MigrationStep, StorageStats,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use row::{MemoryColumns, parse_memory_row, parse_relationship_row, to_micros};
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use sql::{
    CREATE_INDEXES, CREATE_MEMORIES_TABLE, CREATE_RELATIONSHIPS_TABLE, MEMORY_COLUMNS,
    RELATIONSHIP_COLUMNS, contains_pattern,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::instrument;

/// Helper to acquire the connection mutex with poison recovery.
fn acquire_lock(mutex: &Mutex<Option<Connection>>) -> MutexGuard<'_, Option<Connection>> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite connection mutex was poisoned, recovering");
            metrics::counter!("memorygraph_sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// `SQLite`-backed storage engine.
pub struct SqliteBackend {
    /// Connection slot; `None` while disconnected.
    conn: Mutex<Option<Connection>>,
    /// Database path (`None` for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file and connects immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the database cannot be opened.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let backend = Self {
            conn: Mutex::new(None),
            db_path: Some(db_path.into()),
        };
        backend.connect()?;
        Ok(backend)
    }

    /// Creates an in-memory database (useful for testing).
    ///
    /// Disconnecting an in-memory backend discards its data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let backend = Self {
            conn: Mutex::new(None),
            db_path: None,
        };
        backend.connect()?;
        Ok(backend)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn configure(conn: &Connection) {
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", "5000");
        let _ = conn.pragma_update(None, "foreign_keys", "ON");
    }

    /// Runs a read-style closure against the live connection.
    fn with_conn<T>(&self, operation: &str, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = acquire_lock(&self.conn);
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Connection(format!("not connected ({operation})")))?;
        f(conn)
    }

    /// Runs a transaction-capable closure against the live connection.
    fn with_conn_mut<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut guard = acquire_lock(&self.conn);
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::Connection(format!("not connected ({operation})")))?;
        f(conn)
    }

    /// Builds the WHERE clause for a search query.
    ///
    /// Text needle groups OR within a word and combine across words per the
    /// match mode; structural filters always AND. The same clause feeds both
    /// the COUNT and the page query so `total_count` cannot drift from the
    /// page predicate.
    fn build_search_where(query: &SearchQuery) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_params: Vec<Box<dyn ToSql>> = Vec::new();

        let groups = expand_query(query);
        if !groups.is_empty() {
            let mut group_clauses = Vec::new();
            for group in &groups {
                let mut needle_clauses = Vec::new();
                for needle in group {
                    let pattern = contains_pattern(&needle.text);
                    needle_clauses.push(
                        "(lower(title) LIKE ? ESCAPE '\\' \
                         OR lower(content) LIKE ? ESCAPE '\\' \
                         OR lower(coalesce(summary, '')) LIKE ? ESCAPE '\\' \
                         OR lower(coalesce(tags, '')) LIKE ? ESCAPE '\\')"
                            .to_string(),
                    );
                    for _ in 0..4 {
                        bind_params.push(Box::new(pattern.clone()));
                    }
                }
                group_clauses.push(format!("({})", needle_clauses.join(" OR ")));
            }
            let joiner = match query.match_mode {
                MatchMode::All => " AND ",
                MatchMode::Any => " OR ",
            };
            conditions.push(format!("({})", group_clauses.join(joiner)));
        }

        if let Some(memory_type) = query.memory_type {
            conditions.push("memory_type = ?".to_string());
            bind_params.push(Box::new(memory_type.as_str().to_string()));
        }
        for tag in &query.tags {
            conditions.push("coalesce(tags, '') LIKE ? ESCAPE '\\'".to_string());
            bind_params.push(Box::new(format!("%\"{}\"%", escape_like_wildcards(tag))));
        }
        if let Some(min_importance) = query.min_importance {
            conditions.push("importance >= ?".to_string());
            bind_params.push(Box::new(min_importance));
        }
        if let Some(min_confidence) = query.min_confidence {
            conditions.push("confidence >= ?".to_string());
            bind_params.push(Box::new(min_confidence));
        }
        if let Some(after) = query.created_after {
            conditions.push("created_at >= ?".to_string());
            bind_params.push(Box::new(to_micros(after)));
        }
        if let Some(before) = query.created_before {
            conditions.push("created_at < ?".to_string());
            bind_params.push(Box::new(to_micros(before)));
        }
        if let Some(ref project_path) = query.project_path {
            conditions.push("project_path = ?".to_string());
            bind_params.push(Box::new(project_path.clone()));
        }
        if let Some(ref tenant_id) = query.tenant_id {
            conditions.push("tenant_id = ?".to_string());
            bind_params.push(Box::new(tenant_id.clone()));
        }
        if let Some(visibility) = query.visibility {
            conditions.push("visibility = ?".to_string());
            bind_params.push(Box::new(visibility.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, bind_params)
    }

    /// Temporal qualifier fragment for relationship queries.
    fn temporal_clause(as_of: Option<DateTime<Utc>>, bind_params: &mut Vec<Box<dyn ToSql>>) -> String {
        as_of.map_or_else(
            || "valid_until IS NULL".to_string(),
            |as_of| {
                let micros = to_micros(as_of);
                bind_params.push(Box::new(micros));
                bind_params.push(Box::new(micros));
                "valid_from <= ? AND (valid_until IS NULL OR valid_until > ?)".to_string()
            },
        )
    }

    /// IN-list fragment for a relationship type filter.
    fn type_clause(
        types: Option<&[RelationshipType]>,
        bind_params: &mut Vec<Box<dyn ToSql>>,
    ) -> Option<String> {
        let types = types.filter(|t| !t.is_empty())?;
        let placeholders = vec!["?"; types.len()].join(", ");
        for t in types {
            bind_params.push(Box::new(t.as_str().to_string()));
        }
        Some(format!("rel_type IN ({placeholders})"))
    }

    fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| Error::backend("table_info", e))?;
        let columns = stmt
            .query_map([], |r| r.get::<_, String>(1))
            .map_err(|e| Error::backend("table_info", e))?
            .collect::<rusqlite::Result<HashSet<String>>>()
            .map_err(|e| Error::backend("table_info", e))?;
        Ok(columns)
    }

    fn migrate_bitemporal(conn: &Connection, mode: MigrationMode) -> Result<MigrationReport> {
        const TEMPORAL_INDEXES: [&str; 3] = [
            "idx_relationships_temporal",
            "idx_relationships_current",
            "idx_relationships_recorded",
        ];
        let mut errors = Vec::new();

        match mode {
            MigrationMode::DryRun => {
                let rows: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM relationships
                         WHERE valid_from IS NULL OR recorded_at IS NULL",
                        [],
                        |r| r.get(0),
                    )
                    .map_err(|e| Error::backend("bitemporal_dry_run", e))?;
                Ok(MigrationReport {
                    step: MigrationStep::BitemporalBackfill,
                    mode,
                    rows_affected: rows as usize,
                    indexes_changed: TEMPORAL_INDEXES.len(),
                    errors,
                })
            },
            MigrationMode::Apply => {
                // Legacy tables may predate the temporal columns entirely
                let columns = Self::table_columns(conn, "relationships")?;
                for (column, ddl) in [
                    ("valid_from", "ALTER TABLE relationships ADD COLUMN valid_from INTEGER"),
                    ("valid_until", "ALTER TABLE relationships ADD COLUMN valid_until INTEGER"),
                    ("recorded_at", "ALTER TABLE relationships ADD COLUMN recorded_at INTEGER"),
                    ("invalidated_by", "ALTER TABLE relationships ADD COLUMN invalidated_by TEXT"),
                ] {
                    if !columns.contains(column) {
                        conn.execute(ddl, [])
                            .map_err(|e| Error::Schema(format!("add column {column}: {e}")))?;
                    }
                }

                let now = to_micros(Utc::now());
                let rows = conn
                    .execute(
                        "UPDATE relationships
                         SET valid_from = COALESCE(valid_from, recorded_at, ?1),
                             recorded_at = COALESCE(recorded_at, valid_from, ?1)
                         WHERE valid_from IS NULL OR recorded_at IS NULL",
                        params![now],
                    )
                    .map_err(|e| Error::backend("bitemporal_backfill", e))?;

                let mut indexes_changed = 0;
                for ddl in [
                    "CREATE INDEX IF NOT EXISTS idx_relationships_temporal \
                     ON relationships(valid_from, valid_until)",
                    "CREATE INDEX IF NOT EXISTS idx_relationships_current \
                     ON relationships(valid_until) WHERE valid_until IS NULL",
                    "CREATE INDEX IF NOT EXISTS idx_relationships_recorded \
                     ON relationships(recorded_at)",
                ] {
                    match conn.execute(ddl, []) {
                        Ok(_) => indexes_changed += 1,
                        Err(e) => errors.push(format!("create index: {e}")),
                    }
                }

                tracing::info!(rows, indexes_changed, "bi-temporal backfill applied");
                Ok(MigrationReport {
                    step: MigrationStep::BitemporalBackfill,
                    mode,
                    rows_affected: rows,
                    indexes_changed,
                    errors,
                })
            },
            MigrationMode::Rollback => {
                tracing::warn!("rolling back bi-temporal fields - temporal data will be lost");
                let rows = conn
                    .execute(
                        "UPDATE relationships
                         SET valid_from = NULL, valid_until = NULL,
                             recorded_at = NULL, invalidated_by = NULL
                         WHERE valid_from IS NOT NULL OR recorded_at IS NOT NULL",
                        [],
                    )
                    .map_err(|e| Error::backend("bitemporal_rollback", e))?;

                let mut indexes_changed = 0;
                for index in TEMPORAL_INDEXES {
                    match conn.execute(&format!("DROP INDEX IF EXISTS {index}"), []) {
                        Ok(_) => indexes_changed += 1,
                        Err(e) => errors.push(format!("drop index {index}: {e}")),
                    }
                }

                Ok(MigrationReport {
                    step: MigrationStep::BitemporalBackfill,
                    mode,
                    rows_affected: rows,
                    indexes_changed,
                    errors,
                })
            },
        }
    }

    fn migrate_tenancy(conn: &Connection, mode: MigrationMode) -> Result<MigrationReport> {
        const TENANT_INDEX: &str =
            "CREATE INDEX IF NOT EXISTS idx_memories_tenant ON memories(tenant_id, visibility)";
        let mut errors = Vec::new();

        match mode {
            MigrationMode::DryRun => {
                let rows: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM memories WHERE tenant_id IS NULL",
                        [],
                        |r| r.get(0),
                    )
                    .map_err(|e| Error::backend("tenancy_dry_run", e))?;
                Ok(MigrationReport {
                    step: MigrationStep::TenancyBackfill,
                    mode,
                    rows_affected: rows as usize,
                    indexes_changed: 1,
                    errors,
                })
            },
            MigrationMode::Apply => {
                let rows = conn
                    .execute(
                        "UPDATE memories SET tenant_id = 'default', visibility = 'team'
                         WHERE tenant_id IS NULL",
                        [],
                    )
                    .map_err(|e| Error::backend("tenancy_backfill", e))?;

                let mut indexes_changed = 0;
                match conn.execute(TENANT_INDEX, []) {
                    Ok(_) => indexes_changed += 1,
                    Err(e) => errors.push(format!("create index: {e}")),
                }

                tracing::info!(rows, "tenancy backfill applied");
                Ok(MigrationReport {
                    step: MigrationStep::TenancyBackfill,
                    mode,
                    rows_affected: rows,
                    indexes_changed,
                    errors,
                })
            },
            MigrationMode::Rollback => {
                let rows = conn
                    .execute(
                        "UPDATE memories SET tenant_id = NULL, visibility = NULL
                         WHERE tenant_id IS NOT NULL OR visibility IS NOT NULL",
                        [],
                    )
                    .map_err(|e| Error::backend("tenancy_rollback", e))?;

                let mut indexes_changed = 0;
                match conn.execute("DROP INDEX IF EXISTS idx_memories_tenant", []) {
                    Ok(_) => indexes_changed += 1,
                    Err(e) => errors.push(format!("drop index: {e}")),
                }

                Ok(MigrationReport {
                    step: MigrationStep::TenancyBackfill,
                    mode,
                    rows_affected: rows,
                    indexes_changed,
                    errors,
                })
            },
        }
    }
}

impl MemoryBackend for SqliteBackend {
    fn connect(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        if guard.is_some() {
            return Ok(());
        }
        let conn = match &self.db_path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| Error::Connection(format!("failed to open SQLite database: {e}")))?;
        Self::configure(&conn);
        *guard = Some(conn);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut guard = acquire_lock(&self.conn);
        *guard = None;
        Ok(())
    }

    fn initialize_schema(&self) -> Result<()> {
        self.with_conn("initialize_schema", |conn| {
            conn.execute(CREATE_MEMORIES_TABLE, [])
                .map_err(|e| Error::Schema(format!("create memories table: {e}")))?;
            conn.execute(CREATE_RELATIONSHIPS_TABLE, [])
                .map_err(|e| Error::Schema(format!("create relationships table: {e}")))?;
            for ddl in CREATE_INDEXES {
                conn.execute(ddl, [])
                    .map_err(|e| Error::Schema(format!("create index: {e}")))?;
            }
            Ok(())
        })
    }

    #[instrument(skip(self, memory), fields(memory_id = %memory.id))]
    fn store_memory(&self, memory: &Memory) -> Result<MemoryId> {
        self.with_conn("store_memory", |conn| {
            let columns = MemoryColumns::from_memory(memory);
            conn.execute(
                "INSERT INTO memories (
                    id, memory_type, title, content, summary, tags, importance, confidence,
                    context, project_path, tenant_id, visibility,
                    created_at, updated_at, last_accessed, version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(id) DO UPDATE SET
                    memory_type = excluded.memory_type,
                    title = excluded.title,
                    content = excluded.content,
                    summary = excluded.summary,
                    tags = excluded.tags,
                    importance = excluded.importance,
                    confidence = excluded.confidence,
                    context = excluded.context,
                    project_path = excluded.project_path,
                    tenant_id = excluded.tenant_id,
                    visibility = excluded.visibility,
                    updated_at = excluded.updated_at,
                    version = excluded.version",
                params![
                    memory.id.as_str(),
                    memory.memory_type.as_str(),
                    memory.title,
                    memory.content,
                    memory.summary,
                    columns.tags,
                    memory.importance,
                    memory.confidence,
                    columns.context,
                    columns.project_path,
                    columns.tenant_id,
                    columns.visibility,
                    to_micros(memory.created_at),
                    to_micros(memory.updated_at),
                    to_micros(memory.last_accessed),
                    memory.version,
                ],
            )
            .map_err(|e| Error::backend("store_memory", e))?;
            Ok(memory.id.clone())
        })
    }

    #[instrument(skip(self), fields(memory_id = %id))]
    fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        self.with_conn("get_memory", |conn| {
            let memory = conn
                .query_row(
                    &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                    params![id.as_str()],
                    parse_memory_row,
                )
                .optional()
                .map_err(|e| Error::backend("get_memory", e))?;

            let Some(mut memory) = memory else {
                return Ok(None);
            };

            // Access tracking: reads refresh last_accessed
            let now = Utc::now();
            conn.execute(
                "UPDATE memories SET last_accessed = ?1 WHERE id = ?2",
                params![to_micros(now), id.as_str()],
            )
            .map_err(|e| Error::backend("get_memory", e))?;
            memory.last_accessed = now;

            Ok(Some(memory))
        })
    }

    #[instrument(skip(self, update), fields(memory_id = %id))]
    fn update_memory(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<bool> {
        self.with_conn_mut("update_memory", |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| Error::backend("update_memory", e))?;

            let existing = tx
                .query_row(
                    &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
                    params![id.as_str()],
                    parse_memory_row,
                )
                .optional()
                .map_err(|e| Error::backend("update_memory", e))?;

            let Some(mut memory) = existing else {
                return Ok(false);
            };

            update.apply_to(&mut memory);
            let columns = MemoryColumns::from_memory(&memory);
            tx.execute(
                "UPDATE memories SET
                    title = ?1, content = ?2, summary = ?3, tags = ?4,
                    importance = ?5, confidence = ?6, context = ?7,
                    project_path = ?8, tenant_id = ?9, visibility = ?10,
                    updated_at = ?11, version = ?12
                 WHERE id = ?13",
                params![
                    memory.title,
                    memory.content,
                    memory.summary,
                    columns.tags,
                    memory.importance,
                    memory.confidence,
                    columns.context,
                    columns.project_path,
                    columns.tenant_id,
                    columns.visibility,
                    to_micros(memory.updated_at),
                    memory.version,
                    id.as_str(),
                ],
            )
            .map_err(|e| Error::backend("update_memory", e))?;

            tx.commit().map_err(|e| Error::backend("update_memory", e))?;
            Ok(true)
        })
    }

    #[instrument(skip(self), fields(memory_id = %id))]
    fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        self.with_conn("delete_memory", |conn| {
            // Foreign key cascades remove every relationship touching the id
            let rows = conn
                .execute("DELETE FROM memories WHERE id = ?1", params![id.as_str()])
                .map_err(|e| Error::backend("delete_memory", e))?;
            if rows > 0 {
                metrics::counter!("memorygraph_memories_deleted_total").increment(1);
            }
            Ok(rows > 0)
        })
    }

    #[instrument(skip(self, query))]
    fn search_memories_paginated(&self, query: &SearchQuery) -> Result<PaginatedResult<Memory>> {
        self.with_conn("search_memories", |conn| {
            let (where_clause, bind_params) = Self::build_search_where(query);
            let param_refs: Vec<&dyn ToSql> = bind_params.iter().map(|p| p.as_ref()).collect();

            let total_count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM memories {where_clause}"),
                    param_refs.as_slice(),
                    |r| r.get(0),
                )
                .map_err(|e| Error::backend("search_memories_count", e))?;

            let page_sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories {where_clause}
                 ORDER BY importance DESC, created_at ASC, id ASC
                 LIMIT ? OFFSET ?"
            );
            let mut page_refs = param_refs;
            let limit = query.limit as i64;
            let offset = query.offset as i64;
            page_refs.push(&limit);
            page_refs.push(&offset);

            let mut stmt = conn
                .prepare(&page_sql)
                .map_err(|e| Error::backend("search_memories", e))?;
            let results = stmt
                .query_map(page_refs.as_slice(), parse_memory_row)
                .map_err(|e| Error::backend("search_memories", e))?
                .collect::<rusqlite::Result<Vec<Memory>>>()
                .map_err(|e| Error::backend("search_memories", e))?;

            Ok(PaginatedResult::new(
                results,
                total_count as usize,
                query.limit,
                query.offset,
            ))
        })
    }

    #[instrument(skip(self, relationship), fields(relationship_id = %relationship.id))]
    fn create_relationship(&self, relationship: &Relationship) -> Result<RelationshipId> {
        self.with_conn_mut("create_relationship", |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| Error::backend("create_relationship", e))?;

            for endpoint in [&relationship.from_memory_id, &relationship.to_memory_id] {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM memories WHERE id = ?1",
                        params![endpoint.as_str()],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(|e| Error::backend("create_relationship", e))?;
                if exists.is_none() {
                    return Err(Error::Relationship(format!(
                        "memory not found: {endpoint}"
                    )));
                }
            }

            let current: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM relationships
                     WHERE from_id = ?1 AND to_id = ?2 AND rel_type = ?3
                       AND valid_until IS NULL",
                    params![
                        relationship.from_memory_id.as_str(),
                        relationship.to_memory_id.as_str(),
                        relationship.relationship_type.as_str(),
                    ],
                    |r| r.get(0),
                )
                .map_err(|e| Error::backend("create_relationship", e))?;
            if current > 0 {
                return Err(Error::Relationship(format!(
                    "a current {} relationship already exists from {} to {}; invalidate it first",
                    relationship.relationship_type,
                    relationship.from_memory_id,
                    relationship.to_memory_id,
                )));
            }

            let props = &relationship.properties;
            let context_json = props
                .context
                .as_ref()
                .and_then(|c| serde_json::to_string(c).ok());
            tx.execute(
                "INSERT INTO relationships (
                    id, from_id, to_id, rel_type, strength, confidence, context,
                    valid_from, valid_until, recorded_at, invalidated_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    relationship.id.as_str(),
                    relationship.from_memory_id.as_str(),
                    relationship.to_memory_id.as_str(),
                    relationship.relationship_type.as_str(),
                    props.strength,
                    props.confidence,
                    context_json,
                    to_micros(props.valid_from),
                    props.valid_until.map(to_micros),
                    to_micros(props.recorded_at),
                    props.invalidated_by.as_ref().map(RelationshipId::as_str),
                ],
            )
            .map_err(|e| Error::backend("create_relationship", e))?;

            tx.commit()
                .map_err(|e| Error::backend("create_relationship", e))?;
            Ok(relationship.id.clone())
        })
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>> {
        self.with_conn("get_relationship", |conn| {
            conn.query_row(
                &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?1"),
                params![id.as_str()],
                parse_relationship_row,
            )
            .optional()
            .map_err(|e| Error::backend("get_relationship", e))
        })
    }

    #[instrument(skip(self), fields(relationship_id = %id))]
    fn invalidate_relationship(
        &self,
        id: &RelationshipId,
        invalidated_by: Option<&RelationshipId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut("invalidate_relationship", |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| Error::backend("invalidate_relationship", e))?;

            let row: Option<(Option<i64>, Option<i64>)> = tx
                .query_row(
                    "SELECT valid_from, valid_until FROM relationships WHERE id = ?1",
                    params![id.as_str()],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(|e| Error::backend("invalidate_relationship", e))?;

            let Some((valid_from, valid_until)) = row else {
                return Err(Error::Relationship(format!("relationship not found: {id}")));
            };
            if valid_until.is_some() {
                return Err(Error::Relationship(format!(
                    "relationship already invalidated: {id}"
                )));
            }
            if let Some(valid_from) = valid_from
                && to_micros(at) < valid_from
            {
                return Err(Error::Validation(format!(
                    "valid_until would precede valid_from for relationship {id}"
                )));
            }

            tx.execute(
                "UPDATE relationships SET valid_until = ?1, invalidated_by = ?2 WHERE id = ?3",
                params![
                    to_micros(at),
                    invalidated_by.map(RelationshipId::as_str),
                    id.as_str(),
                ],
            )
            .map_err(|e| Error::backend("invalidate_relationship", e))?;

            tx.commit()
                .map_err(|e| Error::backend("invalidate_relationship", e))?;
            Ok(())
        })
    }

    fn relationships_for(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<Relationship>> {
        self.with_conn("relationships_for", |conn| {
            let mut bind_params: Vec<Box<dyn ToSql>> = vec![
                Box::new(memory_id.as_str().to_string()),
                Box::new(memory_id.as_str().to_string()),
            ];
            let mut conditions = vec!["(from_id = ? OR to_id = ?)".to_string()];
            conditions.push(Self::temporal_clause(as_of, &mut bind_params));
            if let Some(clause) = Self::type_clause(types, &mut bind_params) {
                conditions.push(clause);
            }

            let sql = format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                 WHERE {}
                 ORDER BY valid_from ASC, id ASC",
                conditions.join(" AND ")
            );
            let param_refs: Vec<&dyn ToSql> = bind_params.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::backend("relationships_for", e))?;
            stmt.query_map(param_refs.as_slice(), parse_relationship_row)
                .map_err(|e| Error::backend("relationships_for", e))?
                .collect::<rusqlite::Result<Vec<Relationship>>>()
                .map_err(|e| Error::backend("relationships_for", e))
        })
    }

    fn outgoing_neighbors(
        &self,
        memory_id: &MemoryId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<MemoryId>> {
        self.with_conn("outgoing_neighbors", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT to_id FROM relationships
                     WHERE from_id = ?1 AND rel_type = ?2 AND valid_until IS NULL
                     ORDER BY to_id ASC",
                )
                .map_err(|e| Error::backend("outgoing_neighbors", e))?;
            stmt.query_map(
                params![memory_id.as_str(), relationship_type.as_str()],
                |r| r.get::<_, String>(0).map(MemoryId::new),
            )
            .map_err(|e| Error::backend("outgoing_neighbors", e))?
            .collect::<rusqlite::Result<Vec<MemoryId>>>()
            .map_err(|e| Error::backend("outgoing_neighbors", e))
        })
    }

    fn get_relationship_history(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        limit: usize,
        offset: usize,
    ) -> Result<PaginatedResult<Relationship>> {
        self.with_conn("get_relationship_history", |conn| {
            let mut bind_params: Vec<Box<dyn ToSql>> = vec![
                Box::new(memory_id.as_str().to_string()),
                Box::new(memory_id.as_str().to_string()),
            ];
            let mut conditions = vec!["(from_id = ? OR to_id = ?)".to_string()];
            if let Some(clause) = Self::type_clause(types, &mut bind_params) {
                conditions.push(clause);
            }
            let where_clause = conditions.join(" AND ");
            let param_refs: Vec<&dyn ToSql> = bind_params.iter().map(|p| p.as_ref()).collect();

            let total_count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM relationships WHERE {where_clause}"),
                    param_refs.as_slice(),
                    |r| r.get(0),
                )
                .map_err(|e| Error::backend("get_relationship_history", e))?;

            let sql = format!(
                "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                 WHERE {where_clause}
                 ORDER BY valid_from ASC, id ASC
                 LIMIT ? OFFSET ?"
            );
            let limit_param = limit as i64;
            let offset_param = offset as i64;
            let mut page_refs = param_refs;
            page_refs.push(&limit_param);
            page_refs.push(&offset_param);

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::backend("get_relationship_history", e))?;
            let results = stmt
                .query_map(page_refs.as_slice(), parse_relationship_row)
                .map_err(|e| Error::backend("get_relationship_history", e))?
                .collect::<rusqlite::Result<Vec<Relationship>>>()
                .map_err(|e| Error::backend("get_relationship_history", e))?;

            Ok(PaginatedResult::new(
                results,
                total_count as usize,
                limit,
                offset,
            ))
        })
    }

    fn what_changed(&self, since: DateTime<Utc>) -> Result<ChangeSet> {
        self.with_conn("what_changed", |conn| {
            let since_micros = to_micros(since);

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                     WHERE recorded_at > ?1
                     ORDER BY recorded_at ASC, id ASC"
                ))
                .map_err(|e| Error::backend("what_changed", e))?;
            let new = stmt
                .query_map(params![since_micros], parse_relationship_row)
                .map_err(|e| Error::backend("what_changed", e))?
                .collect::<rusqlite::Result<Vec<Relationship>>>()
                .map_err(|e| Error::backend("what_changed", e))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                     WHERE valid_until IS NOT NULL AND valid_until > ?1
                     ORDER BY valid_until ASC, id ASC"
                ))
                .map_err(|e| Error::backend("what_changed", e))?;
            let invalidated = stmt
                .query_map(params![since_micros], parse_relationship_row)
                .map_err(|e| Error::backend("what_changed", e))?
                .collect::<rusqlite::Result<Vec<Relationship>>>()
                .map_err(|e| Error::backend("what_changed", e))?;

            Ok(ChangeSet { new, invalidated })
        })
    }

    fn search_relationships_by_context(&self, filter: &ContextFilter) -> Result<Vec<Relationship>> {
        self.with_conn("search_relationships_by_context", |conn| {
            // Candidates are narrowed in SQL; the matching itself runs on the
            // deserialized structure so both backends share one predicate.
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                     WHERE context IS NOT NULL
                     ORDER BY recorded_at ASC, id ASC"
                ))
                .map_err(|e| Error::backend("search_relationships_by_context", e))?;
            let candidates = stmt
                .query_map([], parse_relationship_row)
                .map_err(|e| Error::backend("search_relationships_by_context", e))?
                .collect::<rusqlite::Result<Vec<Relationship>>>()
                .map_err(|e| Error::backend("search_relationships_by_context", e))?;

            let limit = filter.limit.unwrap_or(usize::MAX);
            Ok(candidates
                .into_iter()
                .filter(|rel| {
                    rel.properties
                        .context
                        .as_ref()
                        .is_some_and(|c| filter.matches(c))
                })
                .take(limit)
                .collect())
        })
    }

    fn apply_migration(&self, step: MigrationStep, mode: MigrationMode) -> Result<MigrationReport> {
        self.with_conn("apply_migration", |conn| match step {
            MigrationStep::BitemporalBackfill => Self::migrate_bitemporal(conn, mode),
            MigrationStep::TenancyBackfill => Self::migrate_tenancy(conn, mode),
        })
    }

    fn get_statistics(&self) -> Result<StorageStats> {
        self.with_conn("get_statistics", |conn| {
            let mut stats = StorageStats::default();

            stats.memory_count = conn
                .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get::<_, i64>(0))
                .map_err(|e| Error::backend("get_statistics", e))? as usize;
            stats.relationship_count = conn
                .query_row("SELECT COUNT(*) FROM relationships", [], |r| {
                    r.get::<_, i64>(0)
                })
                .map_err(|e| Error::backend("get_statistics", e))? as usize;
            stats.current_relationship_count = conn
                .query_row(
                    "SELECT COUNT(*) FROM relationships WHERE valid_until IS NULL",
                    [],
                    |r| r.get::<_, i64>(0),
                )
                .map_err(|e| Error::backend("get_statistics", e))? as usize;

            let mut stmt = conn
                .prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")
                .map_err(|e| Error::backend("get_statistics", e))?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
                .map_err(|e| Error::backend("get_statistics", e))?;
            for row in rows {
                let (type_str, count) = row.map_err(|e| Error::backend("get_statistics", e))?;
                if let Some(memory_type) = crate::models::MemoryType::parse(&type_str) {
                    stats.memories_by_type.insert(memory_type, count as usize);
                }
            }

            let mut stmt = conn
                .prepare("SELECT rel_type, COUNT(*) FROM relationships GROUP BY rel_type")
                .map_err(|e| Error::backend("get_statistics", e))?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))
                .map_err(|e| Error::backend("get_statistics", e))?;
            for row in rows {
                let (type_str, count) = row.map_err(|e| Error::backend("get_statistics", e))?;
                if let Some(rel_type) = RelationshipType::parse(&type_str) {
                    stats.relationships_by_type.insert(rel_type, count as usize);
                }
            }

            Ok(stats)
        })
    }

    fn health_check(&self) -> HealthReport {
        let started = Instant::now();
        let probe = self.with_conn("health_check", |conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))
                .map_err(|e| Error::backend("health_check", e))
        });

        match probe {
            Ok(_) => HealthReport {
                healthy: true,
                backend: "sqlite",
                connected: true,
                latency: Some(started.elapsed()),
                error: None,
            },
            Err(e) => HealthReport {
                healthy: false,
                backend: "sqlite",
                connected: !matches!(e, Error::Connection(_)),
                latency: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_query_language: false,
            supports_fulltext: false,
            supports_transactions: true,
        }
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemoryType, Relationship};

    fn backend() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.initialize_schema().unwrap();
        backend
    }

    fn store(backend: &SqliteBackend, title: &str) -> MemoryId {
        backend
            .store_memory(&Memory::new(MemoryType::General, title, "content"))
            .unwrap()
    }

    #[test]
    fn test_schema_is_idempotent() {
        let backend = backend();
        backend.initialize_schema().unwrap();
        backend.initialize_schema().unwrap();
    }

    #[test]
    fn test_memory_roundtrip() {
        let backend = backend();
        let memory = Memory::new(MemoryType::Problem, "Pool exhausted", "under load")
            .with_tag("db")
            .with_importance(0.9);
        let id = backend.store_memory(&memory).unwrap();

        let loaded = backend.get_memory(&id).unwrap().unwrap();
        assert_eq!(loaded.title, "Pool exhausted");
        assert_eq!(loaded.memory_type, MemoryType::Problem);
        assert_eq!(loaded.tags, vec!["db"]);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_get_missing_memory() {
        let backend = backend();
        assert!(backend.get_memory(&MemoryId::new("mem_nope")).unwrap().is_none());
    }

    #[test]
    fn test_update_memory_bumps_version() {
        let backend = backend();
        let id = store(&backend, "before");

        let updated = backend
            .update_memory(&id, &MemoryUpdate::new().with_title("after"))
            .unwrap();
        assert!(updated);

        let loaded = backend.get_memory(&id).unwrap().unwrap();
        assert_eq!(loaded.title, "after");
        assert_eq!(loaded.version, 2);

        // Version keeps climbing and updated_at never moves backwards
        let mut previous = loaded;
        for round in 3..6 {
            backend
                .update_memory(&id, &MemoryUpdate::new().with_content(format!("round {round}")))
                .unwrap();
            let loaded = backend.get_memory(&id).unwrap().unwrap();
            assert_eq!(loaded.version, round);
            assert!(loaded.updated_at >= previous.updated_at);
            previous = loaded;
        }

        assert!(
            !backend
                .update_memory(&MemoryId::new("mem_nope"), &MemoryUpdate::new().with_title("x"))
                .unwrap()
        );
    }

    #[test]
    fn test_delete_cascades_relationships() {
        let backend = backend();
        let a = store(&backend, "a");
        let b = store(&backend, "b");
        let rel = Relationship::new(a.clone(), b.clone(), RelationshipType::RelatedTo);
        backend.create_relationship(&rel).unwrap();

        assert!(backend.delete_memory(&a).unwrap());
        assert!(backend.get_relationship(&rel.id).unwrap().is_none());
        assert!(!backend.delete_memory(&a).unwrap());
    }

    #[test]
    fn test_create_relationship_requires_endpoints() {
        let backend = backend();
        let a = store(&backend, "a");
        let rel = Relationship::new(a, MemoryId::new("mem_ghost"), RelationshipType::Solves);
        let err = backend.create_relationship(&rel).unwrap_err();
        assert!(matches!(err, Error::Relationship(_)));
        assert!(err.to_string().contains("mem_ghost"));
    }

    #[test]
    fn test_single_current_edge_per_slot() {
        let backend = backend();
        let a = store(&backend, "a");
        let b = store(&backend, "b");

        backend
            .create_relationship(&Relationship::new(a.clone(), b.clone(), RelationshipType::Solves))
            .unwrap();
        let err = backend
            .create_relationship(&Relationship::new(a.clone(), b.clone(), RelationshipType::Solves))
            .unwrap_err();
        assert!(matches!(err, Error::Relationship(_)));

        // A different type occupies a different slot
        backend
            .create_relationship(&Relationship::new(a, b, RelationshipType::Improves))
            .unwrap();
    }

    #[test]
    fn test_invalidate_twice_fails() {
        let backend = backend();
        let a = store(&backend, "a");
        let b = store(&backend, "b");
        let rel = Relationship::new(a, b, RelationshipType::Causes);
        backend.create_relationship(&rel).unwrap();

        backend
            .invalidate_relationship(&rel.id, None, Utc::now())
            .unwrap();
        let err = backend
            .invalidate_relationship(&rel.id, None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::Relationship(_)));
        assert!(err.to_string().contains("already invalidated"));

        let err = backend
            .invalidate_relationship(&RelationshipId::new("rel_ghost"), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::Relationship(_)));
    }

    #[test]
    fn test_relationships_for_current_vs_as_of() {
        let backend = backend();
        let a = store(&backend, "a");
        let b = store(&backend, "b");
        let rel = Relationship::new(b.clone(), a.clone(), RelationshipType::Solves);
        backend.create_relationship(&rel).unwrap();

        let before_invalidation = Utc::now();
        backend
            .invalidate_relationship(&rel.id, None, Utc::now())
            .unwrap();

        // Default view no longer sees the edge
        assert!(backend.relationships_for(&a, None, None).unwrap().is_empty());
        // Point-in-time view before the invalidation still does
        let at = backend
            .relationships_for(&a, None, Some(before_invalidation))
            .unwrap();
        assert_eq!(at.len(), 1);
        assert_eq!(at[0].id, rel.id);
    }

    #[test]
    fn test_statistics() {
        let backend = backend();
        let a = store(&backend, "a");
        let b = store(&backend, "b");
        let rel = Relationship::new(a, b, RelationshipType::Fixes);
        backend.create_relationship(&rel).unwrap();
        backend
            .invalidate_relationship(&rel.id, None, Utc::now())
            .unwrap();

        let stats = backend.get_statistics().unwrap();
        assert_eq!(stats.memory_count, 2);
        assert_eq!(stats.relationship_count, 1);
        assert_eq!(stats.current_relationship_count, 0);
        assert_eq!(stats.memories_by_type.get(&MemoryType::General), Some(&2));
    }

    #[test]
    fn test_health_check_reports_disconnected() {
        let backend = backend();
        assert!(backend.health_check().healthy);

        backend.disconnect().unwrap();
        let report = backend.health_check();
        assert!(!report.healthy);
        assert!(!report.connected);
        assert!(report.error.is_some());
    }

    #[test]
    fn test_tenancy_migration_dry_run_matches_apply() {
        let backend = backend();
        store(&backend, "a");
        store(&backend, "b");

        let dry = backend
            .apply_migration(MigrationStep::TenancyBackfill, MigrationMode::DryRun)
            .unwrap();
        assert_eq!(dry.rows_affected, 2);

        let applied = backend
            .apply_migration(MigrationStep::TenancyBackfill, MigrationMode::Apply)
            .unwrap();
        assert_eq!(applied.rows_affected, dry.rows_affected);
        assert!(applied.succeeded());

        // Applying again touches nothing: the step is idempotent
        let again = backend
            .apply_migration(MigrationStep::TenancyBackfill, MigrationMode::Apply)
            .unwrap();
        assert_eq!(again.rows_affected, 0);

        let rolled_back = backend
            .apply_migration(MigrationStep::TenancyBackfill, MigrationMode::Rollback)
            .unwrap();
        assert_eq!(rolled_back.rows_affected, 2);
    }

    #[test]
    fn test_bitemporal_migration_backfills_nulls() {
        let backend = backend();
        let a = store(&backend, "a");
        let b = store(&backend, "b");

        // Simulate a legacy row without temporal fields
        backend
            .with_conn("test_seed", |conn| {
                conn.execute(
                    "INSERT INTO relationships (id, from_id, to_id, rel_type, strength, confidence)
                     VALUES ('rel_legacy', ?1, ?2, 'SOLVES', 0.5, 0.8)",
                    params![a.as_str(), b.as_str()],
                )
                .map_err(|e| Error::backend("seed", e))?;
                Ok(())
            })
            .unwrap();

        let dry = backend
            .apply_migration(MigrationStep::BitemporalBackfill, MigrationMode::DryRun)
            .unwrap();
        assert_eq!(dry.rows_affected, 1);

        let applied = backend
            .apply_migration(MigrationStep::BitemporalBackfill, MigrationMode::Apply)
            .unwrap();
        assert_eq!(applied.rows_affected, 1);

        let rel = backend
            .get_relationship(&RelationshipId::new("rel_legacy"))
            .unwrap()
            .unwrap();
        assert!(rel.is_current());
        assert_eq!(rel.properties.valid_from, rel.properties.recorded_at);
    }
}
