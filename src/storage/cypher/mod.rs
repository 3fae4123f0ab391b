//! Graph-query backend speaking Cypher text.
//!
//! Translates the logical operations of
//! [`MemoryBackend`](crate::storage::MemoryBackend) into complete Cypher
//! statements. The target dialects have no parameter binding, so every
//! value is rendered through [`params`] before it reaches the query text;
//! the [`executor`] seam carries finished statements to the actual
//! database.
//!
//! # Consistency gap
//!
//! The executor does not assume transactions. The existence check and the
//! insert inside `create_relationship` are separate statements, so a racing
//! invalidate-then-create on the same (from, to, type) slot can leave two
//! simultaneously-current edges. Callers needing that guarantee must
//! serialize those calls themselves; the embedded `SQLite` backend does not
//! have this gap.

pub mod params;

mod executor;
mod row;

pub use executor::{CypherExecutor, CypherRow, HttpCypherExecutor};
pub use params::{CypherValue, is_safe_identifier, substitute};

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
use row::{MEMORY_RETURN, RELATIONSHIP_RETURN, get_i64, get_str, parse_memory, parse_relationship};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::instrument;

/// Property assignments shared by memory writes.
const MEMORY_SET: &str = "SET m.memory_type = $memory_type, m.title = $title, \
     m.content = $content, m.summary = $summary, m.tags = $tags, \
     m.importance = $importance, m.confidence = $confidence, m.context = $context, \
     m.project_path = $project_path, m.tenant_id = $tenant_id, \
     m.visibility = $visibility, m.created_at = $created_at, \
     m.updated_at = $updated_at, m.last_accessed = $last_accessed, \
     m.version = $version";

/// Schema DDL; all statements are `IF NOT EXISTS` so initialization is
/// idempotent.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT memory_id_unique IF NOT EXISTS FOR (m:Memory) REQUIRE m.id IS UNIQUE",
    "CREATE INDEX rel_valid_until IF NOT EXISTS FOR ()-[r]-() ON (r.valid_until)",
    "CREATE INDEX rel_valid_from IF NOT EXISTS FOR ()-[r]-() ON (r.valid_from)",
    "CREATE INDEX rel_recorded_at IF NOT EXISTS FOR ()-[r]-() ON (r.recorded_at)",
];

/// Cypher-speaking storage engine over a pluggable executor.
pub struct CypherBackend<E: CypherExecutor> {
    executor: E,
    connected: AtomicBool,
}

impl<E: CypherExecutor> CypherBackend<E> {
    /// Creates a backend over the given executor, initially disconnected.
    #[must_use]
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            connected: AtomicBool::new(false),
        }
    }

    /// Returns a reference to the executor.
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Substitutes and executes a statement.
    fn run(&self, query: &str, values: &BTreeMap<&str, CypherValue>) -> Result<Vec<CypherRow>> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(Error::Connection("not connected to cypher backend".to_string()));
        }
        let statement = substitute(query, values)?;
        self.executor.execute(&statement)
    }

    /// Runs a statement expected to return a single count column.
    fn run_count(
        &self,
        query: &str,
        values: &BTreeMap<&str, CypherValue>,
        column: &str,
    ) -> Result<usize> {
        let rows = self.run(query, values)?;
        let count = rows.first().map_or(0, |row| {
            row.get(column).and_then(serde_json::Value::as_i64).unwrap_or(0)
        });
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn fetch_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let rows = self.run(
            &format!("MATCH (m:Memory {{id: $id}}) {MEMORY_RETURN}"),
            &values(&[("id", CypherValue::from(id.as_str()))]),
        )?;
        rows.first().map(parse_memory).transpose()
    }

    fn memory_values(memory: &Memory) -> BTreeMap<&'static str, CypherValue> {
        let context_fields = memory.context.as_ref();
        values(&[
            ("id", memory.id.as_str().into()),
            ("memory_type", memory.memory_type.as_str().into()),
            ("title", memory.title.as_str().into()),
            ("content", memory.content.as_str().into()),
            ("summary", CypherValue::opt_str(memory.summary.clone())),
            ("tags", CypherValue::Json(serde_json::json!(memory.tags))),
            ("importance", memory.importance.into()),
            ("confidence", memory.confidence.into()),
            (
                "context",
                CypherValue::opt_str(
                    context_fields.and_then(|c| serde_json::to_string(c).ok()),
                ),
            ),
            (
                "project_path",
                CypherValue::opt_str(context_fields.and_then(|c| c.project_path.clone())),
            ),
            (
                "tenant_id",
                CypherValue::opt_str(context_fields.and_then(|c| c.tenant_id.clone())),
            ),
            (
                "visibility",
                CypherValue::opt_str(
                    context_fields.and_then(|c| c.visibility).map(|v| v.as_str()),
                ),
            ),
            ("created_at", CypherValue::timestamp(memory.created_at)),
            ("updated_at", CypherValue::timestamp(memory.updated_at)),
            ("last_accessed", CypherValue::timestamp(memory.last_accessed)),
            ("version", memory.version.into()),
        ])
    }

    /// Builds the WHERE clause of a search; literals are pre-rendered here
    /// because the page and count queries must share one predicate.
    fn build_search_where(query: &SearchQuery) -> Result<String> {
        let mut conditions: Vec<String> = Vec::new();

        let groups = expand_query(query);
        if !groups.is_empty() {
            let mut group_clauses = Vec::new();
            for group in &groups {
                let mut needle_clauses = Vec::new();
                for needle in group {
                    let lit = CypherValue::from(needle.text.as_str()).render()?;
                    needle_clauses.push(format!(
                        "(toLower(m.title) CONTAINS {lit} \
                         OR toLower(m.content) CONTAINS {lit} \
                         OR toLower(coalesce(m.summary, '')) CONTAINS {lit} \
                         OR any(tag IN coalesce(m.tags, []) WHERE toLower(tag) CONTAINS {lit}))"
                    ));
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
            let lit = CypherValue::from(memory_type.as_str()).render()?;
            conditions.push(format!("m.memory_type = {lit}"));
        }
        for tag in &query.tags {
            let lit = CypherValue::from(tag.as_str()).render()?;
            conditions.push(format!("{lit} IN coalesce(m.tags, [])"));
        }
        if let Some(min_importance) = query.min_importance {
            conditions.push(format!(
                "m.importance >= {}",
                CypherValue::from(min_importance).render()?
            ));
        }
        if let Some(min_confidence) = query.min_confidence {
            conditions.push(format!(
                "m.confidence >= {}",
                CypherValue::from(min_confidence).render()?
            ));
        }
        if let Some(after) = query.created_after {
            conditions.push(format!(
                "m.created_at >= {}",
                CypherValue::timestamp(after).render()?
            ));
        }
        if let Some(before) = query.created_before {
            conditions.push(format!(
                "m.created_at < {}",
                CypherValue::timestamp(before).render()?
            ));
        }
        if let Some(ref project_path) = query.project_path {
            let lit = CypherValue::from(project_path.as_str()).render()?;
            conditions.push(format!("m.project_path = {lit}"));
        }
        if let Some(ref tenant_id) = query.tenant_id {
            let lit = CypherValue::from(tenant_id.as_str()).render()?;
            conditions.push(format!("m.tenant_id = {lit}"));
        }
        if let Some(visibility) = query.visibility {
            let lit = CypherValue::from(visibility.as_str()).render()?;
            conditions.push(format!("m.visibility = {lit}"));
        }

        Ok(if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        })
    }

    /// Temporal qualifier for relationship matches.
    fn temporal_clause(as_of: Option<DateTime<Utc>>) -> Result<String> {
        as_of.map_or_else(
            || Ok("r.valid_until IS NULL".to_string()),
            |as_of| {
                let lit = CypherValue::timestamp(as_of).render()?;
                Ok(format!(
                    "r.valid_from <= {lit} AND (r.valid_until IS NULL OR r.valid_until > {lit})"
                ))
            },
        )
    }

    /// Type filter for relationship matches.
    fn type_clause(types: Option<&[RelationshipType]>) -> Result<Option<String>> {
        let Some(types) = types.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let names: Vec<&str> = types.iter().map(RelationshipType::as_str).collect();
        let lit = CypherValue::Json(serde_json::json!(names)).render()?;
        Ok(Some(format!("type(r) IN {lit}")))
    }

    fn run_relationship_query(&self, where_clause: &str, tail: &str) -> Result<Vec<Relationship>> {
        let rows = self.run(
            &format!(
                "MATCH (a:Memory)-[r]->(b:Memory) WHERE {where_clause} {RELATIONSHIP_RETURN} {tail}"
            ),
            &BTreeMap::new(),
        )?;
        rows.iter().map(parse_relationship).collect()
    }

    fn migrate_bitemporal(&self, mode: MigrationMode) -> Result<MigrationReport> {
        const INDEXES: [(&str, &str); 3] = [
            ("rel_valid_from", "CREATE INDEX rel_valid_from IF NOT EXISTS FOR ()-[r]-() ON (r.valid_from)"),
            ("rel_valid_until", "CREATE INDEX rel_valid_until IF NOT EXISTS FOR ()-[r]-() ON (r.valid_until)"),
            ("rel_recorded_at", "CREATE INDEX rel_recorded_at IF NOT EXISTS FOR ()-[r]-() ON (r.recorded_at)"),
        ];
        let mut errors = Vec::new();

        match mode {
            MigrationMode::DryRun => {
                let rows = self.run_count(
                    "MATCH ()-[r]->() WHERE r.valid_from IS NULL RETURN count(r) AS count",
                    &BTreeMap::new(),
                    "count",
                )?;
                Ok(MigrationReport {
                    step: MigrationStep::BitemporalBackfill,
                    mode,
                    rows_affected: rows,
                    indexes_changed: INDEXES.len(),
                    errors,
                })
            },
            MigrationMode::Apply => {
                let rows = self.run_count(
                    "MATCH ()-[r]->() WHERE r.valid_from IS NULL
                     SET r.valid_from = coalesce(r.recorded_at, $now),
                         r.recorded_at = coalesce(r.recorded_at, $now),
                         r.valid_until = null, r.invalidated_by = null
                     RETURN count(r) AS updated",
                    &values(&[("now", CypherValue::timestamp(Utc::now()))]),
                    "updated",
                )?;

                let mut indexes_changed = 0;
                for (name, ddl) in INDEXES {
                    match self.run(ddl, &BTreeMap::new()) {
                        Ok(_) => indexes_changed += 1,
                        Err(e) => errors.push(format!("create index {name}: {e}")),
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
                let rows = self.run_count(
                    "MATCH ()-[r]->() WHERE r.valid_from IS NOT NULL
                     SET r.valid_from = null, r.valid_until = null,
                         r.recorded_at = null, r.invalidated_by = null
                     RETURN count(r) AS updated",
                    &BTreeMap::new(),
                    "updated",
                )?;

                let mut indexes_changed = 0;
                for (name, _) in INDEXES {
                    match self.run(&format!("DROP INDEX {name} IF EXISTS"), &BTreeMap::new()) {
                        Ok(_) => indexes_changed += 1,
                        Err(e) => errors.push(format!("drop index {name}: {e}")),
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

    fn migrate_tenancy(&self, mode: MigrationMode) -> Result<MigrationReport> {
        const TENANT_INDEX: &str =
            "CREATE INDEX memory_tenant IF NOT EXISTS FOR (m:Memory) ON (m.tenant_id)";
        let mut errors = Vec::new();

        match mode {
            MigrationMode::DryRun => {
                let rows = self.run_count(
                    "MATCH (m:Memory) WHERE m.tenant_id IS NULL RETURN count(m) AS count",
                    &BTreeMap::new(),
                    "count",
                )?;
                Ok(MigrationReport {
                    step: MigrationStep::TenancyBackfill,
                    mode,
                    rows_affected: rows,
                    indexes_changed: 1,
                    errors,
                })
            },
            MigrationMode::Apply => {
                let rows = self.run_count(
                    "MATCH (m:Memory) WHERE m.tenant_id IS NULL
                     SET m.tenant_id = 'default', m.visibility = 'team'
                     RETURN count(m) AS updated",
                    &BTreeMap::new(),
                    "updated",
                )?;

                let mut indexes_changed = 0;
                match self.run(TENANT_INDEX, &BTreeMap::new()) {
                    Ok(_) => indexes_changed += 1,
                    Err(e) => errors.push(format!("create index memory_tenant: {e}")),
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
                let rows = self.run_count(
                    "MATCH (m:Memory)
                     WHERE m.tenant_id IS NOT NULL OR m.visibility IS NOT NULL
                     SET m.tenant_id = null, m.visibility = null
                     RETURN count(m) AS updated",
                    &BTreeMap::new(),
                    "updated",
                )?;

                let mut indexes_changed = 0;
                match self.run("DROP INDEX memory_tenant IF EXISTS", &BTreeMap::new()) {
                    Ok(_) => indexes_changed += 1,
                    Err(e) => errors.push(format!("drop index memory_tenant: {e}")),
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

/// Builds a parameter map from entries.
fn values<'a>(entries: &[(&'a str, CypherValue)]) -> BTreeMap<&'a str, CypherValue> {
    entries.iter().cloned().collect()
}

impl<E: CypherExecutor> MemoryBackend for CypherBackend<E> {
    fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        self.executor
            .ping()
            .map_err(|e| Error::Connection(format!("cypher backend unreachable: {e}")))?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn initialize_schema(&self) -> Result<()> {
        for (i, statement) in SCHEMA_STATEMENTS.iter().enumerate() {
            match self.run(statement, &BTreeMap::new()) {
                Ok(_) => {},
                // The unique constraint is load-bearing; index dialects vary
                Err(e) if i == 0 => {
                    return Err(Error::Schema(format!("create memory id constraint: {e}")));
                },
                Err(e) => {
                    tracing::warn!(statement, error = %e, "schema statement skipped");
                },
            }
        }
        Ok(())
    }

    #[instrument(skip(self, memory), fields(memory_id = %memory.id))]
    fn store_memory(&self, memory: &Memory) -> Result<MemoryId> {
        self.run(
            &format!("MERGE (m:Memory {{id: $id}}) {MEMORY_SET}"),
            &Self::memory_values(memory),
        )?;
        Ok(memory.id.clone())
    }

    #[instrument(skip(self), fields(memory_id = %id))]
    fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let Some(mut memory) = self.fetch_memory(id)? else {
            return Ok(None);
        };

        // Access tracking: reads refresh last_accessed
        let now = Utc::now();
        self.run(
            "MATCH (m:Memory {id: $id}) SET m.last_accessed = $now",
            &values(&[
                ("id", id.as_str().into()),
                ("now", CypherValue::timestamp(now)),
            ]),
        )?;
        memory.last_accessed = now;
        Ok(Some(memory))
    }

    #[instrument(skip(self, update), fields(memory_id = %id))]
    fn update_memory(&self, id: &MemoryId, update: &MemoryUpdate) -> Result<bool> {
        let Some(mut memory) = self.fetch_memory(id)? else {
            return Ok(false);
        };
        update.apply_to(&mut memory);
        self.run(
            &format!("MATCH (m:Memory {{id: $id}}) {MEMORY_SET}"),
            &Self::memory_values(&memory),
        )?;
        Ok(true)
    }

    #[instrument(skip(self), fields(memory_id = %id))]
    fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        let existing = self.run_count(
            "MATCH (m:Memory {id: $id}) RETURN count(m) AS count",
            &values(&[("id", id.as_str().into())]),
            "count",
        )?;
        if existing == 0 {
            return Ok(false);
        }
        // DETACH removes every edge touching the node, current or historical
        self.run(
            "MATCH (m:Memory {id: $id}) DETACH DELETE m",
            &values(&[("id", id.as_str().into())]),
        )?;
        metrics::counter!("memorygraph_memories_deleted_total").increment(1);
        Ok(true)
    }

    #[instrument(skip(self, query))]
    fn search_memories_paginated(&self, query: &SearchQuery) -> Result<PaginatedResult<Memory>> {
        let where_clause = Self::build_search_where(query)?;

        let total_count = self.run_count(
            &format!("MATCH (m:Memory) {where_clause} RETURN count(m) AS total"),
            &BTreeMap::new(),
            "total",
        )?;

        let rows = self.run(
            &format!(
                "MATCH (m:Memory) {where_clause} {MEMORY_RETURN}
                 ORDER BY m.importance DESC, m.created_at ASC, m.id ASC
                 SKIP $offset LIMIT $limit"
            ),
            &values(&[
                ("offset", CypherValue::Int(query.offset as i64)),
                ("limit", CypherValue::Int(query.limit as i64)),
            ]),
        )?;
        let results = rows.iter().map(parse_memory).collect::<Result<Vec<Memory>>>()?;

        Ok(PaginatedResult::new(results, total_count, query.limit, query.offset))
    }

    #[instrument(skip(self, relationship), fields(relationship_id = %relationship.id))]
    fn create_relationship(&self, relationship: &Relationship) -> Result<RelationshipId> {
        for endpoint in [&relationship.from_memory_id, &relationship.to_memory_id] {
            let exists = self.run_count(
                "MATCH (m:Memory {id: $id}) RETURN count(m) AS count",
                &values(&[("id", endpoint.as_str().into())]),
                "count",
            )?;
            if exists == 0 {
                return Err(Error::Relationship(format!("memory not found: {endpoint}")));
            }
        }

        let rel_type = relationship.relationship_type.as_str();
        let current = self.run_count(
            &format!(
                "MATCH (:Memory {{id: $from_id}})-[r:{rel_type}]->(:Memory {{id: $to_id}})
                 WHERE r.valid_until IS NULL RETURN count(r) AS count"
            ),
            &values(&[
                ("from_id", relationship.from_memory_id.as_str().into()),
                ("to_id", relationship.to_memory_id.as_str().into()),
            ]),
            "count",
        )?;
        if current > 0 {
            return Err(Error::Relationship(format!(
                "a current {rel_type} relationship already exists from {} to {}; invalidate it first",
                relationship.from_memory_id, relationship.to_memory_id,
            )));
        }

        let props = &relationship.properties;
        self.run(
            &format!(
                "MATCH (a:Memory {{id: $from_id}}), (b:Memory {{id: $to_id}})
                 CREATE (a)-[r:{rel_type} {{
                     id: $id, strength: $strength, confidence: $confidence,
                     context: $context, valid_from: $valid_from, valid_until: null,
                     recorded_at: $recorded_at, invalidated_by: null
                 }}]->(b)"
            ),
            &values(&[
                ("id", relationship.id.as_str().into()),
                ("from_id", relationship.from_memory_id.as_str().into()),
                ("to_id", relationship.to_memory_id.as_str().into()),
                ("strength", props.strength.into()),
                ("confidence", props.confidence.into()),
                (
                    "context",
                    CypherValue::opt_str(
                        props.context.as_ref().and_then(|c| serde_json::to_string(c).ok()),
                    ),
                ),
                ("valid_from", CypherValue::timestamp(props.valid_from)),
                ("recorded_at", CypherValue::timestamp(props.recorded_at)),
            ]),
        )?;

        Ok(relationship.id.clone())
    }

    fn get_relationship(&self, id: &RelationshipId) -> Result<Option<Relationship>> {
        let rows = self.run(
            &format!(
                "MATCH (a:Memory)-[r]->(b:Memory) WHERE r.id = $id {RELATIONSHIP_RETURN}"
            ),
            &values(&[("id", id.as_str().into())]),
        )?;
        rows.first().map(parse_relationship).transpose()
    }

    #[instrument(skip(self), fields(relationship_id = %id))]
    fn invalidate_relationship(
        &self,
        id: &RelationshipId,
        invalidated_by: Option<&RelationshipId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(existing) = self.get_relationship(id)? else {
            return Err(Error::Relationship(format!("relationship not found: {id}")));
        };
        if !existing.is_current() {
            return Err(Error::Relationship(format!(
                "relationship already invalidated: {id}"
            )));
        }
        if at < existing.properties.valid_from {
            return Err(Error::Validation(format!(
                "valid_until would precede valid_from for relationship {id}"
            )));
        }

        self.run(
            "MATCH ()-[r]->() WHERE r.id = $id
             SET r.valid_until = $until, r.invalidated_by = $by",
            &values(&[
                ("id", id.as_str().into()),
                ("until", CypherValue::timestamp(at)),
                (
                    "by",
                    CypherValue::opt_str(invalidated_by.map(RelationshipId::as_str)),
                ),
            ]),
        )?;
        Ok(())
    }

    fn relationships_for(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<Relationship>> {
        let id_lit = CypherValue::from(memory_id.as_str()).render()?;
        let mut conditions = vec![format!("(a.id = {id_lit} OR b.id = {id_lit})")];
        conditions.push(Self::temporal_clause(as_of)?);
        if let Some(clause) = Self::type_clause(types)? {
            conditions.push(clause);
        }

        self.run_relationship_query(
            &conditions.join(" AND "),
            "ORDER BY r.valid_from ASC, r.id ASC",
        )
    }

    fn outgoing_neighbors(
        &self,
        memory_id: &MemoryId,
        relationship_type: RelationshipType,
    ) -> Result<Vec<MemoryId>> {
        let rel_type = relationship_type.as_str();
        let rows = self.run(
            &format!(
                "MATCH (:Memory {{id: $id}})-[r:{rel_type}]->(b:Memory)
                 WHERE r.valid_until IS NULL
                 RETURN b.id AS to_id ORDER BY to_id ASC"
            ),
            &values(&[("id", memory_id.as_str().into())]),
        )?;
        rows.iter()
            .map(|row| get_str(row, "to_id").map(MemoryId::new))
            .collect()
    }

    fn get_relationship_history(
        &self,
        memory_id: &MemoryId,
        types: Option<&[RelationshipType]>,
        limit: usize,
        offset: usize,
    ) -> Result<PaginatedResult<Relationship>> {
        let id_lit = CypherValue::from(memory_id.as_str()).render()?;
        let mut conditions = vec![format!("(a.id = {id_lit} OR b.id = {id_lit})")];
        if let Some(clause) = Self::type_clause(types)? {
            conditions.push(clause);
        }
        let where_clause = conditions.join(" AND ");

        let total_count = self.run_count(
            &format!(
                "MATCH (a:Memory)-[r]->(b:Memory) WHERE {where_clause} RETURN count(r) AS total"
            ),
            &BTreeMap::new(),
            "total",
        )?;

        let results = self.run_relationship_query(
            &where_clause,
            &format!("ORDER BY r.valid_from ASC, r.id ASC SKIP {offset} LIMIT {limit}"),
        )?;

        Ok(PaginatedResult::new(results, total_count, limit, offset))
    }

    fn what_changed(&self, since: DateTime<Utc>) -> Result<ChangeSet> {
        let since_lit = CypherValue::timestamp(since).render()?;

        let new = self.run_relationship_query(
            &format!("r.recorded_at > {since_lit}"),
            "ORDER BY r.recorded_at ASC, r.id ASC",
        )?;
        let invalidated = self.run_relationship_query(
            &format!("r.valid_until IS NOT NULL AND r.valid_until > {since_lit}"),
            "ORDER BY r.valid_until ASC, r.id ASC",
        )?;

        Ok(ChangeSet { new, invalidated })
    }

    fn search_relationships_by_context(&self, filter: &ContextFilter) -> Result<Vec<Relationship>> {
        // Candidates narrowed in the query; the matching itself runs on the
        // deserialized structure so both backends share one predicate.
        let candidates = self.run_relationship_query(
            "r.context IS NOT NULL",
            "ORDER BY r.recorded_at ASC, r.id ASC",
        )?;

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
    }

    fn apply_migration(&self, step: MigrationStep, mode: MigrationMode) -> Result<MigrationReport> {
        match step {
            MigrationStep::BitemporalBackfill => self.migrate_bitemporal(mode),
            MigrationStep::TenancyBackfill => self.migrate_tenancy(mode),
        }
    }

    fn get_statistics(&self) -> Result<StorageStats> {
        let mut stats = StorageStats {
            memory_count: self.run_count(
                "MATCH (m:Memory) RETURN count(m) AS total",
                &BTreeMap::new(),
                "total",
            )?,
            relationship_count: self.run_count(
                "MATCH ()-[r]->() RETURN count(r) AS total",
                &BTreeMap::new(),
                "total",
            )?,
            current_relationship_count: self.run_count(
                "MATCH ()-[r]->() WHERE r.valid_until IS NULL RETURN count(r) AS total",
                &BTreeMap::new(),
                "total",
            )?,
            ..StorageStats::default()
        };

        let rows = self.run(
            "MATCH (m:Memory) RETURN m.memory_type AS t, count(m) AS c",
            &BTreeMap::new(),
        )?;
        for row in &rows {
            if let (Ok(type_str), Ok(count)) = (get_str(row, "t"), get_i64(row, "c"))
                && let Some(memory_type) = crate::models::MemoryType::parse(&type_str)
            {
                stats
                    .memories_by_type
                    .insert(memory_type, usize::try_from(count).unwrap_or(0));
            }
        }

        let rows = self.run(
            "MATCH ()-[r]->() RETURN type(r) AS t, count(r) AS c",
            &BTreeMap::new(),
        )?;
        for row in &rows {
            if let (Ok(type_str), Ok(count)) = (get_str(row, "t"), get_i64(row, "c"))
                && let Some(rel_type) = RelationshipType::parse(&type_str)
            {
                stats
                    .relationships_by_type
                    .insert(rel_type, usize::try_from(count).unwrap_or(0));
            }
        }

        Ok(stats)
    }

    fn health_check(&self) -> HealthReport {
        if !self.connected.load(Ordering::Acquire) {
            return HealthReport {
                healthy: false,
                backend: "cypher",
                connected: false,
                latency: None,
                error: Some("not connected".to_string()),
            };
        }

        let started = Instant::now();
        match self.executor.execute("RETURN 'healthy' AS status") {
            Ok(_) => HealthReport {
                healthy: true,
                backend: "cypher",
                connected: true,
                latency: Some(started.elapsed()),
                error: None,
            },
            Err(e) => HealthReport {
                healthy: false,
                backend: "cypher",
                connected: true,
                latency: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_query_language: true,
            supports_fulltext: false,
            supports_transactions: false,
        }
    }

    fn name(&self) -> &'static str {
        "cypher"
    }
}
