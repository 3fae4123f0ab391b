//! Cypher backend query-generation tests.
//!
//! Drives the graph-query backend against a scripted executor that records
//! every statement it receives, verifying both the rendered query text
//! (the literal-substitution boundary) and the backend's control flow:
//! endpoint checks before creation, the single-current-slot check, and the
//! invalidation state machine.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use memorygraph::storage::cypher::CypherRow;
use memorygraph::storage::{CypherBackend, CypherExecutor, MemoryBackend};
use memorygraph::{
    Error, Memory, MemoryId, MemoryType, Relationship, RelationshipId, RelationshipType,
    SearchQuery, SearchTolerance,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every statement and replays canned responses in order.
///
/// Responses not scripted default to an empty row set, which satisfies
/// write statements and the connect-time ping.
#[derive(Default)]
struct ScriptedExecutor {
    statements: Mutex<Vec<String>>,
    responses: Mutex<VecDeque<Vec<CypherRow>>>,
}

impl ScriptedExecutor {
    fn respond(&self, rows: Vec<CypherRow>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    fn respond_count(&self, alias: &str, count: i64) {
        self.respond(vec![row(serde_json::json!({ alias: count }))]);
    }

    fn recorded(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn last(&self) -> String {
        self.recorded().last().cloned().expect("at least one statement")
    }
}

impl CypherExecutor for ScriptedExecutor {
    fn execute(&self, statement: &str) -> memorygraph::Result<Vec<CypherRow>> {
        self.statements.lock().unwrap().push(statement.to_string());
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }
}

fn row(json: serde_json::Value) -> CypherRow {
    json.as_object().cloned().expect("object row")
}

fn relationship_row(id: &str, valid_until: Option<&str>) -> CypherRow {
    row(serde_json::json!({
        "id": id,
        "from_id": "mem_a",
        "to_id": "mem_b",
        "rel_type": "SOLVES",
        "strength": 0.5,
        "confidence": 0.8,
        "context": null,
        "valid_from": "2025-01-01T00:00:00.000000Z",
        "valid_until": valid_until,
        "recorded_at": "2025-01-01T00:00:00.000000Z",
        "invalidated_by": null,
    }))
}

fn backend() -> CypherBackend<ScriptedExecutor> {
    let backend = CypherBackend::new(ScriptedExecutor::default());
    backend.connect().expect("connect consumes the ping");
    backend
}

#[test]
fn store_memory_renders_escaped_merge() {
    let backend = backend();
    let memory = Memory::new(MemoryType::Fix, "it's a 'quoted' title", "content")
        .with_id(MemoryId::new("mem_1"))
        .with_tag("db");
    backend.store_memory(&memory).unwrap();

    let statement = backend.executor().last();
    assert!(statement.starts_with("MERGE (m:Memory {id: 'mem_1'})"));
    assert!(statement.contains("m.memory_type = 'fix'"));
    // Quotes inside the title stay inside the literal
    assert!(statement.contains("m.title = 'it\\'s a \\'quoted\\' title'"));
    assert!(statement.contains("m.tags = ['db']"));
    assert!(statement.contains("m.version = 1"));
    // Unset optional fields render as the null literal, never as empty text
    assert!(statement.contains("m.summary = null"));
}

#[test]
fn hostile_input_cannot_break_out_of_literals() {
    let backend = backend();
    let memory = Memory::new(
        MemoryType::General,
        "x'}) DETACH DELETE (m) //",
        "content",
    )
    .with_id(MemoryId::new("mem_1"));
    backend.store_memory(&memory).unwrap();

    let statement = backend.executor().last();
    // The closing quote is escaped, so the payload never terminates the string
    assert!(statement.contains("m.title = 'x\\'}) DETACH DELETE (m) //'"));
    assert!(!statement.contains("x'})"));
}

#[test]
fn search_expands_needles_and_orders_deterministically() {
    let backend = backend();
    backend.executor().respond_count("total", 0);

    let query = SearchQuery::new()
        .with_text("retrying")
        .with_tolerance(SearchTolerance::Fuzzy)
        .with_type(MemoryType::Fix);
    backend.search_memories_paginated(&query).unwrap();

    let statements = backend.executor().recorded();
    let count = &statements[statements.len() - 2];
    let page = &statements[statements.len() - 1];

    // Count and page share one predicate
    for statement in [count, page] {
        assert!(statement.contains("toLower(m.title) CONTAINS 'retrying'"));
        assert!(statement.contains("CONTAINS 'retry'"));
        assert!(statement.contains("CONTAINS 'retries'"));
        assert!(statement.contains("m.memory_type = 'fix'"));
    }
    assert!(count.contains("count(m) AS total"));
    assert!(page.contains("ORDER BY m.importance DESC, m.created_at ASC, m.id ASC"));
    assert!(page.contains("SKIP 0 LIMIT 50"));
}

#[test]
fn create_relationship_checks_endpoints_and_slot_first() {
    let backend = backend();
    let executor = backend.executor();
    executor.respond_count("count", 1); // from endpoint exists
    executor.respond_count("count", 1); // to endpoint exists
    executor.respond_count("count", 0); // slot is free

    let relationship = Relationship::new(
        MemoryId::new("mem_a"),
        MemoryId::new("mem_b"),
        RelationshipType::Solves,
    );
    backend.create_relationship(&relationship).unwrap();

    let statements = executor.recorded();
    let slot_check = &statements[statements.len() - 2];
    let create = &statements[statements.len() - 1];

    assert!(slot_check.contains("-[r:SOLVES]->"));
    assert!(slot_check.contains("r.valid_until IS NULL"));
    assert!(create.contains("CREATE (a)-[r:SOLVES {"));
    assert!(create.contains("valid_until: null"));
    assert!(create.contains(&format!("id: '{}'", relationship.id)));
}

#[test]
fn occupied_slot_rejected_without_writing() {
    let backend = backend();
    let executor = backend.executor();
    executor.respond_count("count", 1);
    executor.respond_count("count", 1);
    executor.respond_count("count", 1); // a current edge already holds the slot

    let statements_before = executor.recorded().len();
    let err = backend
        .create_relationship(&Relationship::new(
            MemoryId::new("mem_a"),
            MemoryId::new("mem_b"),
            RelationshipType::Solves,
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Relationship(_)));

    // Three checks ran, no CREATE followed
    let statements = executor.recorded();
    assert_eq!(statements.len(), statements_before + 3);
    assert!(!statements.last().unwrap().contains("CREATE"));
}

#[test]
fn missing_endpoint_names_the_memory() {
    let backend = backend();
    backend.executor().respond_count("count", 0); // from endpoint missing

    let err = backend
        .create_relationship(&Relationship::new(
            MemoryId::new("mem_ghost"),
            MemoryId::new("mem_b"),
            RelationshipType::Causes,
        ))
        .unwrap_err();
    assert!(matches!(err, Error::Relationship(_)));
    assert!(err.to_string().contains("mem_ghost"));
}

#[test]
fn invalidation_state_machine() {
    let backend = backend();
    let executor = backend.executor();
    let now = chrono::Utc::now();

    // Unknown id: the lookup returns no rows
    let err = backend
        .invalidate_relationship(&RelationshipId::new("rel_ghost"), None, now)
        .unwrap_err();
    assert!(matches!(err, Error::Relationship(_)));
    assert!(err.to_string().contains("rel_ghost"));

    // Already invalidated: terminal, never a silent no-op
    executor.respond(vec![relationship_row(
        "rel_1",
        Some("2025-06-01T00:00:00.000000Z"),
    )]);
    let err = backend
        .invalidate_relationship(&RelationshipId::new("rel_1"), None, now)
        .unwrap_err();
    assert!(err.to_string().contains("already invalidated"));

    // Valid: the update sets valid_until and the successor link
    executor.respond(vec![relationship_row("rel_1", None)]);
    backend
        .invalidate_relationship(
            &RelationshipId::new("rel_1"),
            Some(&RelationshipId::new("rel_2")),
            now,
        )
        .unwrap();
    let statement = executor.last();
    assert!(statement.contains("SET r.valid_until = '"));
    assert!(statement.contains("r.invalidated_by = 'rel_2'"));
}

#[test]
fn point_in_time_clause_uses_half_open_interval() {
    use chrono::TimeZone;
    let backend = backend();
    let as_of = chrono::Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().unwrap();

    backend
        .relationships_for(&MemoryId::new("mem_a"), None, Some(as_of))
        .unwrap();

    let statement = backend.executor().last();
    assert!(statement.contains("r.valid_from <= '2025-03-01T00:00:00.000000Z'"));
    assert!(statement.contains("r.valid_until IS NULL OR r.valid_until > '2025-03-01T00:00:00.000000Z'"));

    // The default view asks only for current edges
    backend.relationships_for(&MemoryId::new("mem_a"), None, None).unwrap();
    let statement = backend.executor().last();
    assert!(statement.contains("r.valid_until IS NULL"));
    assert!(!statement.contains("valid_from <="));
}

#[test]
fn what_changed_queries_both_feeds() {
    let backend = backend();
    backend.what_changed(chrono::Utc::now()).unwrap();

    let statements = backend.executor().recorded();
    let new_feed = &statements[statements.len() - 2];
    let invalidated_feed = &statements[statements.len() - 1];
    assert!(new_feed.contains("r.recorded_at > '"));
    assert!(invalidated_feed.contains("r.valid_until IS NOT NULL AND r.valid_until > '"));
}

#[test]
fn calls_before_connect_fail_fast() {
    let backend = CypherBackend::new(ScriptedExecutor::default());
    let err = backend.get_memory(&MemoryId::new("mem_1")).unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    // Nothing reached the executor
    assert!(backend.executor().recorded().is_empty());

    let report = backend.health_check();
    assert!(!report.healthy);
    assert!(!report.connected);
}
