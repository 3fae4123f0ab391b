//! Bi-temporal relationship lifecycle tests.
//!
//! Walks the full solution-supersedes-solution scenario: an edge is
//! created, invalidated in favor of a successor, and the graph is queried
//! now, at a past instant, and across its whole history.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::{Duration, TimeZone, Utc};
use memorygraph::services::RelationshipService;
use memorygraph::storage::{MemoryBackend, SqliteBackend};
use memorygraph::{
    Error, Memory, MemoryId, MemoryType, RelationshipDraft, RelationshipType,
};
use std::sync::Arc;

fn setup() -> (Arc<SqliteBackend>, RelationshipService<SqliteBackend>) {
    let backend = Arc::new(SqliteBackend::in_memory().expect("open in-memory db"));
    backend.initialize_schema().expect("initialize schema");
    let service = RelationshipService::new(backend.clone());
    (backend, service)
}

fn store(backend: &SqliteBackend, memory_type: MemoryType, title: &str) -> MemoryId {
    backend
        .store_memory(&Memory::new(memory_type, title, "content"))
        .expect("store memory")
}

#[test]
fn solution_superseded_by_successor() {
    let (backend, service) = setup();
    let problem = store(&backend, MemoryType::Problem, "pool exhausted");
    let first_fix = store(&backend, MemoryType::Solution, "raise the pool cap");
    let second_fix = store(&backend, MemoryType::Solution, "add a wait queue");

    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
    let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).single().unwrap();
    let midpoint = t0 + Duration::days(30);

    // First solution becomes true at t0
    let first_edge = service
        .create_relationship(
            &first_fix,
            &problem,
            RelationshipType::Solves,
            RelationshipDraft::new().with_valid_from("2025-01-01T00:00:00Z"),
        )
        .unwrap();

    // At t1 the second solution supersedes it
    let second_edge = service
        .create_relationship(
            &second_fix,
            &problem,
            RelationshipType::Solves,
            RelationshipDraft::new().with_valid_from("2025-03-01T00:00:00Z"),
        )
        .unwrap();
    service
        .invalidate_relationship_at(&first_edge, Some(&second_edge), t1)
        .unwrap();

    // As of the midpoint, only the first solution's edge existed
    let at_midpoint = service
        .get_related_memories(&problem, None, 1, Some(midpoint))
        .unwrap();
    assert_eq!(at_midpoint.len(), 1);
    assert_eq!(at_midpoint[0].1.id, first_edge);
    assert_eq!(at_midpoint[0].0.title, "raise the pool cap");

    // Now, only the successor's edge is current
    let now = service.get_related_memories(&problem, None, 1, None).unwrap();
    assert_eq!(now.len(), 1);
    assert_eq!(now[0].1.id, second_edge);

    // History holds both versions, oldest valid_from first
    let history = service
        .get_relationship_history(&problem, None, 50, 0)
        .unwrap();
    assert_eq!(history.total_count, 2);
    assert_eq!(history.results[0].id, first_edge);
    assert_eq!(history.results[1].id, second_edge);
    assert_eq!(
        history.results[0].properties.invalidated_by.as_ref(),
        Some(&second_edge)
    );
    assert_eq!(history.results[0].properties.valid_until, Some(t1));
}

#[test]
fn as_of_now_equals_current_view() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Problem, "a");
    let b = store(&backend, MemoryType::Solution, "b");
    let c = store(&backend, MemoryType::Fix, "c");

    service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap();
    let doomed = service
        .create_relationship(&c, &a, RelationshipType::Fixes, RelationshipDraft::new())
        .unwrap();
    service.invalidate_relationship(&doomed, None).unwrap();

    let current = service.get_related_memories(&a, None, 1, None).unwrap();
    let as_of_now = service
        .get_related_memories(&a, None, 1, Some(Utc::now()))
        .unwrap();

    let ids = |edges: &[(Memory, memorygraph::Relationship)]| {
        edges.iter().map(|(_, r)| r.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&current), ids(&as_of_now));
    assert_eq!(current.len(), 1);
}

#[test]
fn boundary_instants_use_half_open_interval() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Problem, "a");
    let b = store(&backend, MemoryType::Solution, "b");

    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap();
    let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().unwrap();

    let edge = service
        .create_relationship(
            &b,
            &a,
            RelationshipType::Solves,
            RelationshipDraft::new().with_valid_from("2025-01-01T00:00:00Z"),
        )
        .unwrap();
    service.invalidate_relationship_at(&edge, None, t1).unwrap();

    // valid_from is inclusive, valid_until is exclusive
    assert_eq!(service.get_related_memories(&a, None, 1, Some(t0)).unwrap().len(), 1);
    assert!(
        service
            .get_related_memories(&a, None, 1, Some(t0 - Duration::seconds(1)))
            .unwrap()
            .is_empty()
    );
    assert!(service.get_related_memories(&a, None, 1, Some(t1)).unwrap().is_empty());
}

#[test]
fn double_invalidation_and_missing_ids_fail() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Problem, "a");
    let b = store(&backend, MemoryType::Solution, "b");

    let edge = service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap();
    service.invalidate_relationship(&edge, None).unwrap();

    let err = service.invalidate_relationship(&edge, None).unwrap_err();
    assert!(matches!(err, Error::Relationship(_)));

    let err = service
        .invalidate_relationship(&"rel_missing".into(), None)
        .unwrap_err();
    assert!(matches!(err, Error::Relationship(_)));
    assert!(err.to_string().contains("rel_missing"));
}

#[test]
fn slot_reuse_requires_invalidation() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Problem, "a");
    let b = store(&backend, MemoryType::Solution, "b");

    let first = service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap();

    // Same (from, to, type) slot: rejected while the first edge is current
    let err = service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap_err();
    assert!(matches!(err, Error::Relationship(_)));

    // After invalidation the slot is free, and history keeps both versions
    service.invalidate_relationship(&first, None).unwrap();
    service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap();

    let history = service.get_relationship_history(&a, None, 50, 0).unwrap();
    assert_eq!(history.total_count, 2);
    let current: Vec<_> = history.results.iter().filter(|r| r.is_current()).collect();
    assert_eq!(current.len(), 1);
}

#[test]
fn what_changed_splits_new_and_invalidated() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Problem, "a");
    let b = store(&backend, MemoryType::Solution, "b");
    let c = store(&backend, MemoryType::Fix, "c");

    let old_edge = service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap();

    let checkpoint = Utc::now();
    std::thread::sleep(std::time::Duration::from_millis(2));

    let new_edge = service
        .create_relationship(&c, &a, RelationshipType::Fixes, RelationshipDraft::new())
        .unwrap();
    service.invalidate_relationship(&old_edge, None).unwrap();

    let changes = service.what_changed(checkpoint).unwrap();
    assert_eq!(changes.new.len(), 1);
    assert_eq!(changes.new[0].id, new_edge);
    assert_eq!(changes.invalidated.len(), 1);
    assert_eq!(changes.invalidated[0].id, old_edge);

    // Nothing changed since the far future
    let changes = service.what_changed(Utc::now() + Duration::days(1)).unwrap();
    assert!(changes.is_empty());
}

#[test]
fn traversal_respects_depth_and_type_filters() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Task, "a");
    let b = store(&backend, MemoryType::Task, "b");
    let c = store(&backend, MemoryType::Task, "c");

    service
        .create_relationship(&a, &b, RelationshipType::Follows, RelationshipDraft::new())
        .unwrap();
    service
        .create_relationship(&b, &c, RelationshipType::Follows, RelationshipDraft::new())
        .unwrap();

    // Depth 1 sees the direct neighbor only
    assert_eq!(service.get_related_memories(&a, None, 1, None).unwrap().len(), 1);
    // Depth 2 reaches the end of the chain
    assert_eq!(service.get_related_memories(&a, None, 2, None).unwrap().len(), 2);
    // A non-matching type filter sees nothing
    assert!(
        service
            .get_related_memories(&a, Some(&[RelationshipType::Causes]), 2, None)
            .unwrap()
            .is_empty()
    );

    // A missing starting memory is an error, not an empty result
    let err = service
        .get_related_memories(&"mem_ghost".into(), None, 1, None)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn cascade_delete_removes_history() {
    let (backend, service) = setup();
    let a = store(&backend, MemoryType::Problem, "a");
    let b = store(&backend, MemoryType::Solution, "b");

    let edge = service
        .create_relationship(&b, &a, RelationshipType::Solves, RelationshipDraft::new())
        .unwrap();
    service.invalidate_relationship(&edge, None).unwrap();

    // Deleting an endpoint removes even invalidated history rows
    assert!(backend.delete_memory(&a).unwrap());
    assert!(service.get_relationship(&edge).unwrap().is_none());
    let history = service.get_relationship_history(&b, None, 50, 0).unwrap();
    assert_eq!(history.total_count, 0);
}
