//! Structured-context relationship search tests.
//!
//! The context structures stored here mirror what the external extractor
//! produces from free text; the engine only stores and filters them.
//! Filters combine with AND, alternatives inside one filter with OR, and
//! all matching is case-insensitive substring matching.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use memorygraph::services::RelationshipService;
use memorygraph::storage::{MemoryBackend, SqliteBackend};
use memorygraph::{
    ContextFilter, ContextScope, ContextStructure, Memory, MemoryId, MemoryType,
    RelationshipDraft, RelationshipType,
};
use std::sync::Arc;

fn seeded() -> RelationshipService<SqliteBackend> {
    let backend = Arc::new(SqliteBackend::in_memory().expect("open in-memory db"));
    backend.initialize_schema().expect("initialize schema");

    let store = |title: &str| -> MemoryId {
        backend
            .store_memory(&Memory::new(MemoryType::General, title, "content"))
            .expect("store memory")
    };
    let a = store("auth timeout");
    let b = store("raise the timeout");
    let c = store("rotate the signing key");
    let d = store("cache the JWKS response");

    let service = RelationshipService::new(backend);

    // Verified fix that only applies in production
    service
        .create_relationship(
            &b,
            &a,
            RelationshipType::Solves,
            RelationshipDraft::new().with_context(
                ContextStructure::from_text("partially fixes the auth module in production")
                    .with_scope(ContextScope::Partial)
                    .with_component("auth module")
                    .with_condition("in production")
                    .with_evidence("verified by integration tests"),
            ),
        )
        .unwrap();

    // Unverified workaround with a version qualifier
    service
        .create_relationship(
            &c,
            &a,
            RelationshipType::WorkaroundFor,
            RelationshipDraft::new().with_context(
                ContextStructure::from_text("works around the expiry bug since v2.1")
                    .with_scope(ContextScope::Conditional)
                    .with_condition("key rotation enabled")
                    .with_temporal("since v2.1"),
            ),
        )
        .unwrap();

    // No structured context at all
    service
        .create_relationship(&d, &a, RelationshipType::Improves, RelationshipDraft::new())
        .unwrap();

    service
}

#[test]
fn scope_filter_narrows_results() {
    let service = seeded();

    let partial = service
        .search_relationships_by_context(&ContextFilter::new().with_scope(ContextScope::Partial))
        .unwrap();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].relationship_type, RelationshipType::Solves);

    let full = service
        .search_relationships_by_context(&ContextFilter::new().with_scope(ContextScope::Full))
        .unwrap();
    assert!(full.is_empty());
}

#[test]
fn values_within_one_filter_are_alternatives() {
    let service = seeded();

    // Either condition matching is enough (OR), so both edges qualify
    let either = service
        .search_relationships_by_context(
            &ContextFilter::new().with_conditions(["production", "key rotation"]),
        )
        .unwrap();
    assert_eq!(either.len(), 2);

    let neither = service
        .search_relationships_by_context(&ContextFilter::new().with_conditions(["staging"]))
        .unwrap();
    assert!(neither.is_empty());
}

#[test]
fn filters_combine_with_and() {
    let service = seeded();

    // Scope AND condition: only the production fix satisfies both
    let combined = service
        .search_relationships_by_context(
            &ContextFilter::new()
                .with_scope(ContextScope::Partial)
                .with_conditions(["production", "key rotation"]),
        )
        .unwrap();
    assert_eq!(combined.len(), 1);

    let contradictory = service
        .search_relationships_by_context(
            &ContextFilter::new()
                .with_scope(ContextScope::Conditional)
                .with_components(["auth module"]),
        )
        .unwrap();
    assert!(contradictory.is_empty());
}

#[test]
fn evidence_presence_splits_verified_from_unverified() {
    let service = seeded();

    let verified = service
        .search_relationships_by_context(&ContextFilter::new().with_has_evidence(true))
        .unwrap();
    assert_eq!(verified.len(), 1);
    assert_eq!(verified[0].relationship_type, RelationshipType::Solves);

    // Edges without any stored context never match; only the contextful
    // workaround counts as evidence-free
    let unverified = service
        .search_relationships_by_context(&ContextFilter::new().with_has_evidence(false))
        .unwrap();
    assert_eq!(unverified.len(), 1);
    assert_eq!(unverified[0].relationship_type, RelationshipType::WorkaroundFor);
}

#[test]
fn matching_is_case_insensitive_substring() {
    let service = seeded();

    let by_component = service
        .search_relationships_by_context(&ContextFilter::new().with_components(["AUTH"]))
        .unwrap();
    assert_eq!(by_component.len(), 1);

    let by_temporal = service
        .search_relationships_by_context(&ContextFilter::new().with_temporal("V2.1"))
        .unwrap();
    assert_eq!(by_temporal.len(), 1);
    assert_eq!(by_temporal[0].relationship_type, RelationshipType::WorkaroundFor);
}

#[test]
fn limit_caps_the_result_set() {
    let service = seeded();

    let all = service
        .search_relationships_by_context(&ContextFilter::new())
        .unwrap();
    assert_eq!(all.len(), 2); // only contextful edges are candidates

    let capped = service
        .search_relationships_by_context(&ContextFilter::new().with_limit(1))
        .unwrap();
    assert_eq!(capped.len(), 1);
}

#[test]
fn invalidated_edges_remain_searchable() {
    let service = seeded();

    let edge = service
        .search_relationships_by_context(&ContextFilter::new().with_has_evidence(true))
        .unwrap()
        .remove(0);
    service.invalidate_relationship(&edge.id, None).unwrap();

    // Context search spans history, not just the current view
    let still_found = service
        .search_relationships_by_context(&ContextFilter::new().with_has_evidence(true))
        .unwrap();
    assert_eq!(still_found.len(), 1);
    assert!(!still_found[0].is_current());
}
