//! Search semantics and pagination stability tests.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use memorygraph::services::MemoryService;
use memorygraph::storage::{MemoryBackend, SqliteBackend};
use memorygraph::{
    MatchMode, Memory, MemoryContext, MemoryType, SearchQuery, SearchTolerance, Visibility,
};
use proptest::prelude::*;
use std::sync::Arc;

fn service() -> MemoryService<SqliteBackend> {
    let backend = SqliteBackend::in_memory().expect("open in-memory db");
    backend.initialize_schema().expect("initialize schema");
    MemoryService::new(Arc::new(backend))
}

#[test]
fn fuzzy_matches_inflections_strict_does_not() {
    let service = service();
    service
        .store_memory(&Memory::new(
            MemoryType::Fix,
            "Transient failures",
            "The HTTP client retries failed requests with backoff",
        ))
        .unwrap();

    // Fuzzy search for "retrying" reaches content that only says "retries"
    let fuzzy = SearchQuery::new()
        .with_text("retrying")
        .with_tolerance(SearchTolerance::Fuzzy);
    assert_eq!(service.search_memories(&fuzzy).unwrap().len(), 1);

    // Strict search for the same word finds nothing
    let strict = SearchQuery::new()
        .with_text("retrying")
        .with_tolerance(SearchTolerance::Strict);
    assert!(service.search_memories(&strict).unwrap().is_empty());
}

#[test]
fn match_modes_combine_terms() {
    let service = service();
    service
        .store_memory(&Memory::new(MemoryType::Solution, "Python testing", "use pytest"))
        .unwrap();
    service
        .store_memory(&Memory::new(MemoryType::Solution, "JavaScript testing", "use jest"))
        .unwrap();

    let any = SearchQuery::new()
        .with_terms(["python", "javascript"])
        .with_match_mode(MatchMode::Any);
    assert_eq!(service.search_memories(&any).unwrap().len(), 2);

    let all = SearchQuery::new()
        .with_terms(["python", "testing"])
        .with_match_mode(MatchMode::All);
    let results = service.search_memories(&all).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("pytest"));
}

#[test]
fn structural_filters_compose_with_and() {
    let service = service();
    service
        .store_memory(
            &Memory::new(MemoryType::Problem, "slow query", "index missing")
                .with_tag("database")
                .with_importance(0.9)
                .with_context(
                    MemoryContext::new()
                        .with_project_path("/work/api")
                        .with_tenant("acme")
                        .with_visibility(Visibility::Team),
                ),
        )
        .unwrap();
    service
        .store_memory(
            &Memory::new(MemoryType::Problem, "slow deploy", "cache cold")
                .with_tag("ci")
                .with_importance(0.3),
        )
        .unwrap();

    let query = SearchQuery::new()
        .with_text("slow")
        .with_type(MemoryType::Problem)
        .with_tags(["database"])
        .with_min_importance(0.5);
    let results = service.search_memories(&query).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "slow query");

    // Tenant and project filters narrow further
    let query = SearchQuery::new().with_project_path("/work/api").with_tenant("acme");
    assert_eq!(service.search_memories(&query).unwrap().len(), 1);

    let query = SearchQuery::new().with_tenant("other-corp");
    assert!(service.search_memories(&query).unwrap().is_empty());
}

#[test]
fn results_are_ordered_and_stable() {
    let service = service();
    for (title, importance) in [("low", 0.2), ("high", 0.9), ("mid", 0.5)] {
        service
            .store_memory(
                &Memory::new(MemoryType::General, title, "ordering probe")
                    .with_importance(importance),
            )
            .unwrap();
    }

    let query = SearchQuery::new().with_text("ordering");
    let first = service.search_memories(&query).unwrap();
    let second = service.search_memories(&query).unwrap();

    let titles: Vec<&str> = first.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, vec!["high", "mid", "low"]);
    assert_eq!(
        titles,
        second.iter().map(|m| m.title.as_str()).collect::<Vec<_>>()
    );
}

#[test]
fn pagination_metadata_tracks_the_query() {
    let service = service();
    for i in 0..7 {
        service
            .store_memory(&Memory::new(MemoryType::General, format!("memory {i}"), "page probe"))
            .unwrap();
    }

    let page = service
        .search_memories_paginated(&SearchQuery::new().with_text("page probe").with_limit(3))
        .unwrap();
    assert_eq!(page.total_count, 7);
    assert_eq!(page.results.len(), 3);
    assert!(page.has_more);
    assert_eq!(page.next_offset, Some(3));

    let last = service
        .search_memories_paginated(
            &SearchQuery::new().with_text("page probe").with_limit(3).with_offset(6),
        )
        .unwrap();
    assert_eq!(last.results.len(), 1);
    assert!(!last.has_more);
    assert_eq!(last.next_offset, None);

    // Past the end: empty page, same total
    let beyond = service
        .search_memories_paginated(
            &SearchQuery::new().with_text("page probe").with_limit(3).with_offset(60),
        )
        .unwrap();
    assert!(beyond.results.is_empty());
    assert_eq!(beyond.total_count, 7);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Walking all pages of a query equals fetching everything at once, and
    /// `total_count` never changes between pages.
    #[test]
    fn paging_concatenation_is_lossless(memory_count in 0usize..25, limit in 1usize..10) {
        let service = service();
        for i in 0..memory_count {
            service
                .store_memory(&Memory::new(
                    MemoryType::General,
                    format!("memory {i:02}"),
                    "concat probe",
                ))
                .unwrap();
        }

        let single = service
            .search_memories_paginated(
                &SearchQuery::new().with_text("concat probe").with_limit(1000),
            )
            .unwrap();

        let mut collected = Vec::new();
        let mut offset = 0;
        loop {
            let page = service
                .search_memories_paginated(
                    &SearchQuery::new()
                        .with_text("concat probe")
                        .with_limit(limit)
                        .with_offset(offset),
                )
                .unwrap();
            prop_assert_eq!(page.total_count, memory_count);
            let done = !page.has_more;
            collected.extend(page.results);
            if done {
                break;
            }
            offset = page.next_offset.unwrap();
        }

        let collected_ids: Vec<_> = collected.iter().map(|m| m.id.clone()).collect();
        let single_ids: Vec<_> = single.results.iter().map(|m| m.id.clone()).collect();
        prop_assert_eq!(collected_ids, single_ids);
    }
}
