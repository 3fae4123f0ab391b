//! Input validation.
//!
//! All validators run before any storage I/O and fail fast with
//! [`Error::Validation`]; a rejected input has no side effects. Messages
//! name the offending field and the observed size so callers can report
//! them directly.

use crate::models::{MAX_LIMIT, Memory, MemoryUpdate, SearchQuery};
use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Maximum title length in characters.
pub const MAX_TITLE_LENGTH: usize = 500;
/// Maximum content length in characters (50 KB).
pub const MAX_CONTENT_LENGTH: usize = 50_000;
/// Maximum summary length in characters.
pub const MAX_SUMMARY_LENGTH: usize = 1_000;
/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 100;
/// Maximum number of tags on one memory.
pub const MAX_TAGS_COUNT: usize = 50;
/// Maximum free-text query length.
pub const MAX_QUERY_LENGTH: usize = 1_000;
/// Maximum relationship context length in characters (10 KB).
pub const MAX_CONTEXT_LENGTH: usize = 10_000;

/// Validates a memory before it is stored.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the title is empty or any size limit
/// is exceeded.
pub fn validate_memory(memory: &Memory) -> Result<()> {
    if memory.title.trim().is_empty() {
        return Err(Error::Validation("title must not be empty".to_string()));
    }
    validate_title(&memory.title)?;
    validate_content(&memory.content)?;
    if let Some(ref summary) = memory.summary {
        validate_summary(summary)?;
    }
    validate_tags(&memory.tags)
}

/// Validates a partial update before it is applied.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the update is empty or any replacement
/// field exceeds its size limit.
pub fn validate_memory_update(update: &MemoryUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(Error::Validation("update has no fields set".to_string()));
    }
    if let Some(ref title) = update.title {
        if title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        validate_title(title)?;
    }
    if let Some(ref content) = update.content {
        validate_content(content)?;
    }
    if let Some(ref summary) = update.summary {
        validate_summary(summary)?;
    }
    if let Some(ref tags) = update.tags {
        validate_tags(tags)?;
    }
    Ok(())
}

/// Validates a search query's text and pagination bounds.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the query text is too long or `limit`
/// is outside `1..=1000`.
pub fn validate_search_query(query: &SearchQuery) -> Result<()> {
    if let Some(ref text) = query.query
        && text.len() > MAX_QUERY_LENGTH
    {
        return Err(Error::Validation(format!(
            "query exceeds {MAX_QUERY_LENGTH} characters (got {})",
            text.len()
        )));
    }
    if query.limit == 0 || query.limit > MAX_LIMIT {
        return Err(Error::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT} (got {})",
            query.limit
        )));
    }
    Ok(())
}

/// Validates a relationship's free-text context length.
///
/// # Errors
///
/// Returns [`Error::Validation`] when the context text exceeds the limit.
pub fn validate_relationship_context(text: &str) -> Result<()> {
    if text.len() > MAX_CONTEXT_LENGTH {
        return Err(Error::Validation(format!(
            "context exceeds {MAX_CONTEXT_LENGTH} characters (got {})",
            text.len()
        )));
    }
    Ok(())
}

/// Parses a caller-supplied ISO 8601 timestamp.
///
/// Accepts RFC 3339 with either an offset or a trailing `Z`.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the malformed value.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            Error::Validation(format!(
                "invalid timestamp '{value}': expected ISO 8601 (e.g. 2024-12-01T00:00:00Z)"
            ))
        })
}

fn validate_title(title: &str) -> Result<()> {
    if title.len() > MAX_TITLE_LENGTH {
        return Err(Error::Validation(format!(
            "title exceeds {MAX_TITLE_LENGTH} characters (got {})",
            title.len()
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<()> {
    if content.len() > MAX_CONTENT_LENGTH {
        return Err(Error::Validation(format!(
            "content exceeds {MAX_CONTENT_LENGTH} characters (got {})",
            content.len()
        )));
    }
    Ok(())
}

fn validate_summary(summary: &str) -> Result<()> {
    if summary.len() > MAX_SUMMARY_LENGTH {
        return Err(Error::Validation(format!(
            "summary exceeds {MAX_SUMMARY_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS_COUNT {
        return Err(Error::Validation(format!(
            "too many tags (max {MAX_TAGS_COUNT}, got {})",
            tags.len()
        )));
    }
    for tag in tags {
        if tag.len() > MAX_TAG_LENGTH {
            let shown: String = tag.chars().take(20).collect();
            return Err(Error::Validation(format!(
                "tag '{shown}...' exceeds {MAX_TAG_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryType;

    #[test]
    fn test_valid_memory_passes() {
        let memory = Memory::new(MemoryType::General, "title", "content");
        assert!(validate_memory(&memory).is_ok());
    }

    #[test]
    fn test_empty_title_rejected() {
        let memory = Memory::new(MemoryType::General, "  ", "content");
        assert!(validate_memory(&memory).is_err());
    }

    #[test]
    fn test_oversized_fields_rejected() {
        let memory = Memory::new(MemoryType::General, "t".repeat(501), "c");
        assert!(validate_memory(&memory).is_err());

        let memory = Memory::new(MemoryType::General, "t", "c".repeat(50_001));
        assert!(validate_memory(&memory).is_err());

        let memory =
            Memory::new(MemoryType::General, "t", "c").with_summary("s".repeat(1_001));
        assert!(validate_memory(&memory).is_err());
    }

    #[test]
    fn test_tag_limits() {
        let memory = Memory::new(MemoryType::General, "t", "c")
            .with_tags((0..51).map(|i| format!("tag{i}")));
        assert!(validate_memory(&memory).is_err());

        let memory = Memory::new(MemoryType::General, "t", "c").with_tag("x".repeat(101));
        assert!(validate_memory(&memory).is_err());
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(validate_memory_update(&MemoryUpdate::new()).is_err());
        assert!(validate_memory_update(&MemoryUpdate::new().with_title("ok")).is_ok());
    }

    #[test]
    fn test_search_limit_bounds() {
        let query = SearchQuery::new().with_limit(0);
        assert!(validate_search_query(&query).is_err());

        let query = SearchQuery::new().with_limit(1001);
        assert!(validate_search_query(&query).is_err());

        let query = SearchQuery::new().with_limit(1000);
        assert!(validate_search_query(&query).is_ok());
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-12-01T00:00:00Z").is_ok());
        assert!(parse_timestamp("2024-12-01T10:30:00+02:00").is_ok());
        assert!(parse_timestamp("not-a-date").is_err());
        assert!(parse_timestamp("2024-13-01T00:00:00Z").is_err());

        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_context_length() {
        assert!(validate_relationship_context(&"x".repeat(10_000)).is_ok());
        assert!(validate_relationship_context(&"x".repeat(10_001)).is_err());
    }
}
