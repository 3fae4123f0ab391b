//! SQL text and helpers for the `SQLite` backend.
//!
//! All DDL is create-if-absent so schema initialization is idempotent and
//! safe to run concurrently at startup.

/// Memories table.
///
/// `project_path`, `tenant_id`, and `visibility` are denormalized out of the
/// context JSON so structural filters can use indexes; the full context
/// structure is kept in `context`.
pub const CREATE_MEMORIES_TABLE: &str = "CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    summary TEXT,
    tags TEXT,
    importance REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 0.8,
    context TEXT,
    project_path TEXT,
    tenant_id TEXT,
    visibility TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 1
)";

/// Relationships table.
///
/// Timestamps are epoch microseconds. `valid_from` and `recorded_at` are
/// nullable so that databases predating bi-temporal tracking can be
/// backfilled (and rolled back) by the migration step; writes from this
/// crate always populate them.
pub const CREATE_RELATIONSHIPS_TABLE: &str = "CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    from_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 0.5,
    confidence REAL NOT NULL DEFAULT 0.8,
    context TEXT,
    valid_from INTEGER,
    valid_until INTEGER,
    recorded_at INTEGER,
    invalidated_by TEXT
)";

/// Indexes created at schema initialization.
///
/// The temporal trio mirrors the query shapes: the partial index on
/// `valid_until` serves "current" lookups, `(valid_from, valid_until)`
/// serves point-in-time scans, `recorded_at` serves "what changed" scans.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type)",
    "CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance DESC)",
    "CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_path)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_id)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_id)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(rel_type)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_current ON relationships(valid_until) WHERE valid_until IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_relationships_temporal ON relationships(valid_from, valid_until)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_recorded ON relationships(recorded_at)",
];

/// Columns selected when reading a full memory row.
pub const MEMORY_COLUMNS: &str = "id, memory_type, title, content, summary, tags, importance, \
     confidence, context, project_path, tenant_id, visibility, created_at, updated_at, \
     last_accessed, version";

/// Columns selected when reading a full relationship row.
pub const RELATIONSHIP_COLUMNS: &str =
    "id, from_id, to_id, rel_type, strength, confidence, context, valid_from, valid_until, \
     recorded_at, invalidated_by";

/// Escapes SQL LIKE wildcards in a string to make them literal.
///
/// `%` and `_` are LIKE wildcards and the backslash is our escape
/// character; all three must be escaped before user text is spliced into a
/// `LIKE ... ESCAPE '\'` pattern.
///
/// # Examples
///
/// ```
/// use memorygraph::storage::sqlite::escape_like_wildcards;
///
/// assert_eq!(escape_like_wildcards("100%"), "100\\%");
/// assert_eq!(escape_like_wildcards("user_name"), "user\\_name");
/// assert_eq!(escape_like_wildcards("path\\file"), "path\\\\file");
/// ```
#[must_use]
pub fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            _ => result.push(c),
        }
    }
    result
}

/// Wraps a needle as a contains-anywhere LIKE pattern.
#[must_use]
pub fn contains_pattern(needle: &str) -> String {
    format!("%{}%", escape_like_wildcards(needle))
}
