// Allow non-const functions that use f64::clamp (not const-stable yet)
#![allow(clippy::missing_const_for_fn)]

//! Memory types and identifiers.
//!
//! A [`Memory`] is the unit of knowledge in the graph: a typed record with a
//! title, content, scoring, and optional structured context. Memories are
//! owned independently of each other; relationships between them live in
//! [`super::relationship`].
//!
//! # Memory Types
//!
//! The thirteen categories cover the shapes of knowledge captured during
//! development work:
//!
//! | Type | Example |
//! |------|---------|
//! | `Problem` | "Connection pool exhausts under load" |
//! | `Solution` | "Cap pool size and add a wait queue" |
//! | `Task` | "Migrate the auth tables" |
//! | `Error` | "`ECONNRESET` in the payment worker" |
//! | `Fix` | "Retry idempotent requests with backoff" |
//! | `CodePattern` | "Builder with clamped score setters" |
//! | `Command` | "`cargo nextest run --retries 2`" |
//! | `Conversation` | Summarized discussion outcome |
//! | `FileContext` | Notes attached to a path |
//! | `Project` | Project-level facts |
//! | `Technology` | Library or tool knowledge |
//! | `Workflow` | Multi-step procedure |
//! | `General` | Everything else |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier for a memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    /// Creates a memory ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new unique memory ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("mem_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for MemoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Category of a memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A problem or issue that was encountered.
    Problem,
    /// A solution to a problem.
    Solution,
    /// A unit of work to be done.
    Task,
    /// An error message or failure observation.
    Error,
    /// A fix applied to an error.
    Fix,
    /// A reusable code pattern or idiom.
    CodePattern,
    /// A shell command or invocation.
    Command,
    /// A summarized conversation or discussion outcome.
    Conversation,
    /// Knowledge attached to a specific file.
    FileContext,
    /// Project-level facts and decisions.
    Project,
    /// Knowledge about a tool, library, or language.
    Technology,
    /// A multi-step procedure.
    Workflow,
    /// Anything that fits no other category.
    General,
}

impl MemoryType {
    /// Returns all memory type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Problem,
            Self::Solution,
            Self::Task,
            Self::Error,
            Self::Fix,
            Self::CodePattern,
            Self::Command,
            Self::Conversation,
            Self::FileContext,
            Self::Project,
            Self::Technology,
            Self::Workflow,
            Self::General,
        ]
    }

    /// Returns the memory type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Problem => "problem",
            Self::Solution => "solution",
            Self::Task => "task",
            Self::Error => "error",
            Self::Fix => "fix",
            Self::CodePattern => "code_pattern",
            Self::Command => "command",
            Self::Conversation => "conversation",
            Self::FileContext => "file_context",
            Self::Project => "project",
            Self::Technology => "technology",
            Self::Workflow => "workflow",
            Self::General => "general",
        }
    }

    /// Parses a memory type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "problem" | "issue" => Some(Self::Problem),
            "solution" => Some(Self::Solution),
            "task" | "todo" => Some(Self::Task),
            "error" | "failure" => Some(Self::Error),
            "fix" => Some(Self::Fix),
            "code_pattern" | "pattern" => Some(Self::CodePattern),
            "command" => Some(Self::Command),
            "conversation" | "discussion" => Some(Self::Conversation),
            "file_context" | "file" => Some(Self::FileContext),
            "project" => Some(Self::Project),
            "technology" | "tech" | "tool" => Some(Self::Technology),
            "workflow" | "procedure" => Some(Self::Workflow),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown memory type: {s}"))
    }
}

/// Visibility level of a memory in multi-tenant deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to the creating user only.
    #[default]
    Private,
    /// Visible within the project.
    Project,
    /// Visible to the whole team.
    Team,
    /// Visible to everyone.
    Public,
}

impl Visibility {
    /// Returns the visibility level as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Project => "project",
            Self::Team => "team",
            Self::Public => "public",
        }
    }

    /// Parses a visibility level from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "private" => Some(Self::Private),
            "project" => Some(Self::Project),
            "team" => Some(Self::Team),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured context attached to a memory.
///
/// All fields are optional; `metadata` is the free-form escape hatch for
/// values that have no typed slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    /// Project path the memory was captured in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// Files involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Programming languages involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    /// Frameworks involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frameworks: Vec<String>,
    /// Technologies involved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    /// Tenant the memory belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Visibility level within the tenant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project path.
    #[must_use]
    pub fn with_project_path(mut self, path: impl Into<String>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    /// Sets the tenant id.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Sets the visibility level.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A knowledge record in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier.
    pub id: MemoryId,
    /// Category of the record.
    pub memory_type: MemoryType,
    /// Short human-readable title.
    pub title: String,
    /// Full content.
    pub content: String,
    /// Optional condensed summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Unordered tags for filtering.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance score in `[0.0, 1.0]`.
    pub importance: f64,
    /// Confidence score in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Optional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<MemoryContext>,
    /// When the memory was created.
    pub created_at: DateTime<Utc>,
    /// When the memory was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the memory was last read.
    pub last_accessed: DateTime<Utc>,
    /// Monotonic version counter, starts at 1 and bumps on every update.
    pub version: i64,
}

impl Memory {
    /// Creates a new memory with generated id and default scores.
    #[must_use]
    pub fn new(memory_type: MemoryType, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::generate(),
            memory_type,
            title: title.into(),
            content: content.into(),
            summary: None,
            tags: Vec::new(),
            importance: 0.5,
            confidence: 0.8,
            context: None,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            version: 1,
        }
    }

    /// Creates a memory with a specific id.
    #[must_use]
    pub fn with_id(mut self, id: MemoryId) -> Self {
        self.id = id;
        self
    }

    /// Sets the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds multiple tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the importance score, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Sets the confidence score, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the structured context.
    #[must_use]
    pub fn with_context(mut self, context: MemoryContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Partial update applied to an existing memory.
///
/// Only set fields are changed; applying any update bumps `updated_at` and
/// the version counter. An update with no fields set is rejected by
/// validation before it reaches storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement summary.
    pub summary: Option<String>,
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
    /// Replacement importance score.
    pub importance: Option<f64>,
    /// Replacement confidence score.
    pub confidence: Option<f64>,
    /// Replacement context.
    pub context: Option<MemoryContext>,
}

impl MemoryUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.summary.is_none()
            && self.tags.is_none()
            && self.importance.is_none()
            && self.confidence.is_none()
            && self.context.is_none()
    }

    /// Sets the replacement title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the replacement content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets the replacement importance, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance.clamp(0.0, 1.0));
        self
    }

    /// Applies this update to a memory, bumping `updated_at` and `version`.
    pub fn apply_to(&self, memory: &mut Memory) {
        if let Some(ref title) = self.title {
            memory.title.clone_from(title);
        }
        if let Some(ref content) = self.content {
            memory.content.clone_from(content);
        }
        if let Some(ref summary) = self.summary {
            memory.summary = Some(summary.clone());
        }
        if let Some(ref tags) = self.tags {
            memory.tags.clone_from(tags);
        }
        if let Some(importance) = self.importance {
            memory.importance = importance.clamp(0.0, 1.0);
        }
        if let Some(confidence) = self.confidence {
            memory.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(ref context) = self.context {
            memory.context = Some(context.clone());
        }
        memory.updated_at = Utc::now();
        memory.version += 1;
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_id_generate() {
        let id1 = MemoryId::generate();
        let id2 = MemoryId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("mem_"));
    }

    #[test]
    fn test_memory_type_parse() {
        assert_eq!(MemoryType::parse("problem"), Some(MemoryType::Problem));
        assert_eq!(MemoryType::parse("PROBLEM"), Some(MemoryType::Problem));
        assert_eq!(MemoryType::parse("code-pattern"), Some(MemoryType::CodePattern));
        assert_eq!(MemoryType::parse("tech"), Some(MemoryType::Technology));
        assert_eq!(MemoryType::parse("nonsense"), None);
    }

    #[test]
    fn test_memory_type_roundtrip() {
        for t in MemoryType::all() {
            assert_eq!(MemoryType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(MemoryType::all().len(), 13);
    }

    #[test]
    fn test_memory_creation() {
        let memory = Memory::new(MemoryType::Solution, "Cap the pool", "Cap pool size at 32")
            .with_importance(0.9)
            .with_tag("database")
            .with_summary("Pool sizing");

        assert_eq!(memory.memory_type, MemoryType::Solution);
        assert_eq!(memory.importance, 0.9);
        assert_eq!(memory.version, 1);
        assert!(memory.tags.contains(&"database".to_string()));
    }

    #[test]
    fn test_score_clamping() {
        let memory = Memory::new(MemoryType::General, "t", "c").with_importance(1.5);
        assert_eq!(memory.importance, 1.0);

        let memory = Memory::new(MemoryType::General, "t", "c").with_confidence(-0.2);
        assert_eq!(memory.confidence, 0.0);
    }

    #[test]
    fn test_update_bumps_version_and_timestamp() {
        let mut memory = Memory::new(MemoryType::Task, "t", "c");
        let before = memory.updated_at;

        let update = MemoryUpdate::new().with_title("renamed");
        update.apply_to(&mut memory);

        assert_eq!(memory.title, "renamed");
        assert_eq!(memory.version, 2);
        assert!(memory.updated_at >= before);
    }

    #[test]
    fn test_empty_update() {
        assert!(MemoryUpdate::new().is_empty());
        assert!(!MemoryUpdate::new().with_content("x").is_empty());
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!(Visibility::parse("team"), Some(Visibility::Team));
        assert_eq!(Visibility::parse("TEAM"), Some(Visibility::Team));
        assert_eq!(Visibility::parse("everyone"), None);
    }

    #[test]
    fn test_context_builder() {
        let ctx = MemoryContext::new()
            .with_project_path("/work/api")
            .with_tenant("acme")
            .with_visibility(Visibility::Team)
            .with_metadata("ticket", serde_json::json!("API-421"));

        assert_eq!(ctx.project_path.as_deref(), Some("/work/api"));
        assert_eq!(ctx.tenant_id.as_deref(), Some("acme"));
        assert_eq!(ctx.visibility, Some(Visibility::Team));
        assert_eq!(ctx.metadata.get("ticket"), Some(&serde_json::json!("API-421")));
    }
}
