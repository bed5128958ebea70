//! Todo entity owned by the todo service.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_TODO_CATEGORY, DEFAULT_TODO_LIST_LIMIT, MAX_TODO_DESCRIPTION_LENGTH,
    MAX_TODO_TITLE_LENGTH,
};
use crate::error::{DomainError, DomainResult};

/// Todo priority levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Parse an optional wire value; absent or blank means the default.
    pub fn parse_or_default(value: Option<&str>) -> DomainResult<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Priority::default()),
            Some(v) => v.parse(),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(DomainError::UnknownPriority(other.to_string())),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Todo record. Visible and mutable only by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub category: String,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// New incomplete, unarchived todo from validated fields.
    pub fn new(user_id: String, fields: TodoFields) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: fields.title,
            description: fields.description,
            completed: false,
            priority: fields.priority,
            due_date: fields.due_date,
            tags: fields.tags,
            category: fields.category,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Full-field replace of the mutable fields.
    pub fn replace(&mut self, fields: TodoFields) {
        self.title = fields.title;
        self.description = fields.description;
        self.priority = fields.priority;
        self.due_date = fields.due_date;
        self.tags = fields.tags;
        self.category = fields.category;
        self.updated_at = Utc::now();
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
        self.updated_at = Utc::now();
    }

    pub fn archive(&mut self) {
        self.archived = true;
        self.updated_at = Utc::now();
    }
}

/// Unvalidated todo input as it arrives over RPC.
#[derive(Debug, Clone, Default)]
pub struct TodoInput {
    pub title: String,
    pub description: String,
    pub priority: Option<String>,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

/// Validated mutable todo fields with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TodoFields {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub category: String,
}

impl TryFrom<TodoInput> for TodoFields {
    type Error = DomainError;

    fn try_from(input: TodoInput) -> Result<Self, Self::Error> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(DomainError::validation("Title is required"));
        }
        if title.chars().count() > MAX_TODO_TITLE_LENGTH {
            return Err(DomainError::validation(format!(
                "Title must be at most {} characters",
                MAX_TODO_TITLE_LENGTH
            )));
        }
        if input.description.chars().count() > MAX_TODO_DESCRIPTION_LENGTH {
            return Err(DomainError::validation(format!(
                "Description must be at most {} characters",
                MAX_TODO_DESCRIPTION_LENGTH
            )));
        }

        let category = input
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_TODO_CATEGORY)
            .to_string();

        let tags = input
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            title,
            description: input.description,
            priority: Priority::parse_or_default(input.priority.as_deref())?,
            due_date: parse_due_date(input.due_date.as_deref())?,
            tags,
            category,
        })
    }
}

/// Parse a due date given as RFC 3339 or `YYYY-MM-DD` (midnight UTC).
/// Blank means no due date.
pub fn parse_due_date(value: Option<&str>) -> DomainResult<Option<DateTime<Utc>>> {
    let value = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(v) => v,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| DomainError::validation("Invalid due date format"))
}

/// Owner-scoped listing filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoFilter {
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    /// Match todos carrying any of these tags
    pub tags: Vec<String>,
    pub limit: u32,
}

impl Default for TodoFilter {
    fn default() -> Self {
        Self {
            completed: None,
            priority: None,
            category: None,
            tags: Vec::new(),
            limit: DEFAULT_TODO_LIST_LIMIT,
        }
    }
}

impl TodoFilter {
    /// Whether an (unarchived) todo passes this filter.
    pub fn matches(&self, todo: &Todo) -> bool {
        if todo.archived {
            return false;
        }
        if self.completed.is_some_and(|c| c != todo.completed) {
            return false;
        }
        if self.priority.is_some_and(|p| p != todo.priority) {
            return false;
        }
        if self.category.as_ref().is_some_and(|c| c != &todo.category) {
            return false;
        }
        self.tags.is_empty() || self.tags.iter().any(|t| todo.tags.contains(t))
    }
}
