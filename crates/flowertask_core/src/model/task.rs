//! Task domain model and remote document shape.
//!
//! # Responsibility
//! - Define the canonical task record held by the collection store.
//! - Convert between tasks and the per-owner document field map.
//!
//! # Invariants
//! - `id` is stable and doubles as the remote document key.
//! - A task with `parent_id` set is a subtask and never top-level.
//! - Subtask lists are derived reads, never stored on the record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable task identifier, equal to the remote document key.
pub type TaskId = String;

/// Unix epoch milliseconds.
pub type EpochMs = i64;

/// Raw document field map exchanged with remote adapters.
pub type DocumentFields = Map<String, Value>;

/// Milliseconds in one calendar day (86 400 seconds).
pub const MS_PER_DAY: i64 = 86_400_000;

pub const FIELD_TITLE: &str = "title";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_DUE_DATE: &str = "dueDate";
pub const FIELD_IS_COMPLETED: &str = "isCompleted";
pub const FIELD_CREATED: &str = "created";
pub const FIELD_IS_STARRED: &str = "isStarred";
pub const FIELD_PARENT_ID: &str = "parentId";
pub const FIELD_ORDER: &str = "order";

/// In-memory task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    /// Date-only values sit exactly on a day boundary.
    pub due_date: Option<EpochMs>,
    pub is_completed: bool,
    /// Set once at creation.
    pub created: EpochMs,
    pub is_starred: bool,
    pub parent_id: Option<TaskId>,
    /// Manual position among top-level tasks. Meaningless for subtasks.
    pub order: i64,
}

impl Task {
    /// Creates a top-level task with default flags.
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, created: EpochMs) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            due_date: None,
            is_completed: false,
            created,
            is_starred: false,
            parent_id: None,
            order: 0,
        }
    }

    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Returns whether the due date carries a time-of-day component.
    ///
    /// A due date exactly on a UTC day boundary is treated as date-only.
    /// Returns `false` when no due date is set.
    pub fn due_has_time_of_day(&self) -> bool {
        self.due_date
            .map(|due| due.rem_euclid(MS_PER_DAY) != 0)
            .unwrap_or(false)
    }

    /// Persisted field view of this task.
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            description: self.description.clone(),
            due_date: self.due_date,
            is_completed: self.is_completed,
            created: self.created,
            is_starred: self.is_starred,
            parent_id: self.parent_id.clone(),
            order: self.order,
        }
    }

    /// Full document written by overwrite and batch paths.
    pub fn to_document(&self) -> DocumentFields {
        self.fields().into_document()
    }

    /// Document subset written by edit: every field except `order` and `parentId`.
    pub fn edit_document(&self) -> DocumentFields {
        let mut fields = self.to_document();
        fields.remove(FIELD_ORDER);
        fields.remove(FIELD_PARENT_ID);
        fields
    }

    /// Decodes one remote document.
    ///
    /// # Errors
    /// - `title` or `created` missing.
    /// - Any present field with an unexpected JSON type.
    pub fn from_document(id: &str, fields: &DocumentFields) -> Result<Self, DocumentError> {
        if id.trim().is_empty() {
            return Err(DocumentError::EmptyId);
        }
        for required in [FIELD_TITLE, FIELD_CREATED] {
            if fields.get(required).map_or(true, Value::is_null) {
                return Err(DocumentError::MissingField(required));
            }
        }

        let decoded: TaskFields = serde_json::from_value(Value::Object(fields.clone()))
            .map_err(|err| DocumentError::InvalidField(err.to_string()))?;
        Ok(decoded.into_task(id))
    }
}

/// Persisted per-task document shape.
///
/// `title` and `created` are required; every other key falls back to its
/// default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<EpochMs>,
    #[serde(default)]
    pub is_completed: bool,
    pub created: EpochMs,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub order: i64,
}

impl TaskFields {
    pub fn into_task(self, id: impl Into<TaskId>) -> Task {
        Task {
            id: id.into(),
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            is_completed: self.is_completed,
            created: self.created,
            is_starred: self.is_starred,
            parent_id: self.parent_id,
            order: self.order,
        }
    }

    /// Serializes to the camelCase document map; absent options become `null`.
    pub fn into_document(self) -> DocumentFields {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        }
    }
}

/// Builds a single-key partial update.
pub fn single_field(key: &str, value: impl Into<Value>) -> DocumentFields {
    let mut fields = Map::new();
    fields.insert(key.to_string(), value.into());
    fields
}

/// Reasons a remote document cannot become a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    EmptyId,
    MissingField(&'static str),
    InvalidField(String),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "document id is empty"),
            Self::MissingField(field) => write!(f, "required field `{field}` is missing"),
            Self::InvalidField(details) => write!(f, "invalid field value: {details}"),
        }
    }
}

impl Error for DocumentError {}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> EpochMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
