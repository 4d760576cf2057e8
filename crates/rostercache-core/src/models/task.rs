use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::options::normalize_options;

/// Body of the `addTask` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub task_name: String,
    pub task_date: String,
    pub task_time: String,
    /// Options in any accepted shape; sent in canonical form.
    pub options: Value,
    pub notes: String,
}

impl NewTask {
    pub fn new(task_name: impl Into<String>, task_date: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            task_date: task_date.into(),
            ..Self::default()
        }
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.task_time = time.into();
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Copy with the options rewritten into their canonical string form.
    pub fn normalized(&self) -> Self {
        Self {
            options: Value::String(normalize_options(Some(&self.options))),
            ..self.clone()
        }
    }
}

/// Identifies a task for `removeTask`. Without a time, every task with that
/// name on that date is matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl TaskRef {
    pub fn new(task: impl Into<String>, date: impl Into<String>, time: Option<String>) -> Self {
        Self {
            task: task.into(),
            date: date.into(),
            time,
        }
    }
}

/// Body of `updateTask` (and the legacy `editTask`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub old_task: String,
    pub old_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_time: Option<String>,
    pub options: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl TaskUpdate {
    pub fn normalized(&self) -> Self {
        Self {
            options: Value::String(normalize_options(Some(&self.options))),
            ..self.clone()
        }
    }
}

/// A member's answer to a task, for `postResponse`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSubmission {
    pub task: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub status: String,
    pub note: String,
    pub member: String,
}
