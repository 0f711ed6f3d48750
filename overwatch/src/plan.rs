//! Plan and task data model.
//!
//! A [`Plan`] is produced in full by the planner collaborator. Its structure
//! (task set, order, dependencies) never changes after validation; only task
//! `status`, `result` and `error` move, and only through
//! [`crate::core::scheduler`]. Those fields are therefore private to the crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet runnable (dependencies incomplete) or not yet examined.
    #[default]
    Pending,
    /// Pending, with every dependency completed.
    Ready,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// True for statuses that can still transition to `in_progress`.
    pub fn is_waiting(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Ready)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planner-assigned priority. Informational only; never affects scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// A unit of work within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Ids of tasks that must be `completed` before this one may start.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub(crate) status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl Task {
    /// Create a pending task with default metadata.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            dependencies,
            category: None,
            priority: Priority::default(),
            estimated_hours: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Output recorded when the task completed.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Failure recorded when the task failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Clear engine-owned fields so a freshly produced plan starts clean.
    pub(crate) fn reset(&mut self) {
        self.status = TaskStatus::Pending;
        self.result = None;
        self.error = None;
    }
}

/// Ordered set of tasks plus project metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub project_name: String,
    pub description: String,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_estimated_hours: Option<f64>,
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks
            .iter()
            .filter(|task| task.status == status)
            .count()
    }

    /// Task currently holding `in_progress`, if any.
    pub fn in_flight(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|task| task.status == TaskStatus::InProgress)
    }

    /// One-line technology stack summary (`"rust, axum"`), or `"unspecified"`.
    pub fn tech_stack_summary(&self) -> String {
        if self.tech_stack.is_empty() {
            return "unspecified".to_string();
        }
        self.tech_stack.join(", ")
    }
}
