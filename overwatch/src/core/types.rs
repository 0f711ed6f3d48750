//! Shared deterministic types for the session core.
//!
//! These types define stable contracts between the scheduler, the session and
//! front ends. They never depend on I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::plan::TaskStatus;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingGoal,
    Planning,
    AwaitingApproval,
    Executing,
    Completed,
    Aborted,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AwaitingGoal => "awaiting_goal",
            Phase::Planning => "planning",
            Phase::AwaitingApproval => "awaiting_approval",
            Phase::Executing => "executing",
            Phase::Completed => "completed",
            Phase::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator answer at a between-task pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Continue,
    Abort,
}

/// Structured output of a successful task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub summary: String,
    /// Paths (relative to the workspace) the executor reports touching.
    #[serde(default)]
    pub files: Vec<String>,
}

impl TaskResult {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            files: Vec::new(),
        }
    }

    /// Text stored as the task's result: the summary, then touched files.
    pub fn record(&self) -> String {
        let summary = self.summary.trim();
        if self.files.is_empty() {
            return summary.to_string();
        }
        format!("{summary}\nfiles: {}", self.files.join(", "))
    }
}

/// Why a session ended in `aborted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The operator supplied a blank goal.
    EmptyGoal,
    /// Every planning attempt failed (planner error or invalid plan).
    PlanningFailed { attempts: u32, error: String },
    /// The operator rejected the plan at the approval gate.
    PlanRejected,
    /// The operator stopped the run at a continuation prompt.
    OperatorAbort,
    /// Operator input failed at a prompt (closed stdin, I/O error).
    OperatorUnavailable { error: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::EmptyGoal => f.write_str("no goal provided"),
            AbortReason::PlanningFailed { attempts, error } => {
                write!(f, "planning failed after {attempts} attempt(s): {error}")
            }
            AbortReason::PlanRejected => f.write_str("plan rejected by operator"),
            AbortReason::OperatorAbort => f.write_str("aborted by operator"),
            AbortReason::OperatorUnavailable { error } => {
                write!(f, "operator unavailable: {error}")
            }
        }
    }
}

/// Recorded result of one executed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// 1-indexed execution sequence number.
    pub seq: u32,
    pub task_id: String,
    pub title: String,
    /// `completed` or `failed`.
    pub status: TaskStatus,
    /// Result summary on success, error text on failure.
    pub detail: String,
}

/// Progress snapshot emitted after every task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    /// Titles of the next runnable tasks, in execution order (bounded).
    pub next_up: Vec<String>,
    /// Runnable tasks beyond `next_up`.
    pub more_ready: usize,
}

/// Final classification of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Every task completed.
    Completed,
    /// Execution finished with failed or never-run tasks.
    Partial,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::Partial => "partial",
            SessionStatus::Aborted => "aborted",
        }
    }
}

/// Final status of one task, as reported in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

/// Terminal report returned by a session run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub goal: Option<String>,
    pub status: SessionStatus,
    pub abort_reason: Option<AbortReason>,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Tasks that never ran (still `pending`/`ready` at the end).
    pub blocked: usize,
    /// Tasks left `in_progress` (only possible after an abort).
    pub in_progress: usize,
    /// Never-run tasks behind a failed dependency, in plan order.
    pub blocked_by_failure: Vec<String>,
    pub outcomes: Vec<TaskOutcome>,
    pub tasks: Vec<TaskState>,
}

