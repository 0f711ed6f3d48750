//! Typed errors for plan structure and state transitions.

use thiserror::Error;

use crate::core::types::Phase;
use crate::plan::TaskStatus;

/// Structural defects in a produced plan. Caught before anything runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan contains no tasks")]
    EmptyPlan,

    #[error("duplicate task id '{id}'")]
    DuplicateTaskId { id: String },

    #[error("task '{task_id}' depends on unknown task '{missing}'")]
    UnknownTaskReference { task_id: String, missing: String },

    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

impl PlanError {
    /// Task ids implicated by this error, for diagnostics.
    pub fn offending_tasks(&self) -> Vec<&str> {
        match self {
            PlanError::EmptyPlan => Vec::new(),
            PlanError::DuplicateTaskId { id } => vec![id.as_str()],
            PlanError::UnknownTaskReference { task_id, .. } => vec![task_id.as_str()],
            PlanError::CyclicDependency { cycle } => {
                let mut ids: Vec<&str> = cycle.iter().map(String::as_str).collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        }
    }
}

/// Out-of-order use of the scheduler or the session. Always a bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown task '{task_id}'")]
    UnknownTask { task_id: String },

    #[error("invalid transition for task '{task_id}': {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("cannot start task '{task_id}' while '{in_flight}' is in progress")]
    TaskInFlight { task_id: String, in_flight: String },

    #[error("task '{in_flight}' is still in progress; record its outcome first")]
    StillInProgress { in_flight: String },

    #[error("task '{task_id}' has incomplete dependencies: {}", pending.join(", "))]
    DependenciesIncomplete {
        task_id: String,
        pending: Vec<String>,
    },

    #[error("session operation '{operation}' requires phase {expected}, but session is {actual}")]
    WrongPhase {
        operation: &'static str,
        expected: Phase,
        actual: Phase,
    },
}
