//! Deterministic task selection and task status transitions.
//!
//! Selection follows declared plan order. At most one task is `in_progress` at
//! a time: nothing is reported ready while a task is in flight. Tasks behind a
//! `failed` dependency stay `pending` forever; failures never cascade.

use tracing::debug;

use crate::core::error::TransitionError;
use crate::core::graph::TaskGraph;
use crate::core::validator::ValidPlan;
use crate::plan::{Plan, Task, TaskStatus};

/// Structured selection outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection<'a> {
    /// First runnable task in declared order.
    Ready(&'a Task),
    /// A task is still `in_progress`; it must finish before anything else runs.
    InFlight(&'a Task),
    /// No task can run now or later: every task is terminal or blocked.
    Exhausted,
}

/// Select the next task for execution.
pub fn select(plan: &ValidPlan) -> Selection<'_> {
    if let Some(task) = plan.in_flight() {
        return Selection::InFlight(task);
    }
    match plan.tasks.iter().find(|task| is_runnable(plan, task)) {
        Some(task) => Selection::Ready(task),
        None => Selection::Exhausted,
    }
}

/// First task in declared order that is waiting with all dependencies completed.
///
/// Returns `None` when nothing is runnable, including while another task is in flight.
pub fn next_ready_task(plan: &ValidPlan) -> Option<&Task> {
    match select(plan) {
        Selection::Ready(task) => Some(task),
        Selection::InFlight(_) | Selection::Exhausted => None,
    }
}

/// Every currently runnable task, in execution order.
pub fn ready_tasks(plan: &ValidPlan) -> Vec<&Task> {
    plan.tasks
        .iter()
        .filter(|task| is_runnable(plan, task))
        .collect()
}

/// Waiting tasks that can never run because a dependency (direct or transitive) failed.
pub fn blocked_tasks(plan: &ValidPlan) -> Vec<&Task> {
    let Ok(graph) = TaskGraph::new(&plan.tasks) else {
        return Vec::new();
    };
    let mut blocked: Vec<&str> = Vec::new();
    for task in plan.tasks.iter().filter(|t| t.status == TaskStatus::Failed) {
        for dependent in graph.dependents(&task.id) {
            if !blocked.contains(&dependent) {
                blocked.push(dependent);
            }
        }
    }
    plan.tasks
        .iter()
        .filter(|task| task.status.is_waiting() && blocked.contains(&task.id.as_str()))
        .collect()
}

/// Transition a waiting task to `in_progress`.
pub fn mark_in_progress(plan: &mut ValidPlan, task_id: &str) -> Result<(), TransitionError> {
    let pos = position(plan, task_id)?;
    let task = &plan.tasks[pos];
    if !task.status.is_waiting() {
        return Err(TransitionError::InvalidTransition {
            task_id: task_id.to_string(),
            from: task.status,
            to: TaskStatus::InProgress,
        });
    }
    if let Some(other) = plan.in_flight() {
        return Err(TransitionError::TaskInFlight {
            task_id: task_id.to_string(),
            in_flight: other.id.clone(),
        });
    }
    let pending = incomplete_dependencies(plan, task);
    if !pending.is_empty() {
        return Err(TransitionError::DependenciesIncomplete {
            task_id: task_id.to_string(),
            pending,
        });
    }

    plan.plan_mut().tasks[pos].status = TaskStatus::InProgress;
    debug!(task_id, "task in progress");
    Ok(())
}

/// Transition the in-flight task to `completed`, recording its result.
pub fn mark_completed(
    plan: &mut ValidPlan,
    task_id: &str,
    result: impl Into<String>,
) -> Result<(), TransitionError> {
    let pos = in_progress_position(plan, task_id, TaskStatus::Completed)?;
    let inner = plan.plan_mut();
    let task = &mut inner.tasks[pos];
    task.status = TaskStatus::Completed;
    task.result = Some(result.into());
    task.error = None;
    refresh_readiness(inner);
    debug!(task_id, "task completed");
    Ok(())
}

/// Transition the in-flight task to `failed`, recording the error.
pub fn mark_failed(
    plan: &mut ValidPlan,
    task_id: &str,
    error: impl Into<String>,
) -> Result<(), TransitionError> {
    let pos = in_progress_position(plan, task_id, TaskStatus::Failed)?;
    let task = &mut plan.plan_mut().tasks[pos];
    task.status = TaskStatus::Failed;
    task.error = Some(error.into());
    debug!(task_id, "task failed");
    Ok(())
}

/// Promote `pending` tasks whose dependencies are all completed to `ready`.
pub(crate) fn refresh_readiness(plan: &mut Plan) {
    let promote: Vec<usize> = plan
        .tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| task.status == TaskStatus::Pending && is_runnable(plan, task))
        .map(|(pos, _)| pos)
        .collect();
    for pos in promote {
        plan.tasks[pos].status = TaskStatus::Ready;
    }
}

fn is_runnable(plan: &Plan, task: &Task) -> bool {
    task.status.is_waiting() && incomplete_dependencies(plan, task).is_empty()
}

fn incomplete_dependencies(plan: &Plan, task: &Task) -> Vec<String> {
    task.dependencies
        .iter()
        .filter(|dep| {
            plan.task(dep)
                .is_none_or(|found| found.status != TaskStatus::Completed)
        })
        .cloned()
        .collect()
}

fn position(plan: &Plan, task_id: &str) -> Result<usize, TransitionError> {
    plan.tasks
        .iter()
        .position(|task| task.id == task_id)
        .ok_or_else(|| TransitionError::UnknownTask {
            task_id: task_id.to_string(),
        })
}

fn in_progress_position(
    plan: &Plan,
    task_id: &str,
    to: TaskStatus,
) -> Result<usize, TransitionError> {
    let pos = position(plan, task_id)?;
    let from = plan.tasks[pos].status;
    if from != TaskStatus::InProgress {
        return Err(TransitionError::InvalidTransition {
            task_id: task_id.to_string(),
            from,
            to,
        });
    }
    Ok(pos)
}
