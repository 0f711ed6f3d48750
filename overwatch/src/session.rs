//! Session state machine.
//!
//! A [`Session`] owns one run from goal to terminal phase:
//!
//! ```text
//! awaiting_goal -> planning -> awaiting_approval -> executing -> completed
//!                     |  ^            |                 |
//!                     +--+ (re-plan)  +-----------------+-------> aborted
//! ```
//!
//! Every operation checks the current phase and fails with
//! [`TransitionError::WrongPhase`] when called out of order. The session is the
//! only writer of its plan; task status moves through [`crate::core::scheduler`].

use tracing::{debug, info, warn};

use crate::agents::PlanRequest;
use crate::core::error::TransitionError;
use crate::core::report::progress_report;
use crate::core::scheduler::{
    Selection, blocked_tasks, mark_completed, mark_failed, mark_in_progress, select,
};
use crate::core::types::{
    AbortReason, Phase, ProgressReport, SessionStatus, SessionSummary, TaskOutcome, TaskResult,
    TaskState,
};
use crate::core::validator::ValidPlan;
use crate::plan::{Task, TaskStatus};

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    phase: Phase,
    goal: Option<String>,
    plan: Option<ValidPlan>,
    max_plan_attempts: u32,
    plan_attempts: u32,
    completed_count: usize,
    outcomes: Vec<TaskOutcome>,
    abort_reason: Option<AbortReason>,
}

impl Session {
    /// New session in `awaiting_goal`. `max_plan_attempts` is clamped to at least 1.
    pub fn new(id: impl Into<String>, max_plan_attempts: u32) -> Self {
        Self {
            id: id.into(),
            phase: Phase::AwaitingGoal,
            goal: None,
            plan: None,
            max_plan_attempts: max_plan_attempts.max(1),
            plan_attempts: 0,
            completed_count: 0,
            outcomes: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn plan(&self) -> Option<&ValidPlan> {
        self.plan.as_ref()
    }

    /// Planning attempts made so far.
    pub fn plan_attempts(&self) -> u32 {
        self.plan_attempts
    }

    /// Tasks completed so far. Never decreases.
    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    /// `awaiting_goal -> planning`. Returns the first planning request, or
    /// `None` when a blank goal aborted the session.
    pub fn submit_goal(&mut self, goal: &str) -> Result<Option<PlanRequest>, TransitionError> {
        self.expect_phase("submit_goal", Phase::AwaitingGoal)?;
        let goal = goal.trim();
        if goal.is_empty() {
            self.finish_aborted(AbortReason::EmptyGoal);
            return Ok(None);
        }
        self.goal = Some(goal.to_string());
        self.plan_attempts = 1;
        self.phase = Phase::Planning;
        info!(session_id = %self.id, "goal received, planning");
        Ok(Some(PlanRequest::first(goal)))
    }

    /// `planning -> awaiting_approval`.
    pub fn accept_plan(&mut self, plan: ValidPlan) -> Result<(), TransitionError> {
        self.expect_phase("accept_plan", Phase::Planning)?;
        info!(
            session_id = %self.id,
            attempt = self.plan_attempts,
            tasks = plan.tasks.len(),
            "plan accepted, awaiting approval"
        );
        self.plan = Some(plan);
        self.phase = Phase::AwaitingApproval;
        Ok(())
    }

    /// Record a failed planning attempt (planner error or invalid plan).
    ///
    /// Returns the next request while attempts remain; otherwise aborts with
    /// [`AbortReason::PlanningFailed`] and returns `None`.
    pub fn planning_failed(
        &mut self,
        error: impl Into<String>,
    ) -> Result<Option<PlanRequest>, TransitionError> {
        self.expect_phase("planning_failed", Phase::Planning)?;
        let error = error.into();
        warn!(
            session_id = %self.id,
            attempt = self.plan_attempts,
            max_attempts = self.max_plan_attempts,
            %error,
            "planning attempt failed"
        );
        if self.plan_attempts >= self.max_plan_attempts {
            self.finish_aborted(AbortReason::PlanningFailed {
                attempts: self.plan_attempts,
                error,
            });
            return Ok(None);
        }
        self.plan_attempts += 1;
        Ok(Some(PlanRequest {
            goal: self.goal.clone().unwrap_or_default(),
            feedback: Some(error),
            attempt: self.plan_attempts,
        }))
    }

    /// `awaiting_approval -> executing` on approval, `-> aborted` on rejection.
    pub fn approve(&mut self, approved: bool) -> Result<(), TransitionError> {
        self.expect_phase("approve", Phase::AwaitingApproval)?;
        if approved {
            info!(session_id = %self.id, "plan approved, executing");
            self.phase = Phase::Executing;
        } else {
            self.finish_aborted(AbortReason::PlanRejected);
        }
        Ok(())
    }

    /// Select the next task and mark it `in_progress`.
    ///
    /// Returns `None` and moves to `completed` once nothing can run any more.
    pub fn start_next(&mut self) -> Result<Option<Task>, TransitionError> {
        self.expect_phase("start_next", Phase::Executing)?;
        let plan = self.plan.as_mut().ok_or(TransitionError::WrongPhase {
            operation: "start_next",
            expected: Phase::Executing,
            actual: self.phase,
        })?;

        let next_id = match select(plan) {
            Selection::Ready(task) => task.id.clone(),
            Selection::InFlight(task) => {
                return Err(TransitionError::StillInProgress {
                    in_flight: task.id.clone(),
                });
            }
            Selection::Exhausted => {
                self.phase = Phase::Completed;
                info!(
                    session_id = %self.id,
                    completed = self.completed_count,
                    total = plan.tasks.len(),
                    "no runnable tasks left, session completed"
                );
                return Ok(None);
            }
        };

        mark_in_progress(plan, &next_id)?;
        debug!(session_id = %self.id, task_id = %next_id, "task started");
        Ok(plan.task(&next_id).cloned())
    }

    /// Record a successful execution of the in-flight task.
    pub fn record_success(
        &mut self,
        task_id: &str,
        result: &TaskResult,
    ) -> Result<TaskOutcome, TransitionError> {
        self.expect_phase("record_success", Phase::Executing)?;
        let record = result.record();
        mark_completed(self.plan_for("record_success")?, task_id, record.clone())?;
        self.completed_count += 1;
        Ok(self.push_outcome(task_id, TaskStatus::Completed, record))
    }

    /// Record a failed execution of the in-flight task. Dependents stay blocked.
    pub fn record_failure(
        &mut self,
        task_id: &str,
        error: &str,
    ) -> Result<TaskOutcome, TransitionError> {
        self.expect_phase("record_failure", Phase::Executing)?;
        mark_failed(self.plan_for("record_failure")?, task_id, error)?;
        Ok(self.push_outcome(task_id, TaskStatus::Failed, error.to_string()))
    }

    /// Progress snapshot, available once a plan exists.
    pub fn progress(&self, next_up_limit: usize) -> Option<ProgressReport> {
        self.plan
            .as_ref()
            .map(|plan| progress_report(plan, next_up_limit))
    }

    /// Abort from any non-terminal phase. A task in flight keeps `in_progress`.
    pub fn abort(&mut self, reason: AbortReason) -> Result<(), TransitionError> {
        if self.phase.is_terminal() {
            return Err(TransitionError::WrongPhase {
                operation: "abort",
                expected: Phase::Executing,
                actual: self.phase,
            });
        }
        self.finish_aborted(reason);
        Ok(())
    }

    /// Summary of the session as it stands.
    pub fn summary(&self) -> SessionSummary {
        let tasks: &[Task] = self
            .plan
            .as_ref()
            .map_or(&[][..], |plan| plan.tasks.as_slice());
        let count = |pred: fn(TaskStatus) -> bool| tasks.iter().filter(|t| pred(t.status())).count();
        let completed = count(|s| s == TaskStatus::Completed);

        let status = if self.phase == Phase::Aborted {
            SessionStatus::Aborted
        } else if !tasks.is_empty() && completed == tasks.len() {
            SessionStatus::Completed
        } else {
            SessionStatus::Partial
        };

        SessionSummary {
            session_id: self.id.clone(),
            goal: self.goal.clone(),
            status,
            abort_reason: self.abort_reason.clone(),
            total: tasks.len(),
            completed,
            failed: count(|s| s == TaskStatus::Failed),
            blocked: count(TaskStatus::is_waiting),
            in_progress: count(|s| s == TaskStatus::InProgress),
            blocked_by_failure: self
                .plan
                .as_ref()
                .map(|plan| {
                    blocked_tasks(plan)
                        .into_iter()
                        .map(|task| task.id.clone())
                        .collect()
                })
                .unwrap_or_default(),
            outcomes: self.outcomes.clone(),
            tasks: tasks
                .iter()
                .map(|t| TaskState {
                    id: t.id.clone(),
                    title: t.title.clone(),
                    status: t.status(),
                })
                .collect(),
        }
    }

    fn expect_phase(&self, operation: &'static str, expected: Phase) -> Result<(), TransitionError> {
        if self.phase != expected {
            return Err(TransitionError::WrongPhase {
                operation,
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn plan_for(&mut self, operation: &'static str) -> Result<&mut ValidPlan, TransitionError> {
        let actual = self.phase;
        self.plan.as_mut().ok_or(TransitionError::WrongPhase {
            operation,
            expected: Phase::Executing,
            actual,
        })
    }

    fn push_outcome(&mut self, task_id: &str, status: TaskStatus, detail: String) -> TaskOutcome {
        let title = self
            .plan
            .as_ref()
            .and_then(|plan| plan.task(task_id))
            .map(|task| task.title.clone())
            .unwrap_or_default();
        let outcome = TaskOutcome {
            seq: self.outcomes.len() as u32 + 1,
            task_id: task_id.to_string(),
            title,
            status,
            detail,
        };
        self.outcomes.push(outcome.clone());
        outcome
    }

    fn finish_aborted(&mut self, reason: AbortReason) {
        warn!(session_id = %self.id, phase = %self.phase, %reason, "session aborted");
        self.phase = Phase::Aborted;
        self.abort_reason = Some(reason);
    }
}
