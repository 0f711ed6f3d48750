//! End-to-end session driver: goal, planning, approval, then the execute loop.

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::agents::{Planner, TaskExecutor};
use crate::core::report::{PlanSummary, preview};
use crate::core::types::{
    AbortReason, Continuation, Phase, ProgressReport, SessionStatus, SessionSummary, TaskOutcome,
};
use crate::core::validator::validate;
use crate::io::config::OverwatchConfig;
use crate::io::human::HumanIo;
use crate::plan::Plan;
use crate::session::Session;

/// Knobs for one session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub session_id: String,
    pub max_plan_attempts: u32,
    pub next_up_limit: usize,
    pub output_preview_chars: usize,
}

impl SessionConfig {
    pub fn from_config(session_id: impl Into<String>, config: &OverwatchConfig) -> Self {
        Self {
            session_id: session_id.into(),
            max_plan_attempts: config.max_plan_attempts,
            next_up_limit: config.next_up_limit,
            output_preview_chars: config.output_preview_chars,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let defaults = OverwatchConfig::default();
        Self::from_config("session", &defaults)
    }
}

/// Observable milestones of a run, in the order they happen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    GoalReceived {
        goal: String,
    },
    /// A planning attempt failed (planner error or invalid plan).
    PlanRejected {
        attempt: u32,
        error: String,
    },
    PlanProposed {
        attempt: u32,
        summary: PlanSummary,
    },
    /// The operator accepted the plan; `plan` is kept out of the event log.
    PlanApproved {
        #[serde(skip_serializing)]
        plan: Plan,
    },
    TaskStarted {
        task_id: String,
        title: String,
    },
    TaskFinished {
        outcome: TaskOutcome,
        /// Shortened result or error text for display.
        preview: String,
        progress: ProgressReport,
    },
    Aborted {
        reason: AbortReason,
    },
    Finished {
        status: SessionStatus,
        completed: usize,
        failed: usize,
        blocked: usize,
    },
}

/// Run one session to a terminal phase and return its summary.
///
/// `goal` skips the goal prompt when given. Planner and validation failures
/// are retried up to `max_plan_attempts`, then abort. Executor errors fail
/// only the current task. The operator is asked to continue after every task
/// while more work is runnable. A failed operator prompt aborts with
/// [`AbortReason::OperatorUnavailable`]; only contract violations are
/// returned as errors.
#[instrument(skip_all, fields(session_id = %config.session_id))]
pub fn run_session<P, E, H, F>(
    planner: &P,
    executor: &E,
    human: &mut H,
    config: &SessionConfig,
    goal: Option<String>,
    mut on_event: F,
) -> Result<SessionSummary>
where
    P: Planner + ?Sized,
    E: TaskExecutor + ?Sized,
    H: HumanIo + ?Sized,
    F: FnMut(&SessionEvent),
{
    let mut session = Session::new(config.session_id.clone(), config.max_plan_attempts);

    let goal = match goal {
        Some(goal) => Some(goal),
        None => match human.request_goal() {
            Ok(goal) => Some(goal),
            Err(err) => {
                operator_unavailable(&mut session, "request goal", &err)?;
                None
            }
        },
    };
    let mut next_request = match goal {
        Some(goal) => session.submit_goal(&goal)?,
        None => None,
    };
    if let Some(goal) = session.goal() {
        on_event(&SessionEvent::GoalReceived {
            goal: goal.to_string(),
        });
    }

    while let Some(request) = next_request.take() {
        let attempt = request.attempt;
        let produced = planner
            .produce_plan(&request)
            .map_err(|err| err.to_string())
            .and_then(|plan| validate(plan).map_err(|err| format!("invalid plan: {err}")));
        match produced {
            Ok(plan) => session.accept_plan(plan)?,
            Err(error) => {
                on_event(&SessionEvent::PlanRejected {
                    attempt,
                    error: error.clone(),
                });
                next_request = session.planning_failed(error)?;
            }
        }
    }

    if session.phase() == Phase::AwaitingApproval {
        let plan = session
            .plan()
            .map(|plan| plan.as_plan().clone())
            .ok_or_else(|| anyhow!("session awaiting approval without a plan"))?;
        let summary = PlanSummary::from_plan(&plan);
        on_event(&SessionEvent::PlanProposed {
            attempt: session.plan_attempts(),
            summary: summary.clone(),
        });
        match human.request_approval(&summary) {
            Ok(approved) => {
                session.approve(approved)?;
                if approved {
                    on_event(&SessionEvent::PlanApproved { plan });
                }
            }
            Err(err) => operator_unavailable(&mut session, "request plan approval", &err)?,
        }
    }

    while session.phase() == Phase::Executing {
        let Some(task) = session.start_next()? else {
            break;
        };
        on_event(&SessionEvent::TaskStarted {
            task_id: task.id.clone(),
            title: task.title.clone(),
        });

        let plan = session
            .plan()
            .ok_or_else(|| anyhow!("session executing without a plan"))?;
        let outcome = match executor.run_task(&task, plan.as_plan()) {
            Ok(result) => session.record_success(&task.id, &result)?,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "task failed");
                session.record_failure(&task.id, &err.to_string())?
            }
        };

        let progress = session
            .progress(config.next_up_limit)
            .ok_or_else(|| anyhow!("session executing without a plan"))?;
        on_event(&SessionEvent::TaskFinished {
            preview: preview(&outcome.detail, config.output_preview_chars),
            outcome,
            progress: progress.clone(),
        });

        if !progress.has_runnable() {
            continue;
        }
        match human.request_continuation(&progress) {
            Ok(Continuation::Continue) => {}
            Ok(Continuation::Abort) => session.abort(AbortReason::OperatorAbort)?,
            Err(err) => operator_unavailable(&mut session, "request continuation", &err)?,
        }
    }

    if let Some(reason) = session.abort_reason() {
        on_event(&SessionEvent::Aborted {
            reason: reason.clone(),
        });
    }
    let summary = session.summary();
    info!(
        status = summary.status.as_str(),
        completed = summary.completed,
        failed = summary.failed,
        blocked = summary.blocked,
        "session finished"
    );
    on_event(&SessionEvent::Finished {
        status: summary.status,
        completed: summary.completed,
        failed: summary.failed,
        blocked: summary.blocked,
    });
    Ok(summary)
}

/// Abort at a human gate whose input failed, keeping the outcomes recorded so far.
fn operator_unavailable(session: &mut Session, gate: &str, err: &anyhow::Error) -> Result<()> {
    warn!(gate, error = %format!("{err:#}"), "operator input failed");
    session.abort(AbortReason::OperatorUnavailable {
        error: format!("{gate}: {err:#}"),
    })?;
    Ok(())
}
